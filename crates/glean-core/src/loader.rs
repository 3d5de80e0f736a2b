//! Locating and loading scraper definition files.
//!
//! A definitions directory may hold versioned definitions laid out as
//! `{name}/{version}.{json,yaml,yml}`, plus an optional `registry.json`
//! mapping each name to its latest version.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ScraperConfig;
use crate::error::{Result, ScrapeError};
use crate::scrape::Scraper;

/// File extensions tried, in order, when resolving `name@version`.
const EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

const REGISTRY_FILE: &str = "registry.json";

/// A definition file that was found and parsed, but not yet validated.
#[derive(Debug, Clone)]
pub struct ResolvedScraper {
    pub path: PathBuf,
    /// `name@version` for versioned definitions, the file stem otherwise.
    pub name: String,
    pub definition: serde_json::Value,
}

impl ResolvedScraper {
    /// Validate and compile the loaded definition.
    pub fn compile(&self, config: &ScraperConfig) -> Result<Scraper> {
        tracing::debug!(
            name = %self.name,
            path = %self.path.display(),
            "Compiling scraper definition"
        );
        Scraper::from_value_with_config(&self.definition, config.clone())
    }
}

/// Resolves definition references against a definitions directory.
#[derive(Debug, Clone)]
pub struct ScraperResolver {
    dir: PathBuf,
}

impl ScraperResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Find and parse the definition named by `reference`.
    ///
    /// Accepts a direct file path, `name@version`, or `name@latest`
    /// (looked up in `registry.json`).
    pub fn resolve(&self, reference: &str) -> Result<ResolvedScraper> {
        let (path, name) = self.locate(reference)?;
        let definition = read_definition(&path)?;
        tracing::debug!(%name, path = %path.display(), "Loaded scraper definition");
        Ok(ResolvedScraper {
            path,
            name,
            definition,
        })
    }

    fn locate(&self, reference: &str) -> Result<(PathBuf, String)> {
        let direct = PathBuf::from(reference);
        if direct.is_file() {
            let name = self
                .versioned_name(&direct)
                .unwrap_or_else(|| derive_scraper_name(&direct));
            return Ok((direct, name));
        }

        let Some((name, version)) = reference.split_once('@') else {
            return Err(ScrapeError::LoadError(format!(
                "scraper definition not found: {reference}"
            )));
        };
        if name.is_empty() || version.is_empty() {
            return Err(ScrapeError::LoadError(format!(
                "expected a file path or name@version, got: {reference}"
            )));
        }

        let version = if version == "latest" {
            self.latest_version(name)?
        } else {
            version.to_string()
        };

        let base = self.dir.join(name);
        EXTENSIONS
            .iter()
            .map(|ext| base.join(format!("{version}.{ext}")))
            .find(|candidate| candidate.is_file())
            .map(|path| (path, format!("{name}@{version}")))
            .ok_or_else(|| {
                ScrapeError::LoadError(format!(
                    "scraper definition not found: {}",
                    base.join(format!("{version}.{{json,yaml,yml}}")).display()
                ))
            })
    }

    /// `name@version` when `path` sits at `{dir}/{name}/{version}.{ext}`.
    fn versioned_name(&self, path: &Path) -> Option<String> {
        let dir = self.dir.canonicalize().ok()?;
        let path = path.canonicalize().ok()?;
        let relative = path.strip_prefix(&dir).ok()?;

        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        match parts.as_slice() {
            [name, file] => {
                let version = Path::new(file).file_stem()?.to_str()?;
                Some(format!("{name}@{version}"))
            }
            _ => None,
        }
    }

    fn latest_version(&self, name: &str) -> Result<String> {
        let path = self.dir.join(REGISTRY_FILE);
        let source = fs::read_to_string(&path).map_err(|e| {
            ScrapeError::LoadError(format!("failed to read registry {}: {e}", path.display()))
        })?;
        let registry: HashMap<String, String> = serde_json::from_str(&source)?;
        registry
            .get(name)
            .cloned()
            .ok_or_else(|| {
                ScrapeError::LoadError(format!("no latest version registered for {name}"))
            })
    }
}

/// Parse a definition file as YAML or JSON according to its extension.
fn read_definition(path: &Path) -> Result<serde_json::Value> {
    let source = fs::read_to_string(path)?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    if is_yaml {
        Ok(serde_yaml_ng::from_str(&source)?)
    } else {
        Ok(serde_json::from_str(&source)?)
    }
}

/// File stem of a definition path: `"scrapers/product.yaml"` gives `"product"`.
pub fn derive_scraper_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("default")
        .to_string()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::testutil::LINKS_PAGE;

    const JSON_DEF: &str = r#"{"title": "h1"}"#;
    const YAML_DEF: &str = "title: h1\nlinks[]:\n  sel: a\n  attr: href\n";

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_resolve_direct_path() {
        let tmp = TempDir::new().unwrap();
        let file = write(tmp.path(), "product.json", JSON_DEF);

        let resolved = ScraperResolver::new(tmp.path().join("scrapers"))
            .resolve(file.to_str().unwrap())
            .unwrap();
        assert_eq!(resolved.name, "product");
        assert_eq!(resolved.path, file);
        assert_eq!(resolved.definition, serde_json::json!({"title": "h1"}));
    }

    #[test]
    fn test_resolve_versioned_yaml() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "blog/1.2.0.yaml", YAML_DEF);

        let resolved = ScraperResolver::new(tmp.path()).resolve("blog@1.2.0").unwrap();
        assert_eq!(resolved.name, "blog@1.2.0");
        assert_eq!(resolved.path, tmp.path().join("blog/1.2.0.yaml"));

        let value = resolved
            .compile(&ScraperConfig::default())
            .unwrap()
            .scrape_html(LINKS_PAGE)
            .unwrap();
        assert_eq!(
            value.to_json(),
            serde_json::json!({"title": "Hello", "links": ["/x", "/y"]})
        );
    }

    #[test]
    fn test_resolve_latest_via_registry() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "blog/2.0.0.json", JSON_DEF);
        write(tmp.path(), "registry.json", r#"{"blog": "2.0.0"}"#);

        let resolved = ScraperResolver::new(tmp.path()).resolve("blog@latest").unwrap();
        assert_eq!(resolved.name, "blog@2.0.0");
    }

    #[test]
    fn test_resolve_failures() {
        let tmp = TempDir::new().unwrap();
        let resolver = ScraperResolver::new(tmp.path());

        for reference in ["missing@1.0.0", "no-at-sign", "@1.0.0", "name@", "blog@latest"] {
            let err = resolver.resolve(reference).unwrap_err();
            assert!(matches!(err, ScrapeError::LoadError(_)), "{reference}: {err}");
        }
    }

    #[test]
    fn test_direct_path_inside_dir_gets_versioned_name() {
        let tmp = TempDir::new().unwrap();
        let file = write(tmp.path(), "shop/3.yml", YAML_DEF);
        write(tmp.path(), "flat.json", JSON_DEF);

        let resolver = ScraperResolver::new(tmp.path());
        assert_eq!(resolver.resolve(file.to_str().unwrap()).unwrap().name, "shop@3");
        let flat = tmp.path().join("flat.json");
        assert_eq!(resolver.resolve(flat.to_str().unwrap()).unwrap().name, "flat");
    }

    #[test]
    fn test_invalid_definition_fails_at_compile() {
        let tmp = TempDir::new().unwrap();
        let file = write(tmp.path(), "bad.json", r#"{"title": {"sel": "h1", "limit": 2}}"#);

        let resolved = ScraperResolver::new(tmp.path())
            .resolve(file.to_str().unwrap())
            .unwrap();
        let err = resolved.compile(&ScraperConfig::default()).unwrap_err();
        assert!(err.is_specification_error());
    }

    #[test]
    fn test_derive_scraper_name() {
        assert_eq!(derive_scraper_name(Path::new("product.json")), "product");
        assert_eq!(derive_scraper_name(Path::new("defs/real_estate.yaml")), "real_estate");
        assert_eq!(derive_scraper_name(Path::new("plain")), "plain");
    }
}

use scraper::{ElementRef, Html};

use crate::config::ScraperConfig;
use crate::engine::{CompiledField, Evaluator, compile_fields};
use crate::error::{Result, RuntimeError, ScrapeError};
use crate::model::Specification;
use crate::selector::SelectorGuard;
use crate::validate::validate;
use crate::value::ExtractedValue;

/// A validated, compiled scraper, ready to run against any number of
/// documents.
///
/// Building a `Scraper` parses, validates and compiles the definition in one
/// go; a definition with any issue never produces a `Scraper`. The result is
/// immutable and can be shared across threads; each evaluation keeps its own
/// state.
#[derive(Debug, Clone)]
pub struct Scraper {
    spec: Specification,
    config: ScraperConfig,
    guard: SelectorGuard,
    fields: Vec<CompiledField>,
}

impl Scraper {
    /// Build a scraper from an already parsed model with default limits.
    pub fn new(spec: Specification) -> Result<Self> {
        Self::new_with_config(spec, ScraperConfig::default())
    }

    pub fn new_with_config(spec: Specification, config: ScraperConfig) -> Result<Self> {
        let issues = validate(&spec, &config);
        if !issues.is_empty() {
            tracing::debug!(issues = issues.len(), "Rejected scraper definition");
            return Err(ScrapeError::InvalidScraper(issues));
        }

        let guard = SelectorGuard::from_config(&config);
        let fields = compile_fields(&spec.fields, &guard, &config).map_err(|issues| {
            tracing::debug!(issues = issues.len(), "Rejected scraper definition");
            ScrapeError::InvalidScraper(issues)
        })?;

        tracing::debug!(fields = spec.fields.len(), "Compiled scraper");
        Ok(Self {
            spec,
            config,
            guard,
            fields,
        })
    }

    /// Build a scraper from a raw JSON/YAML-shaped definition.
    pub fn from_value(raw: &serde_json::Value) -> Result<Self> {
        Self::from_value_with_config(raw, ScraperConfig::default())
    }

    pub fn from_value_with_config(raw: &serde_json::Value, config: ScraperConfig) -> Result<Self> {
        let (spec, mut issues) = Specification::parse_with_issues(raw);
        if !issues.is_empty() {
            // Fields that parsed cleanly still get the static checks.
            issues.extend(validate(&spec, &config));
            tracing::debug!(issues = issues.len(), "Rejected scraper definition");
            return Err(ScrapeError::InvalidScraper(issues));
        }
        Self::new_with_config(spec, config)
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        Self::from_json_str_with_config(source, ScraperConfig::default())
    }

    pub fn from_json_str_with_config(source: &str, config: ScraperConfig) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(source)?;
        Self::from_value_with_config(&raw, config)
    }

    pub fn from_yaml_str(source: &str) -> Result<Self> {
        Self::from_yaml_str_with_config(source, ScraperConfig::default())
    }

    pub fn from_yaml_str_with_config(source: &str, config: ScraperConfig) -> Result<Self> {
        let raw: serde_json::Value = serde_yaml_ng::from_str(source)?;
        Self::from_value_with_config(&raw, config)
    }

    pub fn specification(&self) -> &Specification {
        &self.spec
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Evaluate the scraper with `root` as the context of its top-level fields.
    ///
    /// The first runtime error aborts the document; no partial record is
    /// returned.
    pub fn evaluate(
        &self,
        root: ElementRef<'_>,
    ) -> std::result::Result<ExtractedValue, RuntimeError> {
        let mut evaluator = Evaluator::new(&self.guard);
        match evaluator.record(&self.fields, root, None) {
            Ok(record) => Ok(ExtractedValue::Record(record)),
            Err(err) => {
                tracing::debug!(path = %err.path(), error = %err, "Aborted document evaluation");
                Err(err)
            }
        }
    }

    /// Parse a full HTML document and evaluate the scraper against it.
    pub fn scrape_html(&self, html: &str) -> Result<ExtractedValue> {
        let document = Html::parse_document(html);
        Ok(self.evaluate(document.root_element())?)
    }

    /// Parse an HTML fragment and evaluate the scraper against it.
    pub fn scrape_fragment(&self, html: &str) -> Result<ExtractedValue> {
        let fragment = Html::parse_fragment(html);
        Ok(self.evaluate(fragment.root_element())?)
    }
}

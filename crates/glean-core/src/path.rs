use std::fmt;

use serde::Serialize;

/// One breadcrumb segment: a field name or a plural iteration index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Name(String),
    Index(usize),
}

/// Location of a field inside a scraper definition, from the root field down.
///
/// Rendered as `links[1].href`; the root itself renders as `<root>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn push_name(&mut self, name: impl Into<String>) {
        self.0.push(PathSegment::Name(name.into()));
    }

    pub fn push_index(&mut self, index: usize) {
        self.0.push(PathSegment::Index(index));
    }

    pub fn pop(&mut self) -> Option<PathSegment> {
        self.0.pop()
    }

    /// Returns a copy of this path extended with a name segment.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut path = self.clone();
        path.push_name(name);
        path
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0
            .iter()
            .filter(|s| matches!(s, PathSegment::Name(_)))
            .count()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Name(name) if i == 0 => write!(f, "{name}")?,
                PathSegment::Name(name) => write!(f, ".{name}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for FieldPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|s| PathSegment::Name(s.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_and_indices() {
        let mut path = FieldPath::root();
        path.push_name("links");
        path.push_index(1);
        path.push_name("href");
        assert_eq!(path.to_string(), "links[1].href");
        assert_eq!(path.depth(), 2);
    }

    #[test]
    fn test_root_display() {
        assert_eq!(FieldPath::root().to_string(), "<root>");
    }

    #[test]
    fn test_push_pop_restores() {
        let mut path: FieldPath = ["items"].into_iter().collect();
        path.push_index(3);
        assert_eq!(path.pop(), Some(PathSegment::Index(3)));
        assert_eq!(path.to_string(), "items");
    }
}

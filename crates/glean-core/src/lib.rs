pub mod config;
pub mod document;
mod engine;
pub mod error;
pub mod expression;
pub mod issue;
pub mod loader;
pub mod model;
pub mod path;
pub mod sandbox;
pub mod scrape;
pub mod selector;
pub mod validate;
pub mod value;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::ScraperConfig;
pub use error::{RuntimeError, ScrapeError};
pub use issue::{IssueKind, ValidationIssue};
pub use loader::{ResolvedScraper, ScraperResolver, derive_scraper_name};
pub use model::{Cardinality, Extraction, FieldBody, FieldSpec, Modifiers, Specification, ValueType};
pub use path::FieldPath;
pub use scrape::Scraper;
pub use validate::validate;
pub use value::{ExtractedValue, Record, Scalar, compute_hash};

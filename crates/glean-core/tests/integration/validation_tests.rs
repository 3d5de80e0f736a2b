use glean_core::{
    FieldSpec, IssueKind, ScrapeError, Scraper, ScraperConfig, Specification, validate,
};
use serde_json::json;

use crate::integration::common::init_tracing;

fn rejected(definition: serde_json::Value) -> Vec<glean_core::ValidationIssue> {
    init_tracing();
    match Scraper::from_value(&definition) {
        Err(ScrapeError::InvalidScraper(issues)) => issues,
        Err(other) => panic!("expected InvalidScraper, got {other:?}"),
        Ok(_) => panic!("definition was accepted"),
    }
}

#[test]
fn colliding_keys_report_one_conflict() {
    let issues = rejected(json!({
        "title": "h1",
        "links": "a",
        "links[]": { "sel": "a", "attr": "href" }
    }));

    assert_eq!(issues.len(), 1);
    assert_eq!(
        issues[0].kind,
        IssueKind::Conflict {
            keys: vec!["links".into(), "links[]".into()]
        }
    );
}

#[test]
fn single_field_modifier_is_irrelevant() {
    let issues = rejected(json!({ "title": { "sel": "h1", "dedupe": true } }));

    assert_eq!(issues.len(), 1);
    assert_eq!(
        issues[0].kind,
        IssueKind::IrrelevantPluralModifier {
            modifier: "dedupe".into()
        }
    );
    assert_eq!(issues[0].path.to_string(), "title");
}

#[test]
fn over_budget_selector_rejected_at_load() {
    let selector = (0..40).map(|i| format!("div.l{i}")).collect::<Vec<_>>().join(" > ");
    let issues = rejected(json!({ "deep": selector }));

    assert_eq!(issues.len(), 1);
    assert!(matches!(
        issues[0].kind,
        IssueKind::CssSelectorTooComplex { complexity: 39, max: 32, .. }
    ));

    // A larger budget accepts the same definition.
    let config = ScraperConfig::default().with_max_selector_complexity(64);
    assert!(Scraper::from_value_with_config(&json!({ "deep": selector }), config).is_ok());
}

#[test]
fn every_issue_is_reported_at_once() {
    let issues = rejected(json!({
        "a": { "sel": "h1", "attr": "href", "eval": "node.text" },
        "b": { "sel": "table", "extraction": "table", "fields": { "x": "td" } },
        "c": { "sel": "p", "bogus": 1 },
        "d[]": { "sel": "p", "limit": -2 }
    }));

    // Static issues in fields that parsed cleanly are reported alongside.
    let codes: Vec<&str> = issues.iter().map(|i| i.code()).collect();
    assert_eq!(
        codes,
        vec![
            "mixed_concern",
            "table_shape",
            "unknown_key",
            "invalid_plural_modifier"
        ]
    );
    assert_eq!(issues[3].path.to_string(), "d");
}

#[test]
fn structural_issue_does_not_hide_static_ones() {
    let issues = rejected(json!({
        "c": { "sel": "p", "bogus": 1 },
        "d[]": { "sel": "p", "limit": -2 },
        "f": "a["
    }));

    let codes: Vec<&str> = issues.iter().map(|i| i.code()).collect();
    assert_eq!(
        codes,
        vec!["unknown_key", "invalid_plural_modifier", "invalid_css_selector"]
    );
}

#[test]
fn record_keeps_its_clean_children_for_validation() {
    let issues = rejected(json!({
        "posts[]": {
            "sel": "article",
            "fields": {
                "title": { "sel": "h2", "bogus": true },
                "tags": { "sel": "li", "dedupe": true }
            }
        }
    }));

    assert_eq!(issues.len(), 2);
    assert_eq!(issues[0].code(), "unknown_key");
    assert_eq!(issues[0].path.to_string(), "posts.title");
    assert_eq!(
        issues[1].kind,
        IssueKind::IrrelevantPluralModifier {
            modifier: "dedupe".into()
        }
    );
    assert_eq!(issues[1].path.to_string(), "posts.tags");
}

#[test]
fn structural_and_static_checks_are_separate_phases() {
    // The parser accepts this; the validator rejects it.
    let issues = rejected(json!({
        "d[]": { "sel": "p", "limit": -2 },
        "e": { "eval": "node.text +" },
        "f": "p:nth-child("
    }));

    let codes: Vec<&str> = issues.iter().map(|i| i.code()).collect();
    assert_eq!(
        codes,
        vec!["invalid_plural_modifier", "eval_syntax", "invalid_css_selector"]
    );
}

#[test]
fn programmatic_models_are_validated_too() {
    let spec = Specification::new(vec![
        FieldSpec::text("title", "h1"),
        FieldSpec::record("meta", vec![FieldSpec::text("title", "h2")]),
        FieldSpec::text("title", "h3"),
    ]);

    let issues = validate(&spec, &ScraperConfig::default());
    assert_eq!(issues.len(), 1);
    assert_eq!(
        issues[0].kind,
        IssueKind::DuplicateField {
            name: "title".into()
        }
    );

    let err = Scraper::new(spec).unwrap_err();
    assert!(err.is_specification_error());
}

#[test]
fn issues_serialize_with_code_and_path() {
    let issues = rejected(json!({ "links": { "sel": "a", "limit": 3 } }));
    assert_eq!(
        serde_json::to_value(&issues[0]).unwrap(),
        json!({
            "path": ["links"],
            "code": "irrelevant_plural_modifier",
            "modifier": "limit",
            "message": issues[0].message,
        })
    );
}

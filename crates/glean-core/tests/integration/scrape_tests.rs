use glean_core::{ExtractedValue, RuntimeError, ScrapeError, Scraper};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::integration::common::{BLOG_PAGE, scraper};

#[test]
fn title_and_plural_links() {
    let scraper = scraper(json!({
        "title": "h1",
        "links": {
            "sel": "a",
            "extraction": { "attribute": "href" },
            "cardinality": "plural"
        }
    }));

    let value = scraper.scrape_html(BLOG_PAGE).unwrap();
    assert_eq!(value.to_json(), json!({ "title": "Hello", "links": ["/x", "/y"] }));
}

#[test]
fn limit_truncates_plural_links() {
    let scraper = scraper(json!({
        "title": "h1",
        "links[]": { "sel": "a", "attr": "href", "limit": 1 }
    }));

    let value = scraper.scrape_html(BLOG_PAGE).unwrap();
    assert_eq!(value.to_json(), json!({ "title": "Hello", "links": ["/x"] }));
}

#[test]
fn plural_is_list_unless_joined() {
    let scraper = scraper(json!({
        "tags[]": "article .tags li",
        "joined[]": { "sel": "article .tags li", "dedupe": true, "join": " | " }
    }));

    let value = scraper.scrape_html(BLOG_PAGE).unwrap();
    assert!(matches!(value.get("tags"), Some(ExtractedValue::List(items)) if items.len() == 4));
    assert_eq!(value.get("joined"), Some(&ExtractedValue::text("rust | html | css")));
}

#[test]
fn missing_single_is_absent_not_an_error() {
    let scraper = scraper(json!({ "subtitle": "h3", "title": "h1" }));

    let value = scraper.scrape_html(BLOG_PAGE).unwrap();
    assert!(value.get("subtitle").unwrap().is_absent());
    assert_eq!(value.to_json(), json!({ "subtitle": null, "title": "Hello" }));
}

#[test]
fn nested_records_with_eval() {
    let scraper = scraper(json!({
        "posts[]": {
            "sel": "article.post",
            "fields": [
                { "name": "id", "eval": "int(node.attr('data-id'))", "type": "number" },
                { "name": "title", "sel": "h2" },
                { "name": "author", "sel": ".author", "default": "anonymous" },
                { "name": "tags[]", "sel": "li", "dedupe": true },
                { "name": "slug", "eval": "lower(record.title).replace(' ', '-')", "type": "string" }
            ]
        }
    }));

    let value = scraper.scrape_html(BLOG_PAGE).unwrap();
    assert_eq!(
        value.to_json(),
        json!({
            "posts": [
                { "id": 1, "title": "First post", "author": "ann", "tags": ["rust", "html"], "slug": "first-post" },
                { "id": 2, "title": "Second post", "author": "anonymous", "tags": ["css"], "slug": "second-post" }
            ]
        })
    );
}

#[test]
fn table_rows_in_document_order() {
    let scraper = scraper(json!({ "stats": { "sel": ".stats table", "extraction": "table" } }));

    let value = scraper.scrape_html(BLOG_PAGE).unwrap();
    assert_eq!(
        value.to_json(),
        json!({ "stats": [["Month", "Views"], ["Jan", "120"], ["Feb", "95"]] })
    );
}

#[test]
fn not_a_table_aborts_whole_document() {
    let scraper = scraper(json!({
        "title": "h1",
        "posts[]": {
            "sel": "article.post",
            "fields": { "grid": { "sel": "ul", "extraction": "table" } }
        }
    }));

    // No partial record: the title resolved fine, but the call still fails.
    let err = scraper.scrape_html(BLOG_PAGE).unwrap_err();
    assert!(err.aborts_document());
    match err {
        ScrapeError::Runtime(RuntimeError::NotATable { tag, path }) => {
            assert_eq!(tag, "ul");
            assert_eq!(path.to_string(), "posts[0].grid");
        }
        other => panic!("expected NotATable, got {other:?}"),
    }
}

#[test]
fn eval_type_and_none_errors() {
    let typed = scraper(json!({ "n": { "sel": "h1", "eval": "node.text", "type": "number" } }));
    let err = typed.scrape_html(BLOG_PAGE).unwrap_err();
    assert!(matches!(
        err,
        ScrapeError::Runtime(RuntimeError::EvalType { ref expected, ref got, .. })
            if expected == "number" && got == "string"
    ));

    let none = scraper(json!({
        "n": { "sel": "h1", "eval": "node.attr('id')", "type": "string" }
    }));
    let err = none.scrape_html(BLOG_PAGE).unwrap_err();
    assert!(matches!(err, ScrapeError::Runtime(RuntimeError::EvalNone { .. })));
}

#[test]
fn runtime_selector_inside_eval_is_guarded() {
    let scraper = scraper(json!({ "x": { "eval": "len(node.select('div >'))" } }));
    let err = scraper.scrape_html(BLOG_PAGE).unwrap_err();
    match err {
        ScrapeError::Runtime(RuntimeError::InvalidCssSelector { selector, path, .. }) => {
            assert_eq!(selector, "div >");
            assert_eq!(path.to_string(), "x");
        }
        other => panic!("expected InvalidCssSelector, got {other:?}"),
    }
}

#[test]
fn evaluation_is_idempotent() {
    let scraper = scraper(json!({
        "title": "h1",
        "posts[]": { "sel": "article", "fields": { "title": "h2", "tags[]": "li" } }
    }));

    let first = scraper.scrape_html(BLOG_PAGE).unwrap();
    let second = scraper.scrape_html(BLOG_PAGE).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.fingerprint(), second.fingerprint());
}

#[test]
fn yaml_definition() {
    let scraper = Scraper::from_yaml_str(
        r#"
title: h1
links[]:
  sel: nav a
  attr: href
  join: ","
"#,
    )
    .unwrap();

    let value = scraper.scrape_html(BLOG_PAGE).unwrap();
    assert_eq!(value.to_json(), json!({ "title": "Hello", "links": "/x,/y" }));
}

#[test]
fn serializes_in_field_order() {
    let scraper = scraper(json!({ "z": "h1", "a": "h2" }));
    let value = scraper.scrape_html(BLOG_PAGE).unwrap();
    assert_eq!(
        serde_json::to_string(&value).unwrap(),
        r#"{"z":"Hello","a":"First post"}"#
    );
}

#[test]
fn markup_extractions_keep_serialized_html() {
    let scraper = scraper(json!({
        "author": { "sel": ".author", "extraction": "outer_html" },
        "tags": { "sel": "article .tags", "extraction": "html" },
        "tags_again": { "sel": "article .tags", "extraction": "inner_html" }
    }));

    let value = scraper.scrape_html(BLOG_PAGE).unwrap();
    assert_eq!(
        value.to_json(),
        json!({
            "author": r#"<span class="author">ann</span>"#,
            "tags": "<li>rust</li><li>html</li><li>rust</li>",
            "tags_again": "<li>rust</li><li>html</li><li>rust</li>"
        })
    );
}

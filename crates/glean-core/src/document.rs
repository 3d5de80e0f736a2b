//! Read-only helpers over `scraper` element trees.

use scraper::{ElementRef, Node};

/// Elements whose text never renders.
const INVISIBLE_TAGS: &[&str] = &["script", "style", "template", "noscript"];

/// Trimmed text content of `el`, skipping script/style/template/noscript.
pub fn visible_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(el, &mut out);
    out.trim().to_string()
}

fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) if INVISIBLE_TAGS.contains(&element.name()) => {}
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
            }
            _ => {}
        }
    }
}

pub fn tag_name<'a>(el: ElementRef<'a>) -> &'a str {
    el.value().name()
}

pub fn attribute<'a>(el: ElementRef<'a>, name: &str) -> Option<&'a str> {
    el.value().attr(name)
}

pub fn inner_html(el: ElementRef<'_>) -> String {
    el.inner_html()
}

pub fn outer_html(el: ElementRef<'_>) -> String {
    el.html()
}

pub fn is_table(el: ElementRef<'_>) -> bool {
    tag_name(el).eq_ignore_ascii_case("table")
}

/// Rows of a `<table>`, each a list of cell texts, in document order.
///
/// Rows come from the table itself and its `thead`/`tbody`/`tfoot` sections;
/// rows of nested tables are not included.
pub fn table_rows(table: ElementRef<'_>) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match tag_name(child) {
            "tr" => rows.push(row_cells(child)),
            "thead" | "tbody" | "tfoot" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|el| tag_name(*el) == "tr")
                    .map(row_cells),
            ),
            _ => {}
        }
    }
    rows
}

fn row_cells(row: ElementRef<'_>) -> Vec<String> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| matches!(tag_name(*el), "td" | "th"))
        .map(visible_text)
        .collect()
}

use std::sync::Arc;
use std::thread;

use serde_json::json;

use crate::integration::common::{BLOG_PAGE, scraper};

#[test]
fn one_scraper_many_threads() {
    let scraper = Arc::new(scraper(json!({
        "title": "h1",
        "posts[]": {
            "sel": "article.post",
            "fields": {
                "title": "h2",
                "position": { "eval": "index", "type": "number" }
            }
        }
    })));
    let expected = scraper.scrape_html(BLOG_PAGE).unwrap();

    thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let scraper = Arc::clone(&scraper);
                s.spawn(move || scraper.scrape_html(BLOG_PAGE).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

#[test]
fn failures_stay_with_their_document() {
    let scraper = scraper(json!({ "grid": { "sel": "table, ul", "extraction": "table" } }));

    thread::scope(|s| {
        let good = s.spawn(|| scraper.scrape_html("<table><tr><td>1</td></tr></table>"));
        let bad = s.spawn(|| scraper.scrape_html("<ul><li>1</li></ul>"));

        assert_eq!(
            good.join().unwrap().unwrap().to_json(),
            json!({ "grid": [["1"]] })
        );
        assert!(bad.join().unwrap().unwrap_err().aborts_document());
    });
}

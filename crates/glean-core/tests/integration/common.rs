use std::sync::Once;

use glean_core::Scraper;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Build a scraper from a JSON definition, panicking with the issues if it
/// is rejected.
pub fn scraper(definition: serde_json::Value) -> Scraper {
    init_tracing();
    match Scraper::from_value(&definition) {
        Ok(scraper) => scraper,
        Err(err) => panic!("definition rejected: {err:?}"),
    }
}

pub const BLOG_PAGE: &str = r#"<!DOCTYPE html>
<html>
  <body>
    <h1>Hello</h1>
    <nav><a href="/x">X</a><a href="/y">Y</a></nav>
    <article class="post" data-id="1">
      <h2>First post</h2>
      <span class="author">ann</span>
      <ul class="tags"><li>rust</li><li>html</li><li>rust</li></ul>
    </article>
    <article class="post" data-id="2">
      <h2>Second post</h2>
      <ul class="tags"><li>css</li></ul>
    </article>
    <div class="stats">
      <table>
        <thead><tr><th>Month</th><th>Views</th></tr></thead>
        <tbody>
          <tr><td>Jan</td><td>120</td></tr>
          <tr><td>Feb</td><td>95</td></tr>
        </tbody>
      </table>
    </div>
  </body>
</html>"#;

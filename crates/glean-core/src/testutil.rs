//! Test fixtures: sample documents shared by unit tests.

/// A product page with a title, tags (one of them empty), variants and a
/// spec table.
pub const PRODUCT_PAGE: &str = r#"<!DOCTYPE html>
<html>
  <head><title>Trail Shoe | Shop</title><script>var tracking = "x";</script></head>
  <body>
    <h1>Trail Shoe</h1>
    <ul class="tags">
      <li class="tag">outdoor</li>
      <li class="tag">running</li>
      <li class="tag">outdoor</li>
      <li class="tag"> </li>
    </ul>
    <div class="variant"><span class="size">42</span><span class="price">$89.50</span></div>
    <div class="variant"><span class="size">43</span><span class="price">$91.00</span></div>
    <table class="specs">
      <tr><th>Weight</th><td>280g</td></tr>
      <tr><th>Drop</th><td>6mm</td></tr>
    </table>
  </body>
</html>"#;

/// A heading and two links.
pub const LINKS_PAGE: &str = r#"<html><body>
  <h1>Hello</h1>
  <a href="/x">X</a>
  <a href="/y">Y</a>
</body></html>"#;

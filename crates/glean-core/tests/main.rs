mod integration {
    pub mod common;
    mod concurrency_tests;
    mod scrape_tests;
    mod validation_tests;
}

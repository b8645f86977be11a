pub mod cache_tests;
pub mod config_tests;
pub mod error_tests;
pub mod file_discovery_tests;
pub mod output_tests;
pub mod parser_tests;
pub mod schema_loader_tests;
pub mod validation_tests;

pub mod cases;
pub mod catalog_db;
pub mod config;
pub mod o11y;
pub mod probe;
pub mod report;
pub mod rules;
pub mod runner;

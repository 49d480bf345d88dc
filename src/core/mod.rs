pub mod config;
pub mod error;
pub mod formatter;
pub mod models;
pub mod report;
pub mod usage;

pub mod aggregator;
pub mod pricing;
pub mod scanner;
pub mod source;

pub mod comparison;
pub mod session;
pub mod window;

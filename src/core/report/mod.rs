pub mod compare;
pub mod lock;
pub mod manager;
pub mod render;
pub mod sidecar;
pub mod store;

pub mod buffer;
pub mod engine;
pub mod export;
pub mod session;
pub mod source;
pub mod trend;

pub mod app;
pub mod error;
pub mod monitor_modules;

pub use error::MonitorError;

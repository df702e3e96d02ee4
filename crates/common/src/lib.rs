pub mod alerts;
pub mod analytics;
pub mod validation;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

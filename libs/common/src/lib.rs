//! Basic library shared by the auto-deploy tooling
//!
//! Provides:
//! - logging initialisation (console + optional rolling file)
//! - CSV header validation for tabular inputs

pub mod logging;
pub mod validation;

pub use logging::{init_with_config, redact_url, LogConfig, LogGuard};
pub use validation::{CsvFields, CsvHeaderValidator, HeaderReport};

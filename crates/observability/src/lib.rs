//! Process-wide tracing setup shared by every binary embedding the ledger.

/// Log format selection and subscriber installation.
pub mod tracing;

pub use tracing::{LogConfig, LogFormat, ParseLogFormatError};

/// Initialize process-wide tracing/logging.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(config: &LogConfig) {
    tracing::init(config);
}

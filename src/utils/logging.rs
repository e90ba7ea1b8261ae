//! Conditional logging macros gated on a module-level `ENABLE_LOGS` flag.
//!
//! The readiness gate and the phase scheduler run on every camera frame and
//! every timer tick, so their chatter is switchable per module:
//! ```rust,ignore
//! const ENABLE_LOGS: bool = false;
//!
//! use crate::{log_debug, log_info, log_warn};
//!
//! log_info!("phase changed to {}", index);
//! ```

/// Debug-level log, emitted only when the calling module sets `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

/// Info-level log, emitted only when the calling module sets `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Warn-level log, emitted only when the calling module sets `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Initialise `env_logger` once for the process.
///
/// `RUST_LOG` overrides the default `Info` filter. Calling this twice (tests,
/// embedding hosts that already installed a logger) is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}

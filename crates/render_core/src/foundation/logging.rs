//! Logging utilities and structured logging support

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system with a fallback level when `RUST_LOG` is unset.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_with_level(level: log::LevelFilter) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

//! Logging setup.
//!
//! The crate logs through `tracing`; applications install a subscriber once at
//! startup. Breadcrumb events use the [`BREADCRUMB_TARGET`] target so they can
//! be routed separately (e.g. to a crash reporter).

use tracing_subscriber::EnvFilter;

pub const BREADCRUMB_TARGET: &str = "breadcrumb";

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to `default_directive`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_logging(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Record a structured breadcrumb.
#[macro_export]
macro_rules! breadcrumb {
    ($category:expr, $message:expr $(, $($fields:tt)+)?) => {
        ::tracing::info!(
            target: $crate::logging::BREADCRUMB_TARGET,
            category = $category,
            $($($fields)+,)?
            "{}",
            $message
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        let _ = init_logging("debug");
        assert!(!init_logging("debug"));
        crate::breadcrumb!("test", "breadcrumb emitted", answer = 42);
    }
}

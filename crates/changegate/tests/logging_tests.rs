//! Logging bootstrap against a host that already owns the `log` logger.
//!
//! Lives in its own test binary because it installs process-global state.

use changegate::{init_logging, ConfigError, LoggingConfig};

struct HostLogger;

impl log::Log for HostLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, _record: &log::Record) {}

    fn flush(&self) {}
}

static HOST_LOGGER: HostLogger = HostLogger;

#[test]
fn test_existing_log_logger_leaves_tracing_untouched() {
    log::set_logger(&HOST_LOGGER).unwrap();

    let err = init_logging(&LoggingConfig::default()).unwrap_err();
    assert!(matches!(err, ConfigError::Logging(_)));
    assert!(!tracing::dispatcher::has_been_set());
}

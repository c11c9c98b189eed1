use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "integribot.log";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// `RUST_LOG` when set and valid, else the configured level, else `info`.
fn build_filter(rust_log: Option<&str>, configured: &str) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(configured).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Console plus a daily-rotated file in `log_dir`. A second call is a no-op.
pub fn init(log_dir: &Path, configured_level: &str) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_filter(rust_log.as_deref(), configured_level);

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init();

    if installed.is_ok() {
        let _ = FILE_GUARD.set(guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn rust_log_overrides_configured_level() {
        assert_eq!(
            build_filter(Some("warn"), "debug").max_level_hint(),
            Some(LevelFilter::WARN)
        );
        assert_eq!(
            build_filter(None, "debug").max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
    }

    #[test]
    fn unparsable_directives_fall_back() {
        assert_eq!(
            build_filter(Some("integribot=loud"), "error").max_level_hint(),
            Some(LevelFilter::ERROR)
        );
    }
}

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initializes the tracing subscriber with console output and an env
/// filter, bridging `log` crate macros through `tracing-log`.
///
/// The level argument is the CLI's `--log-level`; `RUST_LOG` takes
/// precedence when set. Safe to call multiple times; a second call is a
/// no-op (tests may initialize repeatedly).
pub fn init_logging(level: &str) {
    use tracing_log::LogTracer;
    use tracing_subscriber::fmt;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = fmt::layer().with_target(true);

    let _ = LogTracer::init();
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

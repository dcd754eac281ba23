use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Workspace crates whose coalescing and fetch events are worth seeing by
/// default.
const WORKSPACE_TARGETS: [&str; 3] = ["flight", "data_access", "flightdeck"];

/// Installs the global subscriber. Keep the returned guard alive for as long
/// as logs should be flushed.
///
/// `RUST_LOG` wins when set; otherwise dependencies log at `info` and the
/// workspace crates at `debug` (`info` in release builds).
pub fn logging_stdout() -> impl Drop {
    let (nonblocking, guard) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(nonblocking)
                .with_target(true)
                .with_file(cfg!(debug_assertions))
                .with_line_number(cfg!(debug_assertions)),
        )
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directives(cfg!(debug_assertions)))),
        )
        .init();

    guard
}

fn default_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    let mut directives = vec!["info".to_owned()];
    directives.extend(WORKSPACE_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",")
}

use std::sync::Once;

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::FmtSubscriber;

use crate::config::LogConfig;

static INIT: Once = Once::new();

/// `RUST_LOG` when set, otherwise the configured level.
fn env_filter(config: &LogConfig) -> EnvFilter {
    match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => {
            EnvFilter::builder().parse_lossy(directives)
        }
        _ => EnvFilter::builder().parse_lossy(&config.level),
    }
}

fn is_debug(level: &str) -> bool {
    level.eq_ignore_ascii_case("debug") || level.eq_ignore_ascii_case("trace")
}

/// Install the global subscriber. Later calls are no-ops.
///
/// Logs go to stderr so command output on stdout stays machine readable.
pub fn init(config: &LogConfig) {
    INIT.call_once(|| {
        let builder = FmtSubscriber::builder()
            .with_env_filter(env_filter(config))
            .with_ansi(config.ansi)
            .with_writer(std::io::stderr);

        let result = if is_debug(&config.level) {
            builder
                .with_file(true)
                .with_line_number(true)
                .try_init()
        } else {
            builder.try_init()
        };

        if let Err(err) = result {
            eprintln!("Could not install log subscriber: {err}");
        }
    });
}

//! Tracing subscriber setup for the CLI.
//!
//! Logs go to stderr so stdout stays free for the pairing presenter.

use std::io;

use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

fn is_development() -> bool {
    cfg!(debug_assertions)
}

/// Default filter directives when `RUST_LOG` is not set.
///
/// `verbosity` comes from repeated `-v` flags and only ever raises the level.
fn build_filter_directives(is_dev: bool, verbosity: u8) -> Vec<String> {
    let app_level = match verbosity {
        0 if is_dev => "debug",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    vec![
        "warn".to_string(),
        format!("devlink={app_level}"),
        format!("dl_core={app_level}"),
        format!("dl_app={app_level}"),
        format!("dl_infra={app_level}"),
        "reqwest=warn".to_string(),
        "hyper=warn".to_string(),
    ]
}

/// Initialize the global tracing subscriber. Call once, before the runtime
/// starts doing work.
///
/// # Errors
///
/// Returns `Err` if a subscriber is already registered.
pub fn init_tracing_subscriber(verbosity: u8) -> anyhow::Result<()> {
    let directives = build_filter_directives(is_development(), verbosity);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives.join(",")));

    let stderr_layer = fmt::layer()
        .with_timer(fmt::time::ChronoUtc::new(
            "%Y-%m-%d %H:%M:%S%.3f".to_string(),
        ))
        .with_level(true)
        .with_target(true)
        .with_ansi(cfg!(not(test)))
        .with_writer(io::stderr);

    registry().with(env_filter).with(stderr_layer).try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_defaults_to_info() {
        let directives = build_filter_directives(false, 0);
        assert!(directives.contains(&"dl_app=info".to_string()));
        assert!(directives.contains(&"reqwest=warn".to_string()));
    }

    #[test]
    fn development_defaults_to_debug() {
        let directives = build_filter_directives(true, 0);
        assert!(directives.contains(&"dl_app=debug".to_string()));
    }

    #[test]
    fn verbosity_raises_level() {
        assert!(build_filter_directives(false, 1).contains(&"dl_core=debug".to_string()));
        assert!(build_filter_directives(false, 3).contains(&"dl_core=trace".to_string()));
    }

    #[test]
    fn directives_parse_as_env_filter() {
        let directives = build_filter_directives(true, 2);
        assert!(EnvFilter::try_new(directives.join(",")).is_ok());
    }
}

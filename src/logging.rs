//! Tracing initialisation for the `mdt-rs` binary.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level is `info`, or `debug`
/// with `verbose`. Logs go to stderr so stdout only carries command
/// output. Later calls are no-ops.
pub fn init(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_init_twice_is_harmless() {
        super::init(false);
        super::init(true);
        tracing::info!("still logging");
    }
}

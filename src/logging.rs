use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `--verbose` selects debug output and
/// the listener logs at info so accepted sessions are visible.
pub fn init(verbose: bool, listening: bool) {
    let default = if verbose {
        "certsign=debug"
    } else if listening {
        "certsign=info"
    } else {
        "certsign=error"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    // a second init (e.g. from tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

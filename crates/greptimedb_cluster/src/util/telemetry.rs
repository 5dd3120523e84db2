use tracing_subscriber::{prelude::*, EnvFilter, Registry};

/// Initialize tracing
///
/// `RUST_LOG` overrides the default `info` filter, e.g.
/// `RUST_LOG=greptimedb_cluster=debug,kube=warn`.
pub fn init() {
    let logger = tracing_subscriber::fmt::layer().compact();
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let collector = Registry::default().with(logger).with(env_filter);

    if let Err(e) = tracing::subscriber::set_global_default(collector) {
        eprintln!("tracing subscriber already installed: {e}");
    }
}

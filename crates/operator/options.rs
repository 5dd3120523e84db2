use clap::Parser;
use greptimedb_cluster::config::OperatorOptions;

/// Command line of the operator. Every flag can also come from the environment.
#[derive(Parser, Debug)]
#[command(name = "operator")]
#[command(about = "Kubernetes operator for GreptimeDB clusters", long_about = None)]
pub struct Cli {
    /// Address the health and metrics server binds to.
    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value = "0.0.0.0:8080")]
    metrics_bind_address: String,

    /// Put metasrv into maintenance mode while a new cluster comes up.
    #[arg(long, env = "MAINTENANCE_MODE_WHEN_CREATE_CLUSTER")]
    maintenance_mode_when_create_cluster: bool,

    #[arg(long, env = "REQUEUE_INTERVAL_SECS", default_value_t = 300)]
    requeue_interval_secs: u64,

    /// Upper bound of a single reconcile pass.
    #[arg(long, env = "RECONCILE_TIMEOUT_SECS", default_value_t = 60)]
    reconcile_timeout_secs: u64,

    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 5)]
    http_timeout_secs: u64,
}

impl From<Cli> for OperatorOptions {
    fn from(cli: Cli) -> Self {
        OperatorOptions {
            metrics_bind_address: cli.metrics_bind_address,
            maintenance_mode_when_create_cluster: cli.maintenance_mode_when_create_cluster,
            requeue_interval_secs: cli.requeue_interval_secs,
            reconcile_timeout_secs: cli.reconcile_timeout_secs,
            http_timeout_secs: cli.http_timeout_secs,
        }
    }
}

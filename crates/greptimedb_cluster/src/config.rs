//! Runtime options. Parsed by the operator binary and handed to the controller at startup.

use std::time::Duration;

/// Process-level options of the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorOptions {
    pub metrics_bind_address: String,
    /// Put metasrv into maintenance mode while a new cluster comes up.
    pub maintenance_mode_when_create_cluster: bool,
    pub requeue_interval_secs: u64,
    pub reconcile_timeout_secs: u64,
    pub http_timeout_secs: u64,
}

impl Default for OperatorOptions {
    fn default() -> Self {
        Self {
            metrics_bind_address: "0.0.0.0:8080".to_string(),
            maintenance_mode_when_create_cluster: false,
            requeue_interval_secs: 300,
            reconcile_timeout_secs: 60,
            http_timeout_secs: 5,
        }
    }
}

impl OperatorOptions {
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            maintenance_mode_when_create_cluster: self.maintenance_mode_when_create_cluster,
            requeue_interval: Duration::from_secs(self.requeue_interval_secs),
            reconcile_timeout: Duration::from_secs(self.reconcile_timeout_secs),
            http_timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }
}

/// What the reconciler and deployers need from [`OperatorOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    pub maintenance_mode_when_create_cluster: bool,
    pub requeue_interval: Duration,
    pub reconcile_timeout: Duration,
    pub http_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        OperatorOptions::default().controller_options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ControllerOptions::default();
        assert!(!options.maintenance_mode_when_create_cluster);
        assert_eq!(options.requeue_interval, Duration::from_secs(300));
        assert_eq!(options.http_timeout, Duration::from_secs(5));
    }
}

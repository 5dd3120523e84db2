pub mod cluster_status;
pub mod errors;
pub mod k8s;
pub mod metrics;
pub mod retry;
pub mod status;
pub mod telemetry;

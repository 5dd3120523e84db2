//! Typed projection of the prometheus-operator `PodMonitor`.
//!
//! Only the fields the operator writes are modelled. The CRD itself is owned
//! by prometheus-operator and never generated from here.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const POD_MONITOR_CRD_NAME: &str = "podmonitors.monitoring.coreos.com";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(kind = "PodMonitor", group = "monitoring.coreos.com", version = "v1", namespaced)]
#[serde(rename_all = "camelCase")]
pub struct PodMonitorSpec {
    pub selector: PodMonitorSelector,
    pub namespace_selector: PodMonitorNamespaceSelector,
    pub pod_metrics_endpoints: Vec<PodMetricsEndpoint>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodMonitorSelector {
    pub match_labels: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodMonitorNamespaceSelector {
    pub match_names: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodMetricsEndpoint {
    pub port: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

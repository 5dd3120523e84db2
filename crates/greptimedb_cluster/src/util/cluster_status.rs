use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;

use crate::api::v1alpha1::Phase;
use crate::util::status::{condition, READY_CONDITION};

// Status reasons for conditions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatusReason {
    ComponentsCreating,
    ComponentsUpdating,
    ComponentsReady,
    ReconcileFailed,
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StatusReason::ComponentsCreating => write!(f, "ComponentsCreating"),
            StatusReason::ComponentsUpdating => write!(f, "ComponentsUpdating"),
            StatusReason::ComponentsReady => write!(f, "ComponentsReady"),
            StatusReason::ReconcileFailed => write!(f, "ReconcileFailed"),
        }
    }
}

/// Phase after a pass that completed without a fatal error.
///
/// `Starting` only ever moves forward to `Running`; a running cluster that loses
/// readiness is `Updating`, not `Starting` again.
pub fn next_phase(current: Option<Phase>, all_ready: bool) -> Phase {
    match (current, all_ready) {
        (None, false) | (Some(Phase::Starting), false) => Phase::Starting,
        (Some(Phase::Terminating), _) => Phase::Terminating,
        (_, true) => Phase::Running,
        (Some(Phase::Running), false) | (Some(Phase::Updating), false) => Phase::Updating,
        (Some(Phase::Error), false) => Phase::Error,
    }
}

/// The `Ready` condition for a phase.
pub fn ready_condition(phase: Phase, message: impl Into<String>, observed_generation: Option<i64>) -> Condition {
    let reason = match phase {
        Phase::Running => StatusReason::ComponentsReady,
        Phase::Starting => StatusReason::ComponentsCreating,
        Phase::Updating | Phase::Terminating => StatusReason::ComponentsUpdating,
        Phase::Error => StatusReason::ReconcileFailed,
    };
    condition(
        READY_CONDITION,
        phase == Phase::Running,
        &reason.to_string(),
        message,
        observed_generation,
    )
}

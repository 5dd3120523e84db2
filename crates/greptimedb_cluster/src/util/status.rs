use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

pub const READY_CONDITION: &str = "Ready";
pub const PROGRESSING_CONDITION: &str = "Progressing";

/// Sets the condition of `new_condition.type_` and reports whether anything changed.
///
/// An existing condition keeps its `lastTransitionTime` unless its status flips.
/// A new condition is stamped with the current time and appended.
pub fn set_status_condition(conditions: &mut Vec<Condition>, mut new_condition: Condition) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == new_condition.type_) {
        Some(existing) => {
            let mut changed = false;
            if existing.status != new_condition.status {
                existing.status = new_condition.status;
                existing.last_transition_time = Time(Utc::now());
                changed = true;
            }
            if existing.reason != new_condition.reason {
                existing.reason = new_condition.reason;
                changed = true;
            }
            if existing.message != new_condition.message {
                existing.message = new_condition.message;
                changed = true;
            }
            if existing.observed_generation != new_condition.observed_generation {
                existing.observed_generation = new_condition.observed_generation;
                changed = true;
            }
            changed
        }
        None => {
            new_condition.last_transition_time = Time(Utc::now());
            conditions.push(new_condition);
            true
        }
    }
}

pub fn find_status_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == condition_type)
}

/// Returns true when the condition_type is present and set to `True`
pub fn is_status_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    find_status_condition(conditions, condition_type).is_some_and(|c| c.status == "True")
}

pub fn condition(
    condition_type: &str,
    status: bool,
    reason: &str,
    message: impl Into<String>,
    observed_generation: Option<i64>,
) -> Condition {
    Condition {
        type_: condition_type.to_string(),
        status: if status { "True" } else { "False" }.to_string(),
        reason: reason.to_string(),
        message: message.into(),
        last_transition_time: Time(Utc::now()),
        observed_generation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_status_condition() {
        let mut conditions = Vec::new();

        let changed = set_status_condition(
            &mut conditions,
            condition(READY_CONDITION, false, "RolesNotReady", "meta not ready", Some(1)),
        );
        assert!(changed);
        assert_eq!(conditions.len(), 1);
        let first_transition = conditions[0].last_transition_time.clone();

        // Same status, new message: updated without a transition.
        let changed = set_status_condition(
            &mut conditions,
            condition(READY_CONDITION, false, "RolesNotReady", "datanode not ready", Some(1)),
        );
        assert!(changed);
        assert_eq!(conditions[0].last_transition_time, first_transition);

        let changed = set_status_condition(
            &mut conditions,
            condition(READY_CONDITION, true, "AllRolesReady", "", Some(2)),
        );
        assert!(changed);
        assert!(is_status_condition_true(&conditions, READY_CONDITION));
    }

    #[test]
    fn test_set_identical_condition_is_noop() {
        let mut conditions = vec![condition(READY_CONDITION, true, "AllRolesReady", "", Some(1))];
        let changed = set_status_condition(
            &mut conditions,
            condition(READY_CONDITION, true, "AllRolesReady", "", Some(1)),
        );
        assert!(!changed);
        assert!(find_status_condition(&conditions, PROGRESSING_CONDITION).is_none());
    }
}

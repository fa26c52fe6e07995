use crate::error::{OpsError, OpsResult};
use crate::execution::model::ExecutionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    UpdateProgress,
    Complete,
    Fail,
    Stop,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::UpdateProgress => "update progress",
            LifecycleAction::Complete => "complete",
            LifecycleAction::Fail => "fail",
            LifecycleAction::Stop => "stop",
        }
    }
}

/// Every legal (current, action) -> next move. Anything absent is rejected;
/// terminal states have no outgoing rows.
const TRANSITIONS: &[(ExecutionStatus, LifecycleAction, ExecutionStatus)] = &[
    (
        ExecutionStatus::Running,
        LifecycleAction::UpdateProgress,
        ExecutionStatus::Running,
    ),
    (
        ExecutionStatus::Running,
        LifecycleAction::Complete,
        ExecutionStatus::Success,
    ),
    (
        ExecutionStatus::Running,
        LifecycleAction::Fail,
        ExecutionStatus::Failed,
    ),
    (
        ExecutionStatus::Running,
        LifecycleAction::Stop,
        ExecutionStatus::Stopped,
    ),
];

pub fn next_status(current: ExecutionStatus, action: LifecycleAction) -> Option<ExecutionStatus> {
    TRANSITIONS
        .iter()
        .find(|(from, act, _)| *from == current && *act == action)
        .map(|(_, _, to)| *to)
}

pub fn check_transition(
    execution_id: &str,
    current: ExecutionStatus,
    action: LifecycleAction,
) -> OpsResult<ExecutionStatus> {
    next_status(current, action).ok_or_else(|| match action {
        LifecycleAction::UpdateProgress => OpsError::InvalidTransition(format!(
            "cannot update a non-running execution ({} is {})",
            execution_id, current
        )),
        _ => OpsError::InvalidTransition(format!(
            "cannot {} execution {} in status {}",
            action.as_str(),
            execution_id,
            current
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTIONS: [LifecycleAction; 4] = [
        LifecycleAction::UpdateProgress,
        LifecycleAction::Complete,
        LifecycleAction::Fail,
        LifecycleAction::Stop,
    ];

    #[test]
    fn running_accepts_every_action() {
        assert_eq!(
            next_status(ExecutionStatus::Running, LifecycleAction::Complete),
            Some(ExecutionStatus::Success)
        );
        assert_eq!(
            next_status(ExecutionStatus::Running, LifecycleAction::Fail),
            Some(ExecutionStatus::Failed)
        );
        assert_eq!(
            next_status(ExecutionStatus::Running, LifecycleAction::Stop),
            Some(ExecutionStatus::Stopped)
        );
        assert_eq!(
            next_status(ExecutionStatus::Running, LifecycleAction::UpdateProgress),
            Some(ExecutionStatus::Running)
        );
    }

    #[test]
    fn terminal_states_reject_everything() {
        for status in ExecutionStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for action in ACTIONS {
                assert_eq!(next_status(*status, action), None, "{status} {action:?}");
                assert_eq!(
                    check_transition("e1", *status, action)
                        .unwrap_err()
                        .code(),
                    "INVALID_TRANSITION"
                );
            }
        }
    }

    #[test]
    fn progress_on_finished_execution_names_the_rule() {
        let err = check_transition(
            "e1",
            ExecutionStatus::Success,
            LifecycleAction::UpdateProgress,
        )
        .unwrap_err();
        assert!(err
            .to_string()
            .contains("cannot update a non-running execution"));
    }
}

//! Status transitions offered to the user.
//!
//! The store accepts any status as a raw update; these rules are only
//! enforced here and by the cache operations built on them.

use crate::mission::MissionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    Start,
    Finish,
    Reopen,
}

impl StatusAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Finish => "Finish",
            Self::Reopen => "Reopen",
        }
    }

    pub fn target(&self) -> MissionStatus {
        match self {
            Self::Start => MissionStatus::InProgress,
            Self::Finish => MissionStatus::Completed,
            Self::Reopen => MissionStatus::Todo,
        }
    }
}

/// `todo -> in_progress -> completed`; nothing past completed.
pub fn advance_status(current: MissionStatus) -> Option<MissionStatus> {
    match current {
        MissionStatus::Todo => Some(MissionStatus::InProgress),
        MissionStatus::InProgress => Some(MissionStatus::Completed),
        MissionStatus::Completed => None,
    }
}

/// `completed -> todo`, skipping in_progress.
pub fn reopen_status(current: MissionStatus) -> Option<MissionStatus> {
    match current {
        MissionStatus::Completed => Some(MissionStatus::Todo),
        MissionStatus::Todo | MissionStatus::InProgress => None,
    }
}

/// The single action shown next to a mission in a given status.
pub fn available_action(current: MissionStatus) -> StatusAction {
    match current {
        MissionStatus::Todo => StatusAction::Start,
        MissionStatus::InProgress => StatusAction::Finish,
        MissionStatus::Completed => StatusAction::Reopen,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_walks_forward_and_stops_at_completed() {
        assert_eq!(advance_status(MissionStatus::Todo), Some(MissionStatus::InProgress));
        assert_eq!(
            advance_status(MissionStatus::InProgress),
            Some(MissionStatus::Completed)
        );
        assert_eq!(advance_status(MissionStatus::Completed), None);
    }

    #[test]
    fn reopen_only_from_completed() {
        assert_eq!(reopen_status(MissionStatus::Completed), Some(MissionStatus::Todo));
        assert_eq!(reopen_status(MissionStatus::Todo), None);
        assert_eq!(reopen_status(MissionStatus::InProgress), None);
    }

    #[test]
    fn offered_action_matches_transition() {
        for status in MissionStatus::ALL {
            let action = available_action(status);
            let expected = advance_status(status).or_else(|| reopen_status(status));
            assert_eq!(Some(action.target()), expected, "status {status}");
        }
        assert_eq!(available_action(MissionStatus::Todo).label(), "Start");
    }
}

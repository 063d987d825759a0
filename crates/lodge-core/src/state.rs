use serde::{Deserialize, Serialize};

/// Position of an embedded component (or of the host) in the lifecycle.
///
/// The declaration order is the lifecycle order, so `Ord` compares how far
/// along a component is. `Destroyed` sorts last but is terminal, not "above"
/// `Resumed`; use [`LifecycleState::level`] when comparing against the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Known id with restored state, but no start request yet.
    Restored,
    /// Start requested; the next transition materializes the component.
    Initializing,
    /// Created, not started or resumed.
    Created,
    /// Created and started, not resumed.
    Started,
    /// Created, started and resumed.
    Resumed,
    /// No longer with us.
    Destroyed,
}

impl LifecycleState {
    /// Activity level used by the host bound: how "awake" this state is.
    ///
    /// `Restored`, `Initializing` and `Destroyed` have no live component and
    /// report level 0.
    pub fn level(&self) -> u8 {
        match self {
            Self::Restored | Self::Initializing | Self::Destroyed => 0,
            Self::Created => 1,
            Self::Started => 2,
            Self::Resumed => 3,
        }
    }

    /// States a component can be driven to by `move_to_state`.
    pub fn is_drivable_target(&self) -> bool {
        matches!(self, Self::Created | Self::Started | Self::Resumed)
    }

    /// Whether the state machine has nothing to do for a record in this state.
    pub fn is_inert(&self) -> bool {
        matches!(self, Self::Restored | Self::Destroyed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Restored => "restored",
            Self::Initializing => "initializing",
            Self::Created => "created",
            Self::Started => "started",
            Self::Resumed => "resumed",
            Self::Destroyed => "destroyed",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_follow_lifecycle_order() {
        assert!(LifecycleState::Created.level() < LifecycleState::Started.level());
        assert!(LifecycleState::Started.level() < LifecycleState::Resumed.level());
        assert_eq!(LifecycleState::Destroyed.level(), 0);
        assert_eq!(LifecycleState::Initializing.level(), 0);
    }

    #[test]
    fn only_created_started_resumed_are_drivable() {
        let drivable: Vec<_> = [
            LifecycleState::Restored,
            LifecycleState::Initializing,
            LifecycleState::Created,
            LifecycleState::Started,
            LifecycleState::Resumed,
            LifecycleState::Destroyed,
        ]
        .into_iter()
        .filter(LifecycleState::is_drivable_target)
        .collect();
        assert_eq!(
            drivable,
            vec![
                LifecycleState::Created,
                LifecycleState::Started,
                LifecycleState::Resumed
            ]
        );
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&LifecycleState::Resumed).unwrap();
        assert_eq!(json, "\"resumed\"");
    }
}

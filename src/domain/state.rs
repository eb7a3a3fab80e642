use serde::{Deserialize, Serialize};
use std::fmt;

/// Order lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum OrderState {
    /// Registered, parameters not yet checked
    Validating = 1,
    /// Parameters accepted, waiting for the worker
    Pending = 2,
    /// Handed to the executor
    Active = 3,
    /// Executor accepted the command (or fills completed the quantity)
    Filled = 4,
    /// Canceled after activation
    Canceled = 5,
    /// Rejected, errored or forced out by an invalid transition
    Failed = 6,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Validating => "VALIDATING",
            OrderState::Pending => "PENDING",
            OrderState::Active => "ACTIVE",
            OrderState::Filled => "FILLED",
            OrderState::Canceled => "CANCELED",
            OrderState::Failed => "FAILED",
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(OrderState::Validating),
            2 => Some(OrderState::Pending),
            3 => Some(OrderState::Active),
            4 => Some(OrderState::Filled),
            5 => Some(OrderState::Canceled),
            6 => Some(OrderState::Failed),
            _ => None,
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: OrderState) -> bool {
        use OrderState::*;

        match (self, target) {
            // From Validating
            (Validating, Pending) => true,
            (Validating, Failed) => true,

            // From Pending
            (Pending, Active) => true,
            (Pending, Failed) => true,

            // From Active
            (Active, Filled) => true,
            (Active, Canceled) => true,
            (Active, Failed) => true,

            // Terminal states never move
            _ => false,
        }
    }

    /// Get valid next states from current state
    pub fn valid_transitions(&self) -> Vec<OrderState> {
        use OrderState::*;

        match self {
            Validating => vec![Pending, Failed],
            Pending => vec![Active, Failed],
            Active => vec![Filled, Canceled, Failed],
            Filled | Canceled | Failed => vec![],
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Filled | OrderState::Canceled | OrderState::Failed
        )
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderState {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "VALIDATING" => Ok(OrderState::Validating),
            "PENDING" => Ok(OrderState::Pending),
            "ACTIVE" => Ok(OrderState::Active),
            "FILLED" => Ok(OrderState::Filled),
            "CANCELED" | "CANCELLED" => Ok(OrderState::Canceled),
            "FAILED" => Ok(OrderState::Failed),
            _ => Err(format!("Unknown order state: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderState; 6] = [
        OrderState::Validating,
        OrderState::Pending,
        OrderState::Active,
        OrderState::Filled,
        OrderState::Canceled,
        OrderState::Failed,
    ];

    #[test]
    fn test_valid_transitions() {
        use OrderState::*;

        assert!(Validating.can_transition_to(Pending));
        assert!(Validating.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Active));
        assert!(Pending.can_transition_to(Failed));
        assert!(Active.can_transition_to(Filled));
        assert!(Active.can_transition_to(Canceled));
        assert!(Active.can_transition_to(Failed));

        assert!(!Validating.can_transition_to(Active));
        assert!(!Validating.can_transition_to(Filled));
        assert!(!Pending.can_transition_to(Filled));
        assert!(!Pending.can_transition_to(Canceled));
        assert!(!Active.can_transition_to(Pending));
    }

    #[test]
    fn test_table_matches_valid_transitions() {
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    from.valid_transitions().contains(&to),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for state in ALL.iter().filter(|s| s.is_terminal()) {
            assert!(state.valid_transitions().is_empty());
        }
        assert!(!OrderState::Validating.is_terminal());
        assert!(!OrderState::Pending.is_terminal());
        assert!(!OrderState::Active.is_terminal());
    }

    #[test]
    fn test_u8_round_trip() {
        for state in ALL {
            assert_eq!(OrderState::from_u8(state as u8), Some(state));
        }
        assert_eq!(OrderState::from_u8(0), None);
    }

    #[test]
    fn test_state_from_str() {
        assert_eq!(
            OrderState::try_from("pending").unwrap(),
            OrderState::Pending
        );
        assert_eq!(
            OrderState::try_from("CANCELLED").unwrap(),
            OrderState::Canceled
        );
        assert!(OrderState::try_from("UNKNOWN").is_err());
    }
}

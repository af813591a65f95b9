//! Onboarding state machine: tracks how far a user has got.

use crate::session::SessionState;
use crate::store::User;

/// The phases of onboarding.
///
/// Progresses linearly: Unknown → AwaitingName → AwaitingPhone → Ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnboardingPhase {
    #[default]
    Unknown,
    AwaitingName,
    AwaitingPhone,
    Ready,
}

impl OnboardingPhase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: OnboardingPhase) -> bool {
        use OnboardingPhase::*;
        matches!(
            (self, target),
            (Unknown, AwaitingName) | (AwaitingName, AwaitingPhone) | (AwaitingPhone, Ready)
        )
    }

    /// Derive the phase from the stored user record and the session marker.
    ///
    /// A pending session wins over the record; without one, the record
    /// decides.
    pub fn resolve(user: Option<&User>, session: SessionState) -> OnboardingPhase {
        match (session, user) {
            (SessionState::AwaitingName, _) => Self::AwaitingName,
            (SessionState::AwaitingPhone, _) => Self::AwaitingPhone,
            (SessionState::None, None) => Self::Unknown,
            (SessionState::None, Some(u)) if !u.is_complete() => Self::AwaitingPhone,
            (SessionState::None, Some(_)) => Self::Ready,
        }
    }

    /// Session marker that must be stored while in this phase.
    pub fn session_state(&self) -> SessionState {
        match self {
            Self::AwaitingName => SessionState::AwaitingName,
            Self::AwaitingPhone => SessionState::AwaitingPhone,
            Self::Unknown | Self::Ready => SessionState::None,
        }
    }
}

impl std::fmt::Display for OnboardingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::AwaitingName => "awaiting_name",
            Self::AwaitingPhone => "awaiting_phone",
            Self::Ready => "ready",
        };
        write!(f, "{s}")
    }
}

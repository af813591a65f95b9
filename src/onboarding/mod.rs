//! Onboarding: first-contact flow that records who the user is.
//!
//! A new user is asked for a full name, then a phone number. The phone can
//! be typed (validated against configured patterns) or shared as a contact.
//! Only fully onboarded users may register for events.

pub mod manager;
pub mod phone;
pub mod state;

pub use manager::{InputOutcome, OnboardingManager, StartOutcome};
pub use phone::{DEFAULT_PHONE_PATTERNS, PhoneValidator};
pub use state::OnboardingPhase;

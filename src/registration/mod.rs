//! Event registration: selection tokens and the idempotent register path.

pub mod service;
pub mod token;

pub use service::{RegisterOutcome, RegistrationService};
pub use token::{SELECTED_EVENT, encode_token, parse_token};

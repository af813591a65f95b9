//! Event Desk: event registration bot with onboarding and reminders.

pub mod bot;
pub mod catalog;
pub mod channels;
pub mod config;
pub mod error;
pub mod messages;
pub mod notifier;
pub mod onboarding;
pub mod registration;
pub mod session;
pub mod store;

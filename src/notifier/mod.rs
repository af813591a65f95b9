//! Reminder scheduler: periodic, idempotent reminders before events.
//!
//! Each tick checks the time gate, loads not-yet-notified registrations
//! allowed by the policy, and sends every affected user one schedule
//! message. The `notified` flag is the only record of what was sent.

pub mod engine;
pub mod policy;

pub use engine::{AnnounceReport, Notifier, TickReport, announce, spawn_notifier};
pub use policy::{HourRange, NotifyPolicy, TimeGate};

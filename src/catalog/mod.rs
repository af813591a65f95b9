//! Event catalog: schedule views, statistics, export and import.

pub mod import;
pub mod render;
pub mod service;

pub use import::{ImportReport, import_events, import_file, parse_events};
pub use render::{escape_html, group_by_day, render_schedule, render_statistics};
pub use service::{Attendee, CatalogService, EventReport};

//! User-facing texts and menu labels.
//!
//! Labels are matched exactly against inbound text, so changing one here
//! changes the trigger vocabulary too.

// Menu labels (users)
pub const LABEL_SHOW_EVENTS: &str = "Events";
pub const LABEL_REGISTER: &str = "Register";
pub const LABEL_MY_EVENTS: &str = "My events";

// Menu labels (admins)
pub const LABEL_STATISTICS: &str = "Statistics";
pub const LABEL_EXPORT: &str = "Export";

pub const LABEL_SHARE_CONTACT: &str = "Share contact";
pub const PHONE_PLACEHOLDER: &str = "Phone number";

pub const NEED_NAME: &str = "Hello! Please send your full name.";
pub const INVALID_NAME: &str = "The name cannot be empty. Please send your full name.";
pub const NEED_PHONE: &str =
    "Thanks! Now send your phone number, or share your contact with the button below.";
pub const INVALID_PHONE: &str =
    "That does not look like a phone number. Please try again, for example +79991234567.";
pub const MENU_ACCESS: &str = "You are all set. Use the menu below.";
pub const USE_START: &str = "Please send /start to finish signing up first.";
pub const ERROR: &str = "Something went wrong. Please try again later.";

pub const SELECT_EVENT: &str = "Pick an event to register for:";
pub const REGISTERED: &str = "You are registered! See \"My events\" for your schedule.";
pub const ALREADY_REGISTERED: &str = "You are already registered for this event.";

pub const NO_EVENTS: &str = "Nothing is scheduled yet.";
pub const NOT_REGISTERED: &str = "You are not registered for anything yet!";

pub const STATISTICS_HEADER: &str = "Statistics:\n";
pub const REMINDER_HEADER: &str = "Your registrations:\n";
pub const EXPORT_CAPTION: &str = "registrations.json";

pub const COMMAND_START_DESCRIPTION: &str = "Start the bot";
pub const COMMAND_ID_DESCRIPTION: &str = "Show your ID";

//! The pending-input marker held per user.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What the bot expects the user to send next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    None,
    AwaitingName,
    AwaitingPhone,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::AwaitingName => "awaiting_name",
            Self::AwaitingPhone => "awaiting_phone",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "awaiting_name" => Ok(Self::AwaitingName),
            "awaiting_phone" => Ok(Self::AwaitingPhone),
            other => Err(format!("unknown session state: {other}")),
        }
    }
}

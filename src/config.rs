//! Configuration types, loaded from the process environment.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, NaiveDate};
use secrecy::SecretString;

use crate::error::ConfigError;
use crate::notifier::{HourRange, NotifyPolicy, TimeGate};
use crate::onboarding::DEFAULT_PHONE_PATTERNS;

/// Where conversation sessions are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBackend {
    /// Process memory; lost on restart.
    Memory,
    /// The `sessions` table.
    Db,
}

/// Bot configuration.
#[derive(Debug)]
pub struct BotConfig {
    /// Bot API token.
    pub token: SecretString,
    /// Identities that get the admin menu and skip onboarding.
    pub admins: Vec<String>,
    pub db_path: PathBuf,
    pub sessions: SessionBackend,
    /// Venue offset used for rendering and the reminder gate.
    pub utc_offset: FixedOffset,
    pub phone_patterns: Vec<String>,
    pub notify_policy: NotifyPolicy,
    pub notify_interval: Duration,
    pub notify_gate: TimeGate,
    /// Campaign text placed above every reminder.
    pub notify_message: Option<String>,
    /// Text sent once to every user at startup.
    pub announcement: Option<String>,
}

/// Database file used when `EVENT_DESK_DB_PATH` is unset.
pub const DEFAULT_DB_PATH: &str = "./data/event-desk.db";

/// Database path from the environment alone, for commands that do not
/// need the bot token.
pub fn db_path_from_env() -> PathBuf {
    std::env::var("EVENT_DESK_DB_PATH")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
        .into()
}

impl BotConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variables. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.into()));

        let token = SecretString::from(require("BOT_TOKEN")?);

        let admins: Vec<String> = require("BOT_ADMINS")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if admins.is_empty() {
            return Err(invalid("BOT_ADMINS", "at least one admin identity is required"));
        }

        let db_path: PathBuf = get("EVENT_DESK_DB_PATH")
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
            .into();

        let sessions = match get("EVENT_DESK_SESSIONS").as_deref() {
            None | Some("db") => SessionBackend::Db,
            Some("memory") => SessionBackend::Memory,
            Some(other) => {
                return Err(invalid(
                    "EVENT_DESK_SESSIONS",
                    format!("expected memory or db, got {other:?}"),
                ));
            }
        };

        let offset_hours: i32 = parse_or(&get, "EVENT_DESK_UTC_OFFSET", 0)?;
        let utc_offset = FixedOffset::east_opt(offset_hours * 3600)
            .ok_or_else(|| invalid("EVENT_DESK_UTC_OFFSET", "offset out of range"))?;

        let phone_patterns = match get("PHONE_PATTERNS") {
            Some(raw) => raw
                .split(';')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => DEFAULT_PHONE_PATTERNS.iter().map(|s| s.to_string()).collect(),
        };

        let notify_policy = match get("NOTIFY_POLICY").as_deref() {
            None | Some("windowed") => {
                let hours: i64 = parse_or(
                    &get,
                    "NOTIFY_LOOKAHEAD_HOURS",
                    NotifyPolicy::DEFAULT_LOOKAHEAD_HOURS,
                )?;
                NotifyPolicy::windowed_hours(hours).ok_or_else(|| {
                    invalid(
                        "NOTIFY_LOOKAHEAD_HOURS",
                        format!("must be between 1 and {}", NotifyPolicy::MAX_LOOKAHEAD_HOURS),
                    )
                })?
            }
            Some("broadcast") => NotifyPolicy::Broadcast,
            Some(other) => {
                return Err(invalid(
                    "NOTIFY_POLICY",
                    format!("expected windowed or broadcast, got {other:?}"),
                ));
            }
        };

        let interval_secs: u64 = parse_or(&get, "NOTIFY_INTERVAL_SECS", 3600)?;
        if interval_secs == 0 {
            return Err(invalid("NOTIFY_INTERVAL_SECS", "must be positive"));
        }

        let hours = get("NOTIFY_HOURS")
            .map(|raw| raw.parse::<HourRange>())
            .transpose()
            .map_err(|e| invalid("NOTIFY_HOURS", e))?;

        let date = get("NOTIFY_DATE")
            .map(|raw| NaiveDate::parse_from_str(&raw, "%Y-%m-%d"))
            .transpose()
            .map_err(|e| invalid("NOTIFY_DATE", e.to_string()))?;

        Ok(Self {
            token,
            admins,
            db_path,
            sessions,
            utc_offset,
            phone_patterns,
            notify_policy,
            notify_interval: Duration::from_secs(interval_secs),
            notify_gate: TimeGate {
                date,
                hours,
                offset: utc_offset,
            },
            notify_message: get("NOTIFY_MESSAGE"),
            announcement: get("ANNOUNCEMENT"),
        })
    }

    /// Whether `identity` is on the admin list.
    pub fn is_admin(&self, identity: &str) -> bool {
        self.admins.iter().any(|a| a == identity)
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.into(),
        message: message.into(),
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| invalid(key, format!("{raw:?}: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<BotConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BotConfig::from_lookup(|k| map.get(k).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [("BOT_TOKEN", "123:ABC"), ("BOT_ADMINS", "1, 2")];

    #[test]
    fn defaults() {
        let config = load(&REQUIRED).unwrap();
        assert_eq!(config.token.expose_secret(), "123:ABC");
        assert_eq!(config.admins, vec!["1", "2"]);
        assert!(config.is_admin("2"));
        assert!(!config.is_admin("3"));
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.sessions, SessionBackend::Db);
        assert_eq!(config.utc_offset, FixedOffset::east_opt(0).unwrap());
        assert_eq!(config.phone_patterns.len(), DEFAULT_PHONE_PATTERNS.len());
        assert_eq!(config.notify_policy, NotifyPolicy::default());
        assert_eq!(config.notify_interval, Duration::from_secs(3600));
        assert_eq!(config.notify_gate, TimeGate::open(config.utc_offset));
        assert!(config.notify_message.is_none());
        assert!(config.announcement.is_none());
    }

    #[test]
    fn missing_required() {
        assert!(matches!(
            load(&[("BOT_ADMINS", "1")]),
            Err(ConfigError::MissingEnvVar(ref k)) if k == "BOT_TOKEN"
        ));
        assert!(matches!(
            load(&[("BOT_TOKEN", "t")]),
            Err(ConfigError::MissingEnvVar(ref k)) if k == "BOT_ADMINS"
        ));
        assert!(matches!(
            load(&[("BOT_TOKEN", "t"), ("BOT_ADMINS", " , ")]),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "BOT_ADMINS"
        ));
    }

    #[test]
    fn overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("EVENT_DESK_SESSIONS", "memory"),
            ("EVENT_DESK_UTC_OFFSET", "5"),
            ("PHONE_PATTERNS", r"^\d{3}$; ^\d{4}$"),
            ("NOTIFY_POLICY", "broadcast"),
            ("NOTIFY_INTERVAL_SECS", "60"),
            ("NOTIFY_HOURS", "17-23"),
            ("NOTIFY_DATE", "2024-05-21"),
            ("NOTIFY_MESSAGE", "See you there"),
            ("ANNOUNCEMENT", "We moved to hall B"),
        ]);
        let config = load(&vars).unwrap();
        assert_eq!(config.sessions, SessionBackend::Memory);
        assert_eq!(config.utc_offset, FixedOffset::east_opt(5 * 3600).unwrap());
        assert_eq!(config.phone_patterns, vec![r"^\d{3}$", r"^\d{4}$"]);
        assert_eq!(config.notify_policy, NotifyPolicy::Broadcast);
        assert_eq!(config.notify_interval, Duration::from_secs(60));
        assert_eq!(config.notify_gate.hours, Some(HourRange { start: 17, end: 23 }));
        assert_eq!(config.notify_gate.date, NaiveDate::from_ymd_opt(2024, 5, 21));
        assert_eq!(config.notify_gate.offset, config.utc_offset);
        assert_eq!(config.notify_message.as_deref(), Some("See you there"));
        assert_eq!(config.announcement.as_deref(), Some("We moved to hall B"));
    }

    #[test]
    fn lookahead_override() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("NOTIFY_LOOKAHEAD_HOURS", "12"));
        assert_eq!(load(&vars).unwrap().notify_policy, NotifyPolicy::windowed_hours(12).unwrap());
    }

    #[test]
    fn invalid_values() {
        for (key, value) in [
            ("EVENT_DESK_SESSIONS", "redis"),
            ("EVENT_DESK_UTC_OFFSET", "abc"),
            ("EVENT_DESK_UTC_OFFSET", "30"),
            ("NOTIFY_POLICY", "sometimes"),
            ("NOTIFY_LOOKAHEAD_HOURS", "0"),
            ("NOTIFY_LOOKAHEAD_HOURS", "8785"),
            ("NOTIFY_LOOKAHEAD_HOURS", "9000000000000"),
            ("NOTIFY_INTERVAL_SECS", "0"),
            ("NOTIFY_HOURS", "evening"),
            ("NOTIFY_HOURS", "5-5"),
            ("NOTIFY_DATE", "21.05.2024"),
        ] {
            let mut vars = REQUIRED.to_vec();
            vars.push((key, value));
            assert!(
                matches!(load(&vars), Err(ConfigError::InvalidValue { key: ref k, .. }) if k == key),
                "{key}={value} should be rejected"
            );
        }
    }
}

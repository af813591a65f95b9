//! Selection tokens round-tripped through interactive choices.

use crate::error::BotError;

/// Marker prefixed to every event-selection token.
pub const SELECTED_EVENT: &str = "SELECTED_EVENT";

/// `SELECTED_EVENT:<id>`
pub fn encode_token(event_id: i64) -> String {
    format!("{SELECTED_EVENT}:{event_id}")
}

/// Extract the event id from a selection token.
pub fn parse_token(data: &str) -> Result<i64, BotError> {
    let invalid = || BotError::InvalidSelection {
        payload: data.to_string(),
    };
    let (marker, id) = data.split_once(':').ok_or_else(invalid)?;
    if marker != SELECTED_EVENT {
        return Err(invalid());
    }
    id.trim().parse().map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_parse() {
        assert_eq!(encode_token(17), "SELECTED_EVENT:17");
        assert_eq!(parse_token(&encode_token(17)).unwrap(), 17);
        assert_eq!(parse_token("SELECTED_EVENT: 4 ").unwrap(), 4);
    }

    #[test]
    fn rejects_malformed_tokens() {
        for data in [
            "",
            "17",
            "SELECTED_EVENT",
            "SELECTED_EVENT:",
            "SELECTED_EVENT:abc",
            "OTHER:17",
            "selected_event:17",
            "SELECTED_EVENT:1:2",
        ] {
            assert!(
                matches!(parse_token(data), Err(BotError::InvalidSelection { ref payload }) if payload == data),
                "{data:?} should be rejected"
            );
        }
    }
}

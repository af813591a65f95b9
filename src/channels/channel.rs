//! Dispatch gateway trait and the inbound/outbound message model.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;

/// How the body of an outgoing text should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextFormat {
    #[default]
    Plain,
    Html,
}

/// Reply keyboard attached to an outgoing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Menu {
    /// Events / Register / My events.
    User,
    /// Statistics / Export.
    Admin,
    /// One button that shares the user's contact.
    ShareContact,
}

/// An outgoing text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingText {
    pub body: String,
    pub format: TextFormat,
    pub menu: Option<Menu>,
}

impl OutgoingText {
    pub fn plain(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            format: TextFormat::Plain,
            menu: None,
        }
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            format: TextFormat::Html,
            menu: None,
        }
    }

    pub fn with_menu(mut self, menu: Menu) -> Self {
        self.menu = Some(menu);
        self
    }
}

/// One button of an interactive choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceOption {
    pub label: String,
    /// Opaque token echoed back when the option is picked.
    pub token: String,
}

/// What an inbound update carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// `/name args`
    Command { name: String, args: String },
    Text(String),
    /// A shared contact card.
    Contact { phone: Option<String> },
    /// A pick from an interactive choice.
    Callback { id: String, data: String },
}

/// A normalized inbound update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Stable sender identity; `None` when the platform did not supply one.
    pub identity: Option<String>,
    /// Where replies go, if known.
    pub chat_id: Option<String>,
    pub payload: Payload,
}

impl Inbound {
    /// Reply address: the chat, falling back to the sender.
    pub fn reply_to(&self) -> Option<&str> {
        self.chat_id.as_deref().or(self.identity.as_deref())
    }
}

/// Stream of inbound updates from a channel.
pub type InboundStream = Pin<Box<dyn Stream<Item = Inbound> + Send>>;

/// Outbound side of a messaging platform.
///
/// Every call returns once the platform accepted or rejected the message.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Send a text message to a chat.
    async fn send_text(&self, to: &str, text: &OutgoingText) -> Result<(), ChannelError>;

    /// Send a prompt with one button per option.
    async fn send_choice(
        &self,
        to: &str,
        prompt: &str,
        options: &[ChoiceOption],
    ) -> Result<(), ChannelError>;

    /// Acknowledge a picked option, optionally with a short notice.
    async fn answer_choice(&self, callback_id: &str, text: Option<&str>)
    -> Result<(), ChannelError>;

    /// Send a file.
    async fn send_document(
        &self,
        to: &str,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outgoing_builders() {
        let text = OutgoingText::html("<b>x</b>").with_menu(Menu::User);
        assert_eq!(text.format, TextFormat::Html);
        assert_eq!(text.menu, Some(Menu::User));
        assert_eq!(OutgoingText::plain("x").menu, None);
    }

    #[test]
    fn reply_falls_back_to_identity() {
        let mut inbound = Inbound {
            identity: Some("7".into()),
            chat_id: Some("99".into()),
            payload: Payload::Text("hi".into()),
        };
        assert_eq!(inbound.reply_to(), Some("99"));
        inbound.chat_id = None;
        assert_eq!(inbound.reply_to(), Some("7"));
        inbound.identity = None;
        assert_eq!(inbound.reply_to(), None);
    }
}

//! Telegram channel: long-polls the Bot API for updates.
//!
//! Native Rust Telegram Bot API client implementing `Dispatcher`, plus the
//! update parser that normalizes raw updates into `Inbound` values.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::channels::{
    ChoiceOption, Dispatcher, Inbound, InboundStream, Menu, OutgoingText, Payload, TextFormat,
};
use crate::error::ChannelError;
use crate::messages;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Pause after a failed poll when the API gives no `retry_after`.
const POLL_RETRY_SECS: u64 = 5;

/// Telegram channel: connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    fn send_err(reason: impl ToString) -> ChannelError {
        ChannelError::SendFailed {
            name: "telegram".into(),
            reason: reason.to_string(),
        }
    }

    /// POST a JSON body and fail on a non-success status.
    async fn call(&self, method: &str, body: &Value) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(Self::send_err)?;

        if resp.status().is_success() {
            return Ok(());
        }
        let status = resp.status();
        let err = resp.text().await.unwrap_or_default();
        Err(Self::send_err(format!("{method} returned {status}: {err}")))
    }

    /// Verify the token with `getMe`.
    pub async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    /// Publish the bot's command list.
    pub async fn register_commands(&self) -> Result<(), ChannelError> {
        self.call(
            "setMyCommands",
            &json!({
                "commands": [
                    { "command": "id", "description": messages::COMMAND_ID_DESCRIPTION },
                    { "command": "start", "description": messages::COMMAND_START_DESCRIPTION },
                ]
            }),
        )
        .await
    }

    /// Start long-polling and return a stream of parsed updates.
    pub fn start(&self) -> InboundStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for updates...");

            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(POLL_RETRY_SECS)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(POLL_RETRY_SECS)).await;
                        continue;
                    }
                };

                let results = match read_poll_response(&data) {
                    PollResponse::Updates(results) => results,
                    PollResponse::Rejected {
                        code,
                        description,
                        retry_after,
                    } => {
                        tracing::error!(?code, %description, "Telegram getUpdates rejected");
                        let secs = retry_after.unwrap_or(POLL_RETRY_SECS);
                        tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
                        continue;
                    }
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(inbound) = parse_update(update) else {
                        continue;
                    };

                    if tx.send(inbound).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Box::pin(stream)
    }

    /// Send a single message chunk (≤4096 chars).
    ///
    /// HTML chunks that the API rejects are retried as plain text.
    async fn send_chunk(
        &self,
        chat_id: &str,
        text: &str,
        format: TextFormat,
        markup: Option<&Value>,
    ) -> Result<(), ChannelError> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(markup) = markup {
            body["reply_markup"] = markup.clone();
        }

        if format == TextFormat::Html {
            let mut html_body = body.clone();
            html_body["parse_mode"] = json!("HTML");
            match self.call("sendMessage", &html_body).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(error = %e, "Telegram sendMessage with HTML failed; retrying without parse_mode");
                }
            }
        }

        self.call("sendMessage", &body).await
    }

    /// Send a document from bytes (in-memory).
    pub async fn send_document_bytes(
        &self,
        chat_id: &str,
        file_bytes: Vec<u8>,
        file_name: &str,
    ) -> anyhow::Result<()> {
        let part = Part::bytes(file_bytes).file_name(file_name.to_string());

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);

        let resp = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let err = resp.text().await?;
            anyhow::bail!("Telegram sendDocument failed: {err}");
        }

        tracing::info!("Telegram document sent to {chat_id}: {file_name}");
        Ok(())
    }
}

// ── Dispatcher implementation ───────────────────────────────────────

#[async_trait]
impl Dispatcher for TelegramChannel {
    async fn send_text(&self, to: &str, text: &OutgoingText) -> Result<(), ChannelError> {
        let chunks = split_message(&text.body, TELEGRAM_MAX_MESSAGE_LENGTH);
        let markup = text.menu.map(menu_markup);
        let last = chunks.len().saturating_sub(1);

        deliver_chunks(chunks.len(), |i| {
            // Keyboard rides on the final chunk only
            let markup = if i == last { markup.as_ref() } else { None };
            self.send_chunk(to, &chunks[i], text.format, markup)
        })
        .await
    }

    async fn send_choice(
        &self,
        to: &str,
        prompt: &str,
        options: &[ChoiceOption],
    ) -> Result<(), ChannelError> {
        let rows: Vec<Value> = options
            .iter()
            .map(|o| json!([{ "text": o.label, "callback_data": o.token }]))
            .collect();

        self.call(
            "sendMessage",
            &json!({
                "chat_id": to,
                "text": prompt,
                "reply_markup": { "inline_keyboard": rows }
            }),
        )
        .await
    }

    async fn answer_choice(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), ChannelError> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        self.call("answerCallbackQuery", &body).await
    }

    async fn send_document(
        &self,
        to: &str,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<(), ChannelError> {
        self.send_document_bytes(to, bytes, filename)
            .await
            .map_err(Self::send_err)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// A `getUpdates` response body, classified.
#[derive(Debug, PartialEq)]
enum PollResponse<'a> {
    Updates(&'a [Value]),
    /// `ok: false` or no `result` array.
    Rejected {
        code: Option<i64>,
        description: String,
        retry_after: Option<u64>,
    },
}

fn read_poll_response(data: &Value) -> PollResponse<'_> {
    let ok = data.get("ok").and_then(Value::as_bool).unwrap_or(false);
    if let (true, Some(results)) = (ok, data.get("result").and_then(Value::as_array)) {
        return PollResponse::Updates(results);
    }
    PollResponse::Rejected {
        code: data.get("error_code").and_then(Value::as_i64),
        description: data
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("no result in response")
            .to_string(),
        retry_after: data
            .pointer("/parameters/retry_after")
            .and_then(Value::as_u64),
    }
}

/// Send `count` chunks in order through `send`.
///
/// A failure on the first chunk is returned. Once a chunk has been
/// delivered, a later failure stops the message and is logged, and the
/// message counts as delivered so callers never resend the delivered part.
async fn deliver_chunks<F, Fut>(count: usize, mut send: F) -> Result<(), ChannelError>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<(), ChannelError>>,
{
    for i in 0..count {
        if let Err(e) = send(i).await {
            if i == 0 {
                return Err(e);
            }
            tracing::warn!(chunk = i, of = count, error = %e, "Message delivered partially");
            return Ok(());
        }
    }
    Ok(())
}

fn api_url(token: &SecretString, method: &str) -> String {
    format!(
        "https://api.telegram.org/bot{}/{method}",
        token.expose_secret()
    )
}

/// Reply keyboard JSON for a menu.
fn menu_markup(menu: Menu) -> Value {
    match menu {
        Menu::User => json!({
            "keyboard": [
                [{ "text": messages::LABEL_SHOW_EVENTS }, { "text": messages::LABEL_REGISTER }],
                [{ "text": messages::LABEL_MY_EVENTS }]
            ],
            "resize_keyboard": true
        }),
        Menu::Admin => json!({
            "keyboard": [
                [{ "text": messages::LABEL_STATISTICS }, { "text": messages::LABEL_EXPORT }]
            ],
            "resize_keyboard": true
        }),
        Menu::ShareContact => json!({
            "keyboard": [
                [{ "text": messages::LABEL_SHARE_CONTACT, "request_contact": true }]
            ],
            "input_field_placeholder": messages::PHONE_PLACEHOLDER,
            "resize_keyboard": true,
            "one_time_keyboard": true
        }),
    }
}

fn id_string(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_i64).map(|id| id.to_string())
}

/// Normalize a raw Bot API update.
///
/// Returns `None` for update kinds the bot does not handle. A missing
/// sender is kept as `identity: None` so the caller can reject it.
pub fn parse_update(update: &Value) -> Option<Inbound> {
    if let Some(query) = update.get("callback_query") {
        let id = query.get("id").and_then(Value::as_str)?.to_string();
        let data = query
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Some(Inbound {
            identity: id_string(query.get("from").and_then(|f| f.get("id"))),
            chat_id: id_string(
                query
                    .get("message")
                    .and_then(|m| m.get("chat"))
                    .and_then(|c| c.get("id")),
            ),
            payload: Payload::Callback { id, data },
        });
    }

    let message = update.get("message")?;
    let identity = id_string(message.get("from").and_then(|f| f.get("id")));
    let chat_id = id_string(message.get("chat").and_then(|c| c.get("id")));

    let payload = if let Some(contact) = message.get("contact") {
        Payload::Contact {
            phone: contact
                .get("phone_number")
                .and_then(Value::as_str)
                .map(String::from),
        }
    } else {
        let text = message.get("text").and_then(Value::as_str)?;
        parse_text(text)
    };

    Some(Inbound {
        identity,
        chat_id,
        payload,
    })
}

/// Split `/cmd@botname args` into a command, anything else is text.
fn parse_text(text: &str) -> Payload {
    let Some(rest) = text.strip_prefix('/') else {
        return Payload::Text(text.to_string());
    };
    let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let name = head.split('@').next().unwrap_or(head);
    if name.is_empty() {
        return Payload::Text(text.to_string());
    }
    Payload::Command {
        name: name.to_string(),
        args: args.trim().to_string(),
    }
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut boundary = max_len;
        while !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }

        // Find a good split point
        let chunk = &remaining[..boundary];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(boundary);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { boundary } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

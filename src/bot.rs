//! Conversational router: turns inbound updates into onboarding, catalog
//! and registration calls and replies through the dispatcher.
//!
//! Every update is handled to completion before the next one. Failures are
//! caught here: the user gets a short reply and the listener keeps going.

use std::sync::Arc;

use chrono::FixedOffset;
use futures::StreamExt;

use crate::catalog::CatalogService;
use crate::channels::{Dispatcher, Inbound, InboundStream, Menu, OutgoingText, Payload};
use crate::error::BotError;
use crate::messages;
use crate::onboarding::{InputOutcome, OnboardingManager, PhoneValidator, StartOutcome};
use crate::registration::{RegisterOutcome, RegistrationService, parse_token};
use crate::session::SessionStore;
use crate::store::Database;

/// Everything the bot needs to run.
pub struct BotDeps {
    pub db: Arc<dyn Database>,
    pub sessions: Arc<dyn SessionStore>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub admins: Vec<String>,
    pub validator: PhoneValidator,
    pub offset: FixedOffset,
}

pub struct Bot {
    dispatcher: Arc<dyn Dispatcher>,
    admins: Vec<String>,
    onboarding: OnboardingManager,
    catalog: CatalogService,
    registration: RegistrationService,
}

impl Bot {
    pub fn new(deps: BotDeps) -> Self {
        Self {
            onboarding: OnboardingManager::new(
                Arc::clone(&deps.db),
                deps.sessions,
                deps.validator,
            ),
            catalog: CatalogService::new(Arc::clone(&deps.db), deps.offset),
            registration: RegistrationService::new(deps.db),
            dispatcher: deps.dispatcher,
            admins: deps.admins,
        }
    }

    /// Handle updates until the stream ends.
    pub async fn run(&self, mut updates: InboundStream) {
        while let Some(inbound) = updates.next().await {
            self.handle(inbound).await;
        }
        tracing::info!("Update stream ended");
    }

    /// Handle one update. Never fails; errors become replies and log lines.
    pub async fn handle(&self, inbound: Inbound) {
        let Err(e) = self.route(&inbound).await else {
            return;
        };

        let identity = inbound.identity.as_deref().unwrap_or("unknown");
        let operation = operation_name(&inbound.payload);
        let reply = match &e {
            BotError::CorruptSession { .. } => {
                tracing::error!(identity, operation, error = %e, "Dropping update");
                return;
            }
            BotError::NotOnboarded { .. } => {
                tracing::info!(identity, operation, "Rejected before onboarding");
                messages::USE_START
            }
            BotError::IdentityMissing
            | BotError::InvalidSelection { .. }
            | BotError::ValidationFailed { .. } => {
                tracing::warn!(identity, operation, error = %e, "Rejected update");
                messages::ERROR
            }
            BotError::Store(_) | BotError::Dispatch(_) => {
                tracing::error!(identity, operation, error = %e, "Update failed");
                messages::ERROR
            }
        };

        if let Err(send_err) = self.reply_failure(&inbound, reply).await {
            tracing::warn!(identity, operation, error = %send_err, "Failed to deliver error reply");
        }
    }

    /// Admin guard.
    pub fn is_admin(&self, identity: &str) -> bool {
        self.admins.iter().any(|a| a == identity)
    }

    async fn route(&self, inbound: &Inbound) -> Result<(), BotError> {
        let identity = inbound
            .identity
            .as_deref()
            .ok_or(BotError::IdentityMissing)?;
        let chat = inbound.reply_to().unwrap_or(identity);

        match &inbound.payload {
            Payload::Command { name, .. } => match name.as_str() {
                "id" => self.send(chat, OutgoingText::plain(identity)).await,
                "start" => self.on_start(identity, chat).await,
                other => {
                    tracing::debug!(identity, command = other, "Ignoring unknown command");
                    Ok(())
                }
            },
            Payload::Text(text) if self.is_admin(identity) => {
                self.on_admin_text(chat, text).await
            }
            Payload::Text(text) => self.on_text(identity, chat, text).await,
            Payload::Contact { .. } if self.is_admin(identity) => Ok(()),
            Payload::Contact { phone } => {
                let outcome = self
                    .onboarding
                    .handle_contact(identity, phone.as_deref())
                    .await?;
                self.reply_input(chat, outcome).await
            }
            Payload::Callback { id, .. } if self.is_admin(identity) => {
                self.dispatcher.answer_choice(id, None).await?;
                Ok(())
            }
            Payload::Callback { id, data } => self.on_choice(identity, id, data).await,
        }
    }

    async fn on_start(&self, identity: &str, chat: &str) -> Result<(), BotError> {
        if self.is_admin(identity) {
            return self
                .send(chat, OutgoingText::plain(messages::MENU_ACCESS).with_menu(Menu::Admin))
                .await;
        }

        let reply = match self.onboarding.start(identity).await? {
            StartOutcome::AskName => OutgoingText::plain(messages::NEED_NAME),
            StartOutcome::AskPhone => {
                OutgoingText::plain(messages::NEED_PHONE).with_menu(Menu::ShareContact)
            }
            StartOutcome::Ready(_) => {
                OutgoingText::plain(messages::MENU_ACCESS).with_menu(Menu::User)
            }
        };
        self.send(chat, reply).await
    }

    async fn on_text(&self, identity: &str, chat: &str, text: &str) -> Result<(), BotError> {
        match self.onboarding.handle_text(identity, text).await? {
            InputOutcome::Ignored => self.on_menu(identity, chat, text).await,
            outcome => self.reply_input(chat, outcome).await,
        }
    }

    async fn reply_input(&self, chat: &str, outcome: InputOutcome) -> Result<(), BotError> {
        let reply = match outcome {
            InputOutcome::AskPhone => {
                OutgoingText::plain(messages::NEED_PHONE).with_menu(Menu::ShareContact)
            }
            InputOutcome::InvalidPhone => {
                OutgoingText::plain(messages::INVALID_PHONE).with_menu(Menu::ShareContact)
            }
            InputOutcome::Completed(_) => {
                OutgoingText::plain(messages::MENU_ACCESS).with_menu(Menu::User)
            }
            InputOutcome::InvalidName => OutgoingText::plain(messages::INVALID_NAME),
            InputOutcome::RestartRequired => OutgoingText::plain(messages::USE_START),
            InputOutcome::Ignored => return Ok(()),
        };
        self.send(chat, reply).await
    }

    async fn on_menu(&self, identity: &str, chat: &str, text: &str) -> Result<(), BotError> {
        let label = text.trim();
        if ![
            messages::LABEL_SHOW_EVENTS,
            messages::LABEL_REGISTER,
            messages::LABEL_MY_EVENTS,
        ]
        .contains(&label)
        {
            tracing::debug!(identity, "Ignoring free text outside onboarding");
            return Ok(());
        }

        let user = self.onboarding.ready_user(identity).await?;

        match label {
            messages::LABEL_SHOW_EVENTS => {
                let body = self.catalog.list_upcoming().await?;
                self.send(chat, OutgoingText::html(body).with_menu(Menu::User))
                    .await
            }
            messages::LABEL_REGISTER => {
                let options = self.registration.options().await?;
                if options.is_empty() {
                    return self
                        .send(chat, OutgoingText::plain(messages::NO_EVENTS).with_menu(Menu::User))
                        .await;
                }
                self.dispatcher
                    .send_choice(chat, messages::SELECT_EVENT, &options)
                    .await?;
                Ok(())
            }
            _ => {
                let body = self.catalog.list_for_user(user.id).await?;
                self.send(chat, OutgoingText::html(body).with_menu(Menu::User))
                    .await
            }
        }
    }

    async fn on_choice(&self, identity: &str, callback_id: &str, data: &str) -> Result<(), BotError> {
        let event_id = parse_token(data)?;
        let user = self.onboarding.ready_user(identity).await?;
        let notice = match self.registration.register(&user, event_id).await? {
            RegisterOutcome::Registered(_) => messages::REGISTERED,
            RegisterOutcome::AlreadyRegistered => messages::ALREADY_REGISTERED,
        };
        self.dispatcher
            .answer_choice(callback_id, Some(notice))
            .await?;
        Ok(())
    }

    async fn on_admin_text(&self, chat: &str, text: &str) -> Result<(), BotError> {
        match text.trim() {
            messages::LABEL_STATISTICS => {
                let body = self.catalog.statistics().await?;
                self.send(chat, OutgoingText::plain(body).with_menu(Menu::Admin))
                    .await
            }
            messages::LABEL_EXPORT => {
                let report = self.catalog.export_report().await?;
                self.dispatcher
                    .send_document(chat, report, messages::EXPORT_CAPTION)
                    .await?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn send(&self, chat: &str, text: OutgoingText) -> Result<(), BotError> {
        self.dispatcher.send_text(chat, &text).await?;
        Ok(())
    }

    async fn reply_failure(&self, inbound: &Inbound, text: &str) -> Result<(), BotError> {
        match &inbound.payload {
            Payload::Callback { id, .. } => self.dispatcher.answer_choice(id, Some(text)).await?,
            _ => {
                let Some(chat) = inbound.reply_to() else {
                    return Ok(());
                };
                self.dispatcher
                    .send_text(chat, &OutgoingText::plain(text))
                    .await?
            }
        }
        Ok(())
    }
}

fn operation_name(payload: &Payload) -> &'static str {
    match payload {
        Payload::Command { .. } => "command",
        Payload::Text(_) => "text",
        Payload::Contact { .. } => "contact",
        Payload::Callback { .. } => "choice",
    }
}

//! OnboardingManager: collects a user's full name and phone number over a
//! short conversation.

use std::sync::Arc;

use crate::error::BotError;
use crate::session::{SessionState, SessionStore};
use crate::store::{Database, User};

use super::phone::PhoneValidator;
use super::state::OnboardingPhase;

/// What the bot should say after a `start` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Unknown user; now awaiting a name.
    AskName,
    /// Name on file but no phone; now awaiting a phone.
    AskPhone,
    /// Fully onboarded; nothing changed.
    Ready(User),
}

/// What the bot should say after free text or a shared contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputOutcome {
    /// Name accepted; now awaiting a phone.
    AskPhone,
    /// Phone accepted; onboarding is complete.
    Completed(User),
    /// Name was blank; still awaiting a name.
    InvalidName,
    /// Phone failed validation; still awaiting a phone.
    InvalidPhone,
    /// Awaiting a phone but there is no user record. The user must `start` again.
    RestartRequired,
    /// No input was pending.
    Ignored,
}

/// Coordinates the onboarding flow: session markers, user records and
/// phone validation.
pub struct OnboardingManager {
    db: Arc<dyn Database>,
    sessions: Arc<dyn SessionStore>,
    validator: PhoneValidator,
}

impl OnboardingManager {
    pub fn new(
        db: Arc<dyn Database>,
        sessions: Arc<dyn SessionStore>,
        validator: PhoneValidator,
    ) -> Self {
        Self {
            db,
            sessions,
            validator,
        }
    }

    /// Current phase for an identity, with its user record if one exists.
    pub async fn status(
        &self,
        identity: &str,
    ) -> Result<(OnboardingPhase, Option<User>), BotError> {
        let user = self.db.find_user_by_identity(identity).await?;
        let session = self.sessions.get(identity).await?;
        Ok((OnboardingPhase::resolve(user.as_ref(), session), user))
    }

    /// The fully onboarded user behind `identity`, or `NotOnboarded`.
    pub async fn ready_user(&self, identity: &str) -> Result<User, BotError> {
        match self.status(identity).await? {
            (OnboardingPhase::Ready, Some(user)) => Ok(user),
            _ => Err(BotError::NotOnboarded {
                identity: identity.to_string(),
            }),
        }
    }

    /// Handle the `start` command.
    pub async fn start(&self, identity: &str) -> Result<StartOutcome, BotError> {
        match self.db.find_user_by_identity(identity).await? {
            None => {
                self.advance(identity, OnboardingPhase::Unknown, OnboardingPhase::AwaitingName)
                    .await?;
                Ok(StartOutcome::AskName)
            }
            Some(user) if user.phone.is_none() => {
                self.sessions
                    .set(identity, SessionState::AwaitingPhone)
                    .await?;
                tracing::debug!(identity, "Onboarding resumed at phone step");
                Ok(StartOutcome::AskPhone)
            }
            Some(user) => Ok(StartOutcome::Ready(user)),
        }
    }

    /// Handle a free-text message. Only acts while input is pending.
    pub async fn handle_text(&self, identity: &str, text: &str) -> Result<InputOutcome, BotError> {
        match self.sessions.get(identity).await? {
            SessionState::None => Ok(InputOutcome::Ignored),
            SessionState::AwaitingName => self.accept_name(identity, text).await,
            SessionState::AwaitingPhone => {
                let Some(user) = self.db.find_user_by_identity(identity).await? else {
                    return Ok(InputOutcome::RestartRequired);
                };
                match self.validator.check(text) {
                    Ok(phone) => self.accept_phone(identity, user, &phone).await,
                    Err(e) => {
                        tracing::debug!(identity, error = %e, "Rejected phone input");
                        Ok(InputOutcome::InvalidPhone)
                    }
                }
            }
        }
    }

    /// Handle a shared contact.
    ///
    /// Only acts while awaiting a phone. The platform vouches for the number,
    /// so pattern validation is skipped.
    pub async fn handle_contact(
        &self,
        identity: &str,
        phone: Option<&str>,
    ) -> Result<InputOutcome, BotError> {
        if self.sessions.get(identity).await? != SessionState::AwaitingPhone {
            return Ok(InputOutcome::Ignored);
        }
        let Some(user) = self.db.find_user_by_identity(identity).await? else {
            return Ok(InputOutcome::RestartRequired);
        };
        match phone.map(str::trim).filter(|p| !p.is_empty()) {
            Some(phone) => self.accept_phone(identity, user, phone).await,
            None => Ok(InputOutcome::InvalidPhone),
        }
    }

    async fn accept_name(&self, identity: &str, text: &str) -> Result<InputOutcome, BotError> {
        let name = text.trim();
        if name.is_empty() {
            return Ok(InputOutcome::InvalidName);
        }
        let user = self.db.create_user(identity, name).await?;
        self.advance(
            identity,
            OnboardingPhase::AwaitingName,
            OnboardingPhase::AwaitingPhone,
        )
        .await?;
        tracing::info!(identity, user_id = user.id, "Recorded user name");
        Ok(InputOutcome::AskPhone)
    }

    async fn accept_phone(
        &self,
        identity: &str,
        mut user: User,
        phone: &str,
    ) -> Result<InputOutcome, BotError> {
        self.db.update_user_phone(user.id, phone).await?;
        self.advance(identity, OnboardingPhase::AwaitingPhone, OnboardingPhase::Ready)
            .await?;
        user.phone = Some(phone.to_string());
        tracing::info!(identity, user_id = user.id, "Onboarding complete");
        Ok(InputOutcome::Completed(user))
    }

    async fn advance(
        &self,
        identity: &str,
        from: OnboardingPhase,
        to: OnboardingPhase,
    ) -> Result<(), BotError> {
        debug_assert!(from.can_transition_to(to), "{from} -> {to}");
        self.sessions.set(identity, to.session_state()).await
    }
}

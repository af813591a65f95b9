//! RegistrationService: records a user's intent to attend an event.

use std::sync::Arc;

use crate::channels::ChoiceOption;
use crate::error::{BotError, DatabaseError};
use crate::store::{Database, Registration, User};

use super::token::encode_token;

/// Result of a registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered(Registration),
    /// The pair was already registered; nothing was written.
    AlreadyRegistered,
}

pub struct RegistrationService {
    db: Arc<dyn Database>,
}

impl RegistrationService {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// One choice per event, in catalog order.
    pub async fn options(&self) -> Result<Vec<ChoiceOption>, DatabaseError> {
        Ok(self
            .db
            .list_events()
            .await?
            .into_iter()
            .map(|e| ChoiceOption {
                label: e.name,
                token: encode_token(e.id),
            })
            .collect())
    }

    /// Register an onboarded `user` for `event_id`.
    ///
    /// The event must exist. A second call for the same pair is a no-op
    /// reported as `AlreadyRegistered`.
    pub async fn register(
        &self,
        user: &User,
        event_id: i64,
    ) -> Result<RegisterOutcome, BotError> {
        if self.db.get_event(event_id).await?.is_none() {
            return Err(BotError::InvalidSelection {
                payload: encode_token(event_id),
            });
        }

        if self.db.find_registration(user.id, event_id).await?.is_some() {
            return Ok(RegisterOutcome::AlreadyRegistered);
        }

        // A concurrent duplicate loses on the unique constraint
        match self.db.create_registration(user.id, event_id).await? {
            Some(registration) => {
                tracing::info!(
                    identity = %user.identity,
                    user_id = user.id,
                    event_id,
                    "Registered for event"
                );
                Ok(RegisterOutcome::Registered(registration))
            }
            None => Ok(RegisterOutcome::AlreadyRegistered),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Event, LibSqlBackend};
    use chrono::{TimeZone, Utc};

    async fn setup() -> (RegistrationService, Arc<dyn Database>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        db.upsert_event(&Event {
            id: 1,
            name: "Opening".into(),
            starts_at: Utc.with_ymd_and_hms(2024, 5, 21, 18, 0, 0).unwrap(),
            description: String::new(),
        })
        .await
        .unwrap();
        (RegistrationService::new(Arc::clone(&db)), db)
    }

    async fn ready_user(db: &Arc<dyn Database>, identity: &str) -> User {
        let user = db.create_user(identity, "Ann").await.unwrap();
        db.update_user_phone(user.id, "+79991234567").await.unwrap();
        db.find_user_by_identity(identity).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn register_twice_writes_once() {
        let (service, db) = setup().await;
        let user = ready_user(&db, "1").await;

        let first = service.register(&user, 1).await.unwrap();
        assert!(matches!(first, RegisterOutcome::Registered(ref r) if !r.notified));
        assert_eq!(service.register(&user, 1).await.unwrap(), RegisterOutcome::AlreadyRegistered);

        assert_eq!(db.list_registrations_for_user(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_event_is_invalid_selection() {
        let (service, db) = setup().await;
        let user = ready_user(&db, "1").await;
        assert!(matches!(
            service.register(&user, 99).await,
            Err(BotError::InvalidSelection { .. })
        ));
    }

    #[tokio::test]
    async fn options_carry_tokens() {
        let (service, _) = setup().await;
        let options = service.options().await.unwrap();
        assert_eq!(
            options,
            vec![ChoiceOption {
                label: "Opening".into(),
                token: "SELECTED_EVENT:1".into()
            }]
        );
    }
}

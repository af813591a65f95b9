//! Reminder engine: scans pending registrations and sends one message per
//! user, marking registrations notified only after a successful send.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};

use crate::catalog::render_schedule;
use crate::channels::{Dispatcher, OutgoingText};
use crate::error::DatabaseError;
use crate::messages;
use crate::store::{Database, Event, PendingReminder};

use super::policy::{NotifyPolicy, TimeGate};

/// Counts from one scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The time gate was closed; nothing was queried.
    pub gated: bool,
    /// Users with at least one eligible registration.
    pub users: usize,
    pub sent: usize,
    pub failed: usize,
    /// Registrations flipped to notified.
    pub marked: usize,
}

/// Counts from a one-off announcement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnounceReport {
    pub sent: usize,
    pub failed: usize,
}

pub struct Notifier {
    db: Arc<dyn Database>,
    dispatcher: Arc<dyn Dispatcher>,
    policy: NotifyPolicy,
    gate: TimeGate,
    offset: FixedOffset,
    campaign: Option<String>,
}

impl Notifier {
    pub fn new(
        db: Arc<dyn Database>,
        dispatcher: Arc<dyn Dispatcher>,
        policy: NotifyPolicy,
        gate: TimeGate,
        offset: FixedOffset,
    ) -> Self {
        Self {
            db,
            dispatcher,
            policy,
            gate,
            offset,
            campaign: None,
        }
    }

    /// Text placed above the schedule in every reminder.
    pub fn with_campaign(mut self, text: Option<String>) -> Self {
        self.campaign = text.filter(|t| !t.trim().is_empty());
        self
    }

    /// Run one tick against the current time.
    pub async fn run_tick(&self) -> Result<TickReport, DatabaseError> {
        self.run_tick_at(Utc::now()).await
    }

    /// Run one tick as if the time were `now`.
    ///
    /// Safe to repeat: a registration is only picked up while its
    /// `notified` flag is false, and the flag is set after a successful send.
    pub async fn run_tick_at(&self, now: DateTime<Utc>) -> Result<TickReport, DatabaseError> {
        if !self.gate.allows(now) {
            tracing::debug!(%now, "Reminder gate closed; skipping tick");
            return Ok(TickReport {
                gated: true,
                ..Default::default()
            });
        }

        let pending = self
            .db
            .list_pending_reminders(self.policy.window(now))
            .await?;

        let mut report = TickReport::default();
        for (identity, reminders) in group_by_user(pending) {
            report.users += 1;
            let events: Vec<Event> = reminders.iter().map(|r| r.event.clone()).collect();
            let text = OutgoingText::html(self.compose(&events));

            if let Err(e) = self.dispatcher.send_text(&identity, &text).await {
                tracing::warn!(identity = %identity, error = %e, "Failed to send reminder");
                report.failed += 1;
                continue;
            }
            report.sent += 1;

            for reminder in &reminders {
                match self
                    .db
                    .mark_registration_notified(reminder.registration_id)
                    .await
                {
                    Ok(true) => report.marked += 1,
                    Ok(false) => {}
                    Err(e) => tracing::error!(
                        identity = %identity,
                        registration_id = reminder.registration_id,
                        error = %e,
                        "Failed to mark registration notified"
                    ),
                }
            }
        }

        tracing::info!(
            users = report.users,
            sent = report.sent,
            failed = report.failed,
            marked = report.marked,
            "Reminder tick finished"
        );
        Ok(report)
    }

    fn compose(&self, events: &[Event]) -> String {
        let schedule = render_schedule(events, self.offset);
        match &self.campaign {
            Some(campaign) => format!("{campaign}\n\n{}{schedule}", messages::REMINDER_HEADER),
            None => format!("{}{schedule}", messages::REMINDER_HEADER),
        }
    }
}

/// Split reminders into per-user batches.
///
/// `pending` arrives ordered by user, so each batch is a contiguous run.
fn group_by_user(pending: Vec<PendingReminder>) -> Vec<(String, Vec<PendingReminder>)> {
    let mut groups: Vec<(i64, String, Vec<PendingReminder>)> = Vec::new();
    for reminder in pending {
        match groups.last_mut() {
            Some((id, _, batch)) if *id == reminder.user_id => batch.push(reminder),
            _ => groups.push((reminder.user_id, reminder.identity.clone(), vec![reminder])),
        }
    }
    groups
        .into_iter()
        .map(|(_, identity, batch)| (identity, batch))
        .collect()
}

/// Send `text` once to every known user. Failures are logged per user.
pub async fn announce(
    db: &dyn Database,
    dispatcher: &dyn Dispatcher,
    text: &str,
) -> Result<AnnounceReport, DatabaseError> {
    let mut report = AnnounceReport::default();
    let message = OutgoingText::plain(text);
    for user in db.list_users().await? {
        match dispatcher.send_text(&user.identity, &message).await {
            Ok(()) => report.sent += 1,
            Err(e) => {
                tracing::warn!(identity = %user.identity, error = %e, "Failed to send announcement");
                report.failed += 1;
            }
        }
    }
    tracing::info!(sent = report.sent, failed = report.failed, "Announcement sent");
    Ok(report)
}

/// Spawn the reminder ticker background task.
pub fn spawn_notifier(notifier: Arc<Notifier>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = notifier.run_tick().await {
                tracing::error!(error = %e, "Reminder tick failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChoiceOption;
    use crate::error::ChannelError;
    use crate::notifier::policy::HourRange;
    use crate::store::LibSqlBackend;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use tokio::sync::Mutex;

    /// Records sends; fails for identities in `failing`.
    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, String)>>,
        failing: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl Dispatcher for Recorder {
        async fn send_text(&self, to: &str, text: &OutgoingText) -> Result<(), ChannelError> {
            if self.failing.lock().await.contains(to) {
                return Err(ChannelError::SendFailed {
                    name: "test".into(),
                    reason: "blocked".into(),
                });
            }
            self.sent.lock().await.push((to.to_string(), text.body.clone()));
            Ok(())
        }

        async fn send_choice(&self, _: &str, _: &str, _: &[ChoiceOption]) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn answer_choice(&self, _: &str, _: Option<&str>) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn send_document(&self, _: &str, _: Vec<u8>, _: &str) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, h, 0, 0).unwrap()
    }

    async fn seed(db: &Arc<dyn Database>) {
        for (id, name, d, h) in [(1, "Opening", 21, 18), (2, "Concert", 21, 20), (3, "Far", 25, 9)] {
            db.upsert_event(&Event {
                id,
                name: name.into(),
                starts_at: at(d, h),
                description: String::new(),
            })
            .await
            .unwrap();
        }
        for identity in ["100", "200"] {
            let user = db.create_user(identity, "X").await.unwrap();
            db.update_user_phone(user.id, "+79991234567").await.unwrap();
            for event_id in [1, 2, 3] {
                db.create_registration(user.id, event_id).await.unwrap();
            }
        }
    }

    async fn setup(policy: NotifyPolicy, gate: TimeGate) -> (Notifier, Arc<dyn Database>, Arc<Recorder>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        seed(&db).await;
        let recorder = Arc::new(Recorder::default());
        let notifier = Notifier::new(
            Arc::clone(&db),
            Arc::clone(&recorder) as Arc<dyn Dispatcher>,
            policy,
            gate,
            utc(),
        );
        (notifier, db, recorder)
    }

    #[tokio::test]
    async fn windowed_tick_sends_once_per_user() {
        let (notifier, _, recorder) = setup(NotifyPolicy::default(), TimeGate::open(utc())).await;

        let report = notifier.run_tick_at(at(21, 9)).await.unwrap();
        assert_eq!(report.users, 2);
        assert_eq!(report.sent, 2);
        assert_eq!(report.marked, 4);

        let sent = recorder.sent.lock().await;
        assert_eq!(sent.len(), 2);
        let (_, body) = &sent[0];
        assert!(body.starts_with(messages::REMINDER_HEADER));
        assert!(body.contains("Opening") && body.contains("Concert"));
        assert!(!body.contains("Far"));
    }

    #[tokio::test]
    async fn repeated_ticks_do_not_resend() {
        let (notifier, _, recorder) = setup(NotifyPolicy::default(), TimeGate::open(utc())).await;

        notifier.run_tick_at(at(21, 9)).await.unwrap();
        let second = notifier.run_tick_at(at(21, 10)).await.unwrap();
        assert_eq!(second, TickReport::default());
        assert_eq!(recorder.sent.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn failed_user_is_isolated_and_retried() {
        let (notifier, _, recorder) = setup(NotifyPolicy::Broadcast, TimeGate::open(utc())).await;
        recorder.failing.lock().await.insert("100".into());

        let report = notifier.run_tick_at(at(21, 9)).await.unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.marked, 3);

        recorder.failing.lock().await.clear();
        let retry = notifier.run_tick_at(at(21, 9)).await.unwrap();
        assert_eq!(retry.sent, 1);
        assert_eq!(retry.marked, 3);

        let recipients: Vec<String> = recorder.sent.lock().await.iter().map(|(to, _)| to.clone()).collect();
        assert_eq!(recipients, vec!["200".to_string(), "100".to_string()]);
    }

    #[tokio::test]
    async fn closed_gate_sends_nothing() {
        let gate = TimeGate {
            date: None,
            hours: Some(HourRange { start: 17, end: 23 }),
            offset: utc(),
        };
        let (notifier, db, recorder) = setup(NotifyPolicy::Broadcast, gate).await;

        let report = notifier.run_tick_at(at(21, 9)).await.unwrap();
        assert!(report.gated);
        assert!(recorder.sent.lock().await.is_empty());
        assert_eq!(db.list_pending_reminders(None).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn users_without_pending_are_skipped() {
        let (notifier, db, recorder) = setup(NotifyPolicy::default(), TimeGate::open(utc())).await;
        db.create_user("300", "Nobody").await.unwrap();

        let report = notifier.run_tick_at(at(21, 9)).await.unwrap();
        assert_eq!(report.users, 2);
        assert!(recorder.sent.lock().await.iter().all(|(to, _)| to != "300"));
    }

    #[tokio::test]
    async fn campaign_text_prefixes_schedule() {
        let (notifier, _, recorder) = setup(NotifyPolicy::default(), TimeGate::open(utc())).await;
        let notifier = notifier.with_campaign(Some("See you at the venue!".into()));

        notifier.run_tick_at(at(21, 9)).await.unwrap();
        let sent = recorder.sent.lock().await;
        assert!(sent[0].1.starts_with("See you at the venue!\n\nYour registrations:\n"));
    }

    #[tokio::test]
    async fn pending_rows_group_into_contiguous_batches() {
        let (_, db, _) = setup(NotifyPolicy::Broadcast, TimeGate::open(utc())).await;
        let groups = group_by_user(db.list_pending_reminders(None).await.unwrap());

        let shape: Vec<(&str, usize)> = groups.iter().map(|(id, b)| (id.as_str(), b.len())).collect();
        assert_eq!(shape, vec![("100", 3), ("200", 3)]);
    }

    #[tokio::test]
    async fn announce_reaches_every_user() {
        let (_, db, recorder) = setup(NotifyPolicy::default(), TimeGate::open(utc())).await;
        recorder.failing.lock().await.insert("100".into());

        let report = announce(db.as_ref(), recorder.as_ref(), "Doors open at 9").await.unwrap();
        assert_eq!(report, AnnounceReport { sent: 1, failed: 1 });
        assert_eq!(recorder.sent.lock().await[0], ("200".to_string(), "Doors open at 9".to_string()));
    }
}

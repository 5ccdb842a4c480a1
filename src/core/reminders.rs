use crate::core::activity::Activity;
use crate::core::messages::Templates;
use crate::core::schedule::ScheduleService;
use crate::domain::model::Slot;
use crate::domain::phone;
use crate::domain::ports::Messenger;
use crate::utils::error::Result;
use chrono::{Local, NaiveDate};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Dedup key for one reminder of one booking.
pub fn reminder_key(slot: &Slot, days_left: i64) -> String {
    format!("{}|{}_D{}", slot.key(), phone::digits(&slot.phone), days_left)
}

/// Sends the day-offset reminders for booked rows.
pub struct ReminderEngine {
    schedule: Arc<ScheduleService>,
    activity: Arc<Activity>,
    messenger: Arc<dyn Messenger>,
    templates: Templates,
    offsets: Vec<i64>,
    interval: Duration,
}

impl ReminderEngine {
    pub fn new(
        schedule: Arc<ScheduleService>,
        activity: Arc<Activity>,
        messenger: Arc<dyn Messenger>,
        templates: Templates,
        offsets: Vec<i64>,
        interval: Duration,
    ) -> Self {
        Self {
            schedule,
            activity,
            messenger,
            templates,
            offsets,
            interval,
        }
    }

    /// One scan as of `today`. Returns how many reminders went out.
    pub async fn run_once(&self, today: NaiveDate) -> Result<usize> {
        let pruned = self.activity.prune_reminders(today).await;
        if pruned > 0 {
            tracing::debug!("Forgot {} reminders of past appointments", pruned);
        }
        let mut sent = 0;

        for slot in self.schedule.remindable().await? {
            let Some(date) = slot.appointment_date() else {
                tracing::debug!("Skipping {}: unreadable date '{}'", slot.key(), slot.date);
                continue;
            };
            let days_left = (date - today).num_days();
            if !self.offsets.contains(&days_left) {
                continue;
            }

            let key = reminder_key(&slot, days_left);
            if self.activity.reminder_already_sent(&key).await {
                continue;
            }

            let message = self.templates.reminder(&slot, days_left);
            match self.messenger.send_text(&slot.phone, &message).await {
                Ok(()) => {
                    self.activity.mark_reminder_sent(&slot.key(), &key, date).await;
                    sent += 1;
                    tracing::info!(
                        "Reminder D-{} sent to {} ({})",
                        days_left,
                        slot.patient,
                        slot.phone
                    );
                }
                Err(e) => tracing::warn!("Reminder {} not delivered: {}", key, e),
            }
        }

        Ok(sent)
    }

    /// Scans now and then every interval until the task is aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                "Reminder loop started (every {}s, offsets {:?})",
                self.interval.as_secs(),
                self.offsets
            );
            loop {
                match self.run_once(Local::now().date_naive()).await {
                    Ok(0) => tracing::debug!("No reminders due"),
                    Ok(n) => tracing::info!("{} reminders sent", n),
                    Err(e) => tracing::error!("Reminder scan failed: {}", e),
                }
                tokio::time::sleep(self.interval).await;
            }
        })
    }
}

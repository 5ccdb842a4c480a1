use crate::domain::model::{Appointment, AppointmentStatus, Metrics, Notification, Slot};
use crate::domain::phone;
use chrono::{Local, NaiveDate};
use std::collections::HashMap;
use tokio::sync::RwLock;

pub const RECENT_NOTIFICATIONS: usize = 10;
pub const RECENT_APPOINTMENTS: usize = 20;

#[derive(Debug, Default)]
struct ActivityLog {
    appointments: Vec<Appointment>,
    notifications: Vec<Notification>,
    metrics: Metrics,
    /// Delivered reminder keys and the appointment date they belong to.
    reminders_sent: HashMap<String, NaiveDate>,
}

/// Process-local record of bookings, operator notifications, counters and
/// reminders already delivered. Lost on restart.
#[derive(Debug, Default)]
pub struct Activity {
    inner: RwLock<ActivityLog>,
}

fn last<T: Clone>(items: &[T], n: usize) -> Vec<T> {
    items[items.len().saturating_sub(n)..].to_vec()
}

impl Activity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next id and counts the booking.
    pub async fn record_booking(&self, mut appointment: Appointment) -> Appointment {
        let mut log = self.inner.write().await;
        appointment.id = log.appointments.len() as u64 + 1;
        log.appointments.push(appointment.clone());
        log.metrics.booked += 1;
        appointment
    }

    pub async fn set_audio(&self, id: u64, url: &str) {
        let mut log = self.inner.write().await;
        if let Some(appointment) = log.appointments.iter_mut().find(|a| a.id == id) {
            appointment.audio_url = Some(url.to_string());
        }
    }

    /// Changes an appointment's status and counts the transition.
    pub async fn set_status(&self, id: u64, status: AppointmentStatus) -> Option<Appointment> {
        let mut log = self.inner.write().await;
        let idx = log.appointments.iter().position(|a| a.id == id)?;
        let previous = log.appointments[idx].status;
        log.appointments[idx].status = status;
        if previous != status {
            Self::count(&mut log.metrics, status);
        }
        Some(log.appointments[idx].clone())
    }

    /// Status change that arrived through the sheet row. Counts it and keeps
    /// the in-memory appointment holding that row in step.
    pub async fn record_sheet_reply(&self, slot: &Slot, status: AppointmentStatus) {
        let slot_key = slot.key();
        let mut log = self.inner.write().await;
        Self::count(&mut log.metrics, status);
        if let Some(appointment) = log.appointments.iter_mut().rev().find(|a| {
            a.slot_key == slot_key
                && a.status != AppointmentStatus::Cancelled
                && phone::matches(&a.phone, &slot.phone)
        }) {
            appointment.status = status;
        }
    }

    fn count(metrics: &mut Metrics, status: AppointmentStatus) {
        match status {
            AppointmentStatus::Confirmed => metrics.confirmed += 1,
            AppointmentStatus::Cancelled => metrics.cancelled += 1,
            AppointmentStatus::Pending => {}
        }
    }

    pub async fn find(&self, id: u64) -> Option<Appointment> {
        let log = self.inner.read().await;
        log.appointments.iter().find(|a| a.id == id).cloned()
    }

    /// Most recent pending or confirmed appointment for this phone.
    pub async fn find_active_by_phone(&self, phone_number: &str) -> Option<Appointment> {
        let log = self.inner.read().await;
        log.appointments
            .iter()
            .rev()
            .find(|a| {
                a.status != AppointmentStatus::Cancelled && phone::matches(&a.phone, phone_number)
            })
            .cloned()
    }

    pub async fn all_appointments(&self) -> Vec<Appointment> {
        self.inner.read().await.appointments.clone()
    }

    pub async fn recent_appointments(&self) -> Vec<Appointment> {
        last(&self.inner.read().await.appointments, RECENT_APPOINTMENTS)
    }

    /// Raises a `CANCELAMENTO` notification for the freed slot.
    pub async fn notify_cancellation(&self, message: String, slot: &Slot) -> Notification {
        let mut log = self.inner.write().await;
        let notification = Notification {
            id: log.notifications.len() as u64 + 1,
            kind: "CANCELAMENTO".to_string(),
            message,
            time: Local::now().format("%H:%M:%S").to_string(),
            date: slot.date.clone(),
            slot_time: slot.time.clone(),
            exam: slot.exam.clone(),
            clinic: slot.clinic.clone(),
        };
        log.notifications.push(notification.clone());
        tracing::info!("Operator notified: {}", notification.message);
        notification
    }

    pub async fn recent_notifications(&self) -> Vec<Notification> {
        last(&self.inner.read().await.notifications, RECENT_NOTIFICATIONS)
    }

    pub async fn metrics(&self) -> Metrics {
        self.inner.read().await.metrics.with_rate()
    }

    pub async fn reminder_already_sent(&self, reminder_key: &str) -> bool {
        self.inner
            .read()
            .await
            .reminders_sent
            .contains_key(reminder_key)
    }

    /// Remembers a delivered reminder for an appointment on `date`. Returns
    /// false when it was already known.
    pub async fn mark_reminder_sent(&self, slot_key: &str, reminder_key: &str, date: NaiveDate) -> bool {
        let mut log = self.inner.write().await;
        if log.reminders_sent.contains_key(reminder_key) {
            return false;
        }
        log.reminders_sent.insert(reminder_key.to_string(), date);
        log.metrics.reminders_sent += 1;
        if let Some(appointment) = log
            .appointments
            .iter_mut()
            .rev()
            .find(|a| a.slot_key == slot_key)
        {
            appointment.reminders_sent.push(reminder_key.to_string());
        }
        true
    }

    /// Forgets reminders of appointments dated before `today`.
    pub async fn prune_reminders(&self, today: NaiveDate) -> usize {
        let mut log = self.inner.write().await;
        let before = log.reminders_sent.len();
        log.reminders_sent.retain(|_, date| *date >= today);
        before - log.reminders_sent.len()
    }
}

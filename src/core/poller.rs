use crate::core::booking::BookingService;
use crate::domain::model::Reply;
use crate::utils::error::Result;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Pulls recent inbound messages from the provider for deployments where
/// the webhook cannot reach this server.
pub struct ReplyPoller {
    booking: Arc<BookingService>,
    limit: usize,
    interval: Duration,
    seen: Mutex<HashSet<String>>,
}

impl ReplyPoller {
    pub fn new(booking: Arc<BookingService>, limit: usize, interval: Duration) -> Self {
        Self {
            booking,
            limit,
            interval,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Marks what the provider already holds as seen so old replies are not
    /// applied again after a restart.
    pub async fn prime(&self) -> Result<usize> {
        let messages = self.booking.messenger().recent_messages(self.limit).await?;
        let mut seen = self.seen.lock().await;
        *seen = messages.into_iter().map(|m| m.id).collect();
        Ok(seen.len())
    }

    pub async fn seen_len(&self) -> usize {
        self.seen.lock().await.len()
    }

    /// Returns how many replies updated the schedule. Only ids of the latest
    /// batch are remembered, since older ones drop out of the provider window.
    pub async fn poll_once(&self) -> Result<usize> {
        let messages = self.booking.messenger().recent_messages(self.limit).await?;
        let batch: HashSet<String> = messages.iter().map(|m| m.id.clone()).collect();
        let mut processed = 0;

        for message in messages {
            if !self.seen.lock().await.insert(message.id.clone()) {
                continue;
            }
            let reply = Reply::parse_strict(&message.text);
            if reply == Reply::Unknown {
                tracing::debug!("Ignoring message from {}: '{}'", message.number, message.text);
                continue;
            }
            match self.booking.process_patient_reply(&message.number, reply).await {
                Ok(true) => processed += 1,
                Ok(false) => {}
                Err(e) => tracing::error!("Reply from {} not processed: {}", message.number, e),
            }
        }

        self.seen.lock().await.retain(|id| batch.contains(id));
        Ok(processed)
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            match self.prime().await {
                Ok(n) => tracing::info!("Reply poller started ({} messages already seen)", n),
                Err(e) => tracing::warn!("Reply poller could not prime: {}", e),
            }
            loop {
                tokio::time::sleep(self.interval).await;
                match self.poll_once().await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!("{} replies processed by polling", n),
                    Err(e) => tracing::warn!("Polling failed: {}", e),
                }
            }
        })
    }
}

use crate::domain::model::{
    BookedSlot, ConfirmationStatus, MergeOutcome, Reply, Schedule, ScheduleSummary, SheetCounts,
    Slot,
};
use crate::domain::phone;
use crate::domain::ports::ScheduleStore;
use crate::utils::error::{AgendaError, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// How a reply finds its schedule row.
#[derive(Debug, Clone, Copy)]
pub enum SlotRef<'a> {
    /// The booked row whose phone matches.
    Phone(&'a str),
    /// A known booking: the row must carry both the slot key and the phone.
    Booking { key: &'a str, phone: &'a str },
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct UploadOutcome {
    #[serde(flatten)]
    pub merge: MergeOutcome,
    #[serde(flatten)]
    pub summary: ScheduleSummary,
}

/// Schedule operations over a store. Every load-change-save cycle holds the
/// same mutex so concurrent bookings never hand out one slot twice.
pub struct ScheduleService {
    store: Arc<dyn ScheduleStore>,
    lock: Mutex<()>,
}

impl ScheduleService {
    pub fn new(store: Arc<dyn ScheduleStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    pub fn describe(&self) -> String {
        self.store.describe()
    }

    pub async fn status(&self) -> Result<ScheduleSummary> {
        Ok(self
            .store
            .load()
            .await?
            .map(|s| s.summary())
            .unwrap_or_else(ScheduleSummary::not_loaded))
    }

    /// Merges an uploaded sheet into the current one.
    pub async fn upload(&self, grid: Vec<Vec<String>>) -> Result<UploadOutcome> {
        let incoming = Schedule::from_upload(grid)?;
        if incoming.is_empty() {
            return Err(AgendaError::validation("Planilha sem horários"));
        }

        let _guard = self.lock.lock().await;
        let mut schedule = self.store.load().await?.unwrap_or_default();
        let merge = schedule.merge(incoming);
        self.store.save(&schedule).await?;

        tracing::info!(
            "Schedule upload: {} added, {} duplicates, {} total",
            merge.added,
            merge.duplicates,
            schedule.len()
        );
        Ok(UploadOutcome {
            merge,
            summary: schedule.summary(),
        })
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.store.clear().await?;
        tracing::info!("Schedule cleared ({})", self.store.describe());
        Ok(())
    }

    pub async fn export(&self) -> Result<Vec<u8>> {
        self.store
            .export()
            .await?
            .ok_or_else(|| AgendaError::not_found("Nenhuma planilha disponível para download"))
    }

    /// Takes the first open slot for `exam` and books it.
    pub async fn reserve_first_open(&self, exam: &str, patient: &str, phone: &str) -> Result<Slot> {
        let _guard = self.lock.lock().await;
        let mut schedule = self
            .store
            .load()
            .await?
            .ok_or(AgendaError::ScheduleNotLoaded)?;

        let idx = schedule
            .find_open(exam)
            .ok_or_else(|| AgendaError::NoOpenSlot {
                exam: exam.to_string(),
            })?;
        let slot = schedule
            .reserve(idx, patient, phone)
            .cloned()
            .ok_or(AgendaError::ScheduleNotLoaded)?;
        self.store.save(&schedule).await?;

        tracing::info!(
            "Reserved {} for {} ({} {} at {})",
            slot.key(),
            patient,
            slot.date,
            slot.time,
            slot.clinic
        );
        Ok(slot)
    }

    /// Applies a confirm or cancel to the referenced booked row and returns
    /// the row as it was before the change. `None` when no row matches.
    pub async fn apply_reply(&self, slot_ref: SlotRef<'_>, reply: Reply) -> Result<Option<Slot>> {
        let _guard = self.lock.lock().await;
        let Some(mut schedule) = self.store.load().await? else {
            return Ok(None);
        };

        let idx = match slot_ref {
            SlotRef::Phone(phone) => schedule.find_by_phone(phone),
            SlotRef::Booking { key, phone: number } => schedule.slots.iter().position(|s| {
                s.is_booked() && s.key() == key && phone::matches(&s.phone, number)
            }),
        };
        let Some(idx) = idx else {
            return Ok(None);
        };
        let before = schedule.slots[idx].clone();

        match reply {
            Reply::Confirm => {
                schedule.set_status(idx, ConfirmationStatus::Confirmed);
            }
            Reply::Cancel => {
                schedule.release(idx);
            }
            Reply::Unknown => return Ok(Some(before)),
        }
        self.store.save(&schedule).await?;

        tracing::info!("Applied {:?} to {}", reply, before.key());
        Ok(Some(before))
    }

    /// Booked rows and their totals from a single read of the store.
    pub async fn booked_overview(&self) -> Result<(Vec<BookedSlot>, SheetCounts)> {
        Ok(self
            .store
            .load()
            .await?
            .map(|s| (s.booked(), s.counts()))
            .unwrap_or_default())
    }

    pub async fn counts(&self) -> Result<SheetCounts> {
        Ok(self
            .store
            .load()
            .await?
            .map(|s| s.counts())
            .unwrap_or_default())
    }

    /// Booked rows that may still get reminders.
    pub async fn remindable(&self) -> Result<Vec<Slot>> {
        Ok(self
            .store
            .load()
            .await?
            .map(|s| {
                s.slots
                    .into_iter()
                    .filter(|slot| {
                        slot.is_booked() && slot.status != ConfirmationStatus::Cancelled
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::csv_store::CsvScheduleStore;
    use tempfile::TempDir;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn sheet() -> Vec<Vec<String>> {
        grid(&[
            &["clinica", "exame", "data", "horario", "disponivel"],
            &["UBS Norte", "Cardiologista", "20/11/2025", "08:00", "SIM"],
            &["UBS Norte", "Cardiologista", "20/11/2025", "09:00", "SIM"],
        ])
    }

    fn service(dir: &TempDir) -> ScheduleService {
        ScheduleService::new(Arc::new(CsvScheduleStore::new(dir.path().join("agenda.csv"))))
    }

    #[tokio::test]
    async fn test_reserve_requires_loaded_schedule() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let err = service
            .reserve_first_open("Cardiologista", "Ana", "53911111111")
            .await
            .unwrap_err();
        assert!(matches!(err, AgendaError::ScheduleNotLoaded));
        assert!(!service.status().await.unwrap().loaded);
    }

    #[tokio::test]
    async fn test_upload_twice_reports_duplicates() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let first = service.upload(sheet()).await.unwrap();
        assert_eq!(first.merge.added, 2);
        let second = service.upload(sheet()).await.unwrap();
        assert_eq!(second.merge.added, 0);
        assert_eq!(second.merge.duplicates, 2);
        assert_eq!(second.summary.total_slots, 2);
    }

    #[tokio::test]
    async fn test_concurrent_bookings_get_distinct_slots() {
        let dir = TempDir::new().unwrap();
        let service = Arc::new(service(&dir));
        service.upload(sheet()).await.unwrap();

        let a = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .reserve_first_open("Cardiologista", "Ana", "53911111111")
                    .await
            })
        };
        let b = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .reserve_first_open("Cardiologista", "Bia", "53922222222")
                    .await
            })
        };
        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert_ne!(a.time, b.time);

        let err = service
            .reserve_first_open("Cardiologista", "Caio", "53933333333")
            .await
            .unwrap_err();
        assert!(matches!(err, AgendaError::NoOpenSlot { .. }));
    }

    #[tokio::test]
    async fn test_apply_reply_confirm_then_cancel() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        service.upload(sheet()).await.unwrap();
        let slot = service
            .reserve_first_open("Cardiologista", "Ana", "(53) 91111-1111")
            .await
            .unwrap();

        let before = service
            .apply_reply(SlotRef::Phone("5553911111111"), Reply::Confirm)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(before.patient, "Ana");
        assert_eq!(service.counts().await.unwrap().confirmed, 1);
        assert_eq!(service.remindable().await.unwrap().len(), 1);

        let other_phone = service
            .apply_reply(
                SlotRef::Booking {
                    key: &slot.key(),
                    phone: "53922222222",
                },
                Reply::Cancel,
            )
            .await
            .unwrap();
        assert!(other_phone.is_none());
        assert_eq!(service.booked_overview().await.unwrap().0.len(), 1);

        service
            .apply_reply(
                SlotRef::Booking {
                    key: &slot.key(),
                    phone: "53911111111",
                },
                Reply::Cancel,
            )
            .await
            .unwrap()
            .unwrap();
        assert!(service.booked_overview().await.unwrap().0.is_empty());
        assert_eq!(service.status().await.unwrap().open_slots, 2);

        let missing = service
            .apply_reply(SlotRef::Phone("5553911111111"), Reply::Confirm)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_hand_typed_status_does_not_block_booking() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("agenda.csv"),
            "clinica,exame,data,horario,disponivel,paciente,telefone,status_confirmacao\n\
UBS Norte,Cardiologista,20/11/2025,08:00,NAO,Ana,53911111111,Confirmado?\n\
UBS Norte,Cardiologista,20/11/2025,09:00,SIM,,,\n",
        )
        .unwrap();
        let service = service(&dir);

        let slot = service
            .reserve_first_open("Cardiologista", "Bia", "53922222222")
            .await
            .unwrap();
        assert_eq!(slot.time, "09:00");
        assert_eq!(service.remindable().await.unwrap().len(), 2);

        let csv = std::fs::read_to_string(dir.path().join("agenda.csv")).unwrap();
        assert!(csv.contains("Ana,53911111111,Confirmado?"));

        let err = service
            .upload(grid(&[
                &["clinica", "exame", "data", "horario", "disponivel", "status_confirmacao"],
                &["UBS Sul", "Cardiologista", "21/11/2025", "08:00", "SIM", "ok"],
            ]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Linha 2"));
    }

    #[tokio::test]
    async fn test_booked_overview() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        assert_eq!(service.booked_overview().await.unwrap().0.len(), 0);

        service.upload(sheet()).await.unwrap();
        service
            .reserve_first_open("Cardiologista", "Ana", "53911111111")
            .await
            .unwrap();
        let (rows, totals) = service.booked_overview().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(totals.booked, 1);
    }

    #[tokio::test]
    async fn test_export_and_clear() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        assert!(matches!(
            service.export().await.unwrap_err(),
            AgendaError::NotFound { .. }
        ));

        service.upload(sheet()).await.unwrap();
        let csv = String::from_utf8(service.export().await.unwrap()).unwrap();
        assert!(csv.starts_with("clinica,exame,data,horario,disponivel,paciente,telefone,status_confirmacao"));

        service.clear().await.unwrap();
        assert!(!service.status().await.unwrap().loaded);
    }
}

use crate::core::activity::Activity;
use crate::core::messages::Templates;
use crate::core::schedule::{ScheduleService, SlotRef};
use crate::domain::model::{
    age_on, Appointment, AppointmentStatus, Metrics, Notification, Reply, Slot,
};
use crate::domain::ports::{GuidanceGenerator, Messenger, SpeechSynthesizer};
use crate::utils::error::{AgendaError, Result};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const BIRTH_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BookingRequest {
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "telefone")]
    pub phone: String,
    #[serde(rename = "data_nascimento")]
    pub birth_date: String,
    #[serde(rename = "exame")]
    pub exam: String,
}

impl BookingRequest {
    fn trimmed(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            birth_date: self.birth_date.trim().to_string(),
            exam: self.exam.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingOutcome {
    #[serde(rename = "sucesso")]
    pub success: bool,
    #[serde(rename = "agendamento")]
    pub appointment: Appointment,
    #[serde(rename = "mensagem")]
    pub message: String,
    #[serde(rename = "idoso")]
    pub elderly: bool,
    #[serde(rename = "idade")]
    pub age: u32,
    pub audio_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyOutcome {
    #[serde(rename = "sucesso")]
    pub success: bool,
    #[serde(rename = "acao", skip_serializing_if = "Option::is_none")]
    pub action: Option<&'static str>,
    #[serde(rename = "mensagem")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: u64,
    #[serde(rename = "paciente")]
    pub patient: String,
    #[serde(rename = "telefone")]
    pub phone: String,
    #[serde(rename = "exame")]
    pub exam: String,
    #[serde(rename = "data")]
    pub date: String,
    #[serde(rename = "horario")]
    pub time: String,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulatedMessage {
    #[serde(rename = "mensagem")]
    pub message: String,
    #[serde(rename = "paciente")]
    pub patient: String,
    #[serde(rename = "telefone")]
    pub phone: String,
    pub status: AppointmentStatus,
    pub audio_url: Option<String>,
    #[serde(rename = "idade")]
    pub age: u32,
}

/// Booking and reply flows tying the schedule to the patient channel.
pub struct BookingService {
    schedule: Arc<ScheduleService>,
    activity: Arc<Activity>,
    messenger: Arc<dyn Messenger>,
    guidance: Arc<dyn GuidanceGenerator>,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    templates: Templates,
}

impl BookingService {
    pub fn new(
        schedule: Arc<ScheduleService>,
        activity: Arc<Activity>,
        messenger: Arc<dyn Messenger>,
        guidance: Arc<dyn GuidanceGenerator>,
        speech: Option<Arc<dyn SpeechSynthesizer>>,
        templates: Templates,
    ) -> Self {
        Self {
            schedule,
            activity,
            messenger,
            guidance,
            speech,
            templates,
        }
    }

    pub fn schedule(&self) -> &Arc<ScheduleService> {
        &self.schedule
    }

    pub fn activity(&self) -> &Arc<Activity> {
        &self.activity
    }

    pub fn messenger(&self) -> &Arc<dyn Messenger> {
        &self.messenger
    }

    pub fn templates(&self) -> &Templates {
        &self.templates
    }

    pub async fn book(&self, request: &BookingRequest) -> Result<BookingOutcome> {
        self.book_on(request, Local::now().date_naive()).await
    }

    /// Books the first open slot for the requested exam as of `today`.
    pub async fn book_on(&self, request: &BookingRequest, today: NaiveDate) -> Result<BookingOutcome> {
        let request = request.trimmed();
        if request.name.is_empty()
            || request.phone.is_empty()
            || request.exam.is_empty()
            || request.birth_date.is_empty()
        {
            return Err(AgendaError::validation("Preencha todos os campos"));
        }

        let birth = NaiveDate::parse_from_str(&request.birth_date, BIRTH_DATE_FORMAT)
            .ok()
            .filter(|birth| *birth <= today)
            .ok_or_else(|| AgendaError::validation("Data de nascimento inválida"))?;
        let age = age_on(birth, today);

        let slot = self
            .schedule
            .reserve_first_open(&request.exam, &request.name, &request.phone)
            .await?;

        let mut appointment = self
            .activity
            .record_booking(Appointment {
                id: 0,
                patient: request.name.clone(),
                phone: request.phone.clone(),
                age,
                birth_date: request.birth_date.clone(),
                exam: request.exam.clone(),
                clinic: slot.clinic.clone(),
                date: slot.date.clone(),
                time: slot.time.clone(),
                status: AppointmentStatus::Pending,
                booked_at: Local::now().format("%d/%m/%Y %H:%M").to_string(),
                reminders_sent: Vec::new(),
                audio_url: None,
                slot_key: slot.key(),
            })
            .await;
        tracing::info!(
            "Appointment {} booked: {} ({} anos) {} on {} {}",
            appointment.id,
            appointment.patient,
            age,
            appointment.exam,
            appointment.date,
            appointment.time
        );

        let guidance = self.guidance.guidance(&appointment.exam).await;

        if appointment.is_elderly() {
            if let Some(speech) = &self.speech {
                let script = self.templates.elderly_audio_script(&appointment);
                match speech.synthesize(&script).await {
                    Ok(clip) => {
                        self.activity.set_audio(appointment.id, &clip.url).await;
                        appointment.audio_url = Some(clip.url);
                    }
                    Err(e) => tracing::warn!(
                        "Audio generation failed for appointment {}: {}",
                        appointment.id,
                        e
                    ),
                }
            }
        }

        let message = self.templates.booking_confirmation(&appointment, &guidance);
        if let Err(e) = self.messenger.send_text(&appointment.phone, &message).await {
            tracing::warn!("Confirmation not delivered to {}: {}", appointment.phone, e);
        }
        if let Some(url) = &appointment.audio_url {
            if let Err(e) = self.messenger.send_audio(&appointment.phone, url).await {
                tracing::warn!("Audio not delivered to {}: {}", appointment.phone, e);
            }
        }

        Ok(BookingOutcome {
            success: true,
            elderly: appointment.is_elderly(),
            age,
            audio_url: appointment.audio_url.clone(),
            message,
            appointment,
        })
    }

    /// Reply typed by the operator on the patient's behalf.
    pub async fn handle_reply(&self, phone: &str, text: &str) -> Result<ReplyOutcome> {
        let appointment = self
            .activity
            .find_active_by_phone(phone)
            .await
            .ok_or_else(|| AgendaError::not_found("Agendamento não encontrado"))?;

        match Reply::parse(text) {
            Reply::Confirm => self.confirm(&appointment).await,
            Reply::Cancel => self.cancel(&appointment).await,
            Reply::Unknown => Ok(ReplyOutcome {
                success: false,
                action: None,
                message: self.templates.not_understood(),
                status: Some(appointment.status),
            }),
        }
    }

    async fn confirm(&self, appointment: &Appointment) -> Result<ReplyOutcome> {
        let updated = self
            .activity
            .set_status(appointment.id, AppointmentStatus::Confirmed)
            .await
            .ok_or_else(|| AgendaError::not_found("Agendamento não encontrado"))?;

        if let Err(e) = self
            .schedule
            .apply_reply(booking_ref(appointment), Reply::Confirm)
            .await
        {
            tracing::warn!("Schedule not updated for {}: {}", appointment.slot_key, e);
        }

        Ok(ReplyOutcome {
            success: true,
            action: Some("CONFIRMADO"),
            message: self.templates.presence_confirmed(&appointment.patient),
            status: Some(updated.status),
        })
    }

    async fn cancel(&self, appointment: &Appointment) -> Result<ReplyOutcome> {
        let updated = self
            .activity
            .set_status(appointment.id, AppointmentStatus::Cancelled)
            .await
            .ok_or_else(|| AgendaError::not_found("Agendamento não encontrado"))?;

        // A failed sheet write must not block the cancellation
        let slot = match self
            .schedule
            .apply_reply(booking_ref(appointment), Reply::Cancel)
            .await
        {
            Ok(Some(slot)) => slot,
            Ok(None) => slot_of(appointment),
            Err(e) => {
                tracing::warn!("Slot {} not released: {}", appointment.slot_key, e);
                slot_of(appointment)
            }
        };
        self.raise_cancellation(&slot).await;

        Ok(ReplyOutcome {
            success: true,
            action: Some("CANCELADO"),
            message: self.templates.appointment_cancelled(&appointment.patient),
            status: Some(updated.status),
        })
    }

    async fn raise_cancellation(&self, slot: &Slot) -> Notification {
        let message =
            Templates::cancellation_notice(&slot.patient, &slot.exam, &slot.date, &slot.time);
        self.activity.notify_cancellation(message, slot).await
    }

    /// Reply that arrived over WhatsApp, keyed on the schedule row. Answers
    /// the patient and returns whether a row was updated.
    pub async fn process_patient_reply(&self, phone: &str, reply: Reply) -> Result<bool> {
        if reply == Reply::Unknown {
            return Ok(false);
        }

        let Some(slot) = self.schedule.apply_reply(SlotRef::Phone(phone), reply).await? else {
            tracing::warn!("No booking found for {}", phone);
            return Ok(false);
        };

        let message = match reply {
            Reply::Confirm => {
                self.activity
                    .record_sheet_reply(&slot, AppointmentStatus::Confirmed)
                    .await;
                self.templates.presence_confirmed(&slot.patient)
            }
            _ => {
                self.activity
                    .record_sheet_reply(&slot, AppointmentStatus::Cancelled)
                    .await;
                self.raise_cancellation(&slot).await;
                self.templates.appointment_cancelled(&slot.patient)
            }
        };

        if let Err(e) = self.messenger.send_text(phone, &message).await {
            tracing::warn!("Reply acknowledgement not delivered to {}: {}", phone, e);
        }
        tracing::info!("Processed {:?} from {} for {}", reply, phone, slot.patient);
        Ok(true)
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.activity
            .all_appointments()
            .await
            .into_iter()
            .map(|a| Conversation {
                id: a.id,
                patient: a.patient,
                phone: a.phone,
                exam: a.exam,
                date: a.date,
                time: a.time,
                status: a.status,
            })
            .collect()
    }

    /// The booking message as the patient would have received it.
    pub async fn simulated_message(&self, id: u64) -> Result<SimulatedMessage> {
        let appointment = self
            .activity
            .find(id)
            .await
            .ok_or_else(|| AgendaError::not_found("Agendamento não encontrado"))?;
        let guidance = self.guidance.guidance(&appointment.exam).await;

        Ok(SimulatedMessage {
            message: self.templates.booking_confirmation(&appointment, &guidance),
            patient: appointment.patient,
            phone: appointment.phone,
            status: appointment.status,
            audio_url: appointment.audio_url,
            age: appointment.age,
        })
    }

    pub async fn simulated_reply(&self, id: u64, text: &str) -> Result<ReplyOutcome> {
        let appointment = self
            .activity
            .find(id)
            .await
            .ok_or_else(|| AgendaError::not_found("Agendamento não encontrado"))?;

        let reply = Reply::parse(text);
        // The row may already belong to someone else
        if appointment.status == AppointmentStatus::Cancelled && reply != Reply::Unknown {
            return Ok(ReplyOutcome {
                success: false,
                action: None,
                message: self.templates.already_cancelled(&appointment.patient),
                status: Some(appointment.status),
            });
        }

        match reply {
            Reply::Confirm => self.confirm(&appointment).await,
            Reply::Cancel => self.cancel(&appointment).await,
            Reply::Unknown => Ok(ReplyOutcome {
                success: true,
                action: None,
                message: self.templates.simulator_thanks(),
                status: Some(appointment.status),
            }),
        }
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.activity.recent_notifications().await
    }

    pub async fn appointments(&self) -> Vec<Appointment> {
        self.activity.recent_appointments().await
    }

    pub async fn metrics(&self) -> Metrics {
        self.activity.metrics().await
    }
}

fn booking_ref(appointment: &Appointment) -> SlotRef<'_> {
    SlotRef::Booking {
        key: &appointment.slot_key,
        phone: &appointment.phone,
    }
}

fn slot_of(appointment: &Appointment) -> Slot {
    Slot {
        clinic: appointment.clinic.clone(),
        exam: appointment.exam.clone(),
        date: appointment.date.clone(),
        time: appointment.time.clone(),
        patient: appointment.patient.clone(),
        phone: appointment.phone.clone(),
        ..Slot::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::csv_store::CsvScheduleStore;
    use crate::domain::ports::{AudioClip, ConnectionState, InboundMessage, QrCode};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingMessenger {
        texts: Mutex<Vec<(String, String)>>,
        audios: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send_text(&self, phone: &str, text: &str) -> Result<()> {
            self.texts
                .lock()
                .unwrap()
                .push((phone.to_string(), text.to_string()));
            Ok(())
        }
        async fn send_audio(&self, phone: &str, audio_url: &str) -> Result<()> {
            self.audios
                .lock()
                .unwrap()
                .push((phone.to_string(), audio_url.to_string()));
            Ok(())
        }
        async fn connection_state(&self) -> ConnectionState {
            ConnectionState::default()
        }
        async fn qr_code(&self) -> Result<QrCode> {
            Ok(QrCode::default())
        }
        async fn create_instance(&self) -> Result<QrCode> {
            Ok(QrCode::default())
        }
        async fn configure_webhook(&self, _url: &str) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        async fn recent_messages(&self, _limit: usize) -> Result<Vec<InboundMessage>> {
            Ok(Vec::new())
        }
        fn is_simulated(&self) -> bool {
            true
        }
        fn base_url(&self) -> &str {
            ""
        }
        fn instance(&self) -> &str {
            "test"
        }
    }

    struct FixedGuidance;

    #[async_trait]
    impl GuidanceGenerator for FixedGuidance {
        async fn guidance(&self, exam: &str) -> String {
            format!("Orientações de {}", exam)
        }
    }

    struct FailingSpeech;

    #[async_trait]
    impl SpeechSynthesizer for FailingSpeech {
        async fn synthesize(&self, _text: &str) -> Result<AudioClip> {
            Err(AgendaError::validation("tts offline"))
        }
    }

    struct Fixture {
        _dir: TempDir,
        service: BookingService,
        messenger: Arc<RecordingMessenger>,
    }

    async fn fixture(speech: Option<Arc<dyn SpeechSynthesizer>>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(CsvScheduleStore::new(dir.path().join("agenda.csv")));
        let schedule = Arc::new(ScheduleService::new(store));
        schedule
            .upload(vec![
                vec!["clinica", "exame", "data", "horario", "disponivel"],
                vec!["UBS Norte", "Cardiologista", "20/11/2025", "08:00", "SIM"],
                vec!["UBS Norte", "Cardiologista", "20/11/2025", "09:00", "SIM"],
            ]
            .into_iter()
            .map(|r| r.into_iter().map(String::from).collect())
            .collect())
            .await
            .unwrap();

        let messenger = Arc::new(RecordingMessenger::default());
        let service = BookingService::new(
            schedule,
            Arc::new(Activity::new()),
            messenger.clone(),
            Arc::new(FixedGuidance),
            speech,
            Templates::new("(53) 3000-0000", "Sistema SUS", vec![7, 5, 3, 1]),
        );
        Fixture {
            _dir: dir,
            service,
            messenger,
        }
    }

    fn request(name: &str, phone: &str, birth: &str) -> BookingRequest {
        BookingRequest {
            name: name.to_string(),
            phone: phone.to_string(),
            birth_date: birth.to_string(),
            exam: "Cardiologista".to_string(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 1).unwrap()
    }

    #[tokio::test]
    async fn test_book_validates_input() {
        let f = fixture(None).await;

        let err = f
            .service
            .book_on(&request("", "53911111111", "1990-01-01"), today())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Preencha todos os campos"));

        let err = f
            .service
            .book_on(&request("Ana", "53911111111", "01/01/1990"), today())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Data de nascimento inválida"));
        assert!(f.messenger.texts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_book_sends_confirmation() {
        let f = fixture(None).await;
        let outcome = f
            .service
            .book_on(&request(" Ana ", "53911111111", "1990-06-15"), today())
            .await
            .unwrap();

        assert_eq!(outcome.appointment.id, 1);
        assert_eq!(outcome.age, 35);
        assert!(!outcome.elderly);
        assert_eq!(outcome.appointment.time, "08:00");
        assert!(outcome.message.contains("Orientações de Cardiologista"));

        let texts = f.messenger.texts.lock().unwrap();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].0, "53911111111");
        assert_eq!(f.service.metrics().await.booked, 1);
    }

    #[tokio::test]
    async fn test_elderly_booking_survives_audio_failure() {
        let f = fixture(Some(Arc::new(FailingSpeech))).await;
        let outcome = f
            .service
            .book_on(&request("José", "53922222222", "1950-01-01"), today())
            .await
            .unwrap();

        assert!(outcome.elderly);
        assert!(outcome.audio_url.is_none());
        assert!(outcome.message.contains("Atendimento Prioritário"));
        assert!(f.messenger.audios.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_operator_reply_flow() {
        let f = fixture(None).await;
        f.service
            .book_on(&request("Ana", "53911111111", "1990-06-15"), today())
            .await
            .unwrap();

        let unknown = f.service.handle_reply("53911111111", "talvez").await.unwrap();
        assert!(!unknown.success);
        assert!(unknown.message.contains("Não entendi"));

        let confirmed = f.service.handle_reply("53911111111", "sim").await.unwrap();
        assert_eq!(confirmed.action, Some("CONFIRMADO"));
        assert_eq!(f.service.schedule().counts().await.unwrap().confirmed, 1);

        let cancelled = f.service.handle_reply("53911111111", "2").await.unwrap();
        assert_eq!(cancelled.action, Some("CANCELADO"));
        assert_eq!(f.service.schedule().status().await.unwrap().open_slots, 2);

        let notifications = f.service.notifications().await;
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, "CANCELAMENTO");
        assert!(notifications[0].message.contains("Ana CANCELOU Cardiologista"));

        let err = f.service.handle_reply("53911111111", "1").await.unwrap_err();
        assert!(matches!(err, AgendaError::NotFound { .. }));

        let metrics = f.service.metrics().await;
        assert_eq!((metrics.confirmed, metrics.cancelled), (1, 1));
    }

    #[tokio::test]
    async fn test_patient_reply_by_phone() {
        let f = fixture(None).await;
        f.service
            .book_on(&request("Ana", "(53) 91111-1111", "1990-06-15"), today())
            .await
            .unwrap();

        assert!(f
            .service
            .process_patient_reply("5553911111111", Reply::Confirm)
            .await
            .unwrap());
        assert!(!f
            .service
            .process_patient_reply("5553999999999", Reply::Confirm)
            .await
            .unwrap());

        let texts = f.messenger.texts.lock().unwrap().clone();
        assert_eq!(texts.len(), 2);
        assert!(texts[1].1.contains("Consulta Confirmada"));
        assert_eq!(
            f.service.appointments().await[0].status,
            AppointmentStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_simulator_round_trip() {
        let f = fixture(None).await;
        f.service
            .book_on(&request("Ana", "53911111111", "1990-06-15"), today())
            .await
            .unwrap();

        let conversations = f.service.conversations().await;
        assert_eq!(conversations.len(), 1);

        let initial = f.service.simulated_message(1).await.unwrap();
        assert!(initial.message.starts_with("✅ AGENDAMENTO CONFIRMADO"));

        let thanks = f.service.simulated_reply(1, "obrigada").await.unwrap();
        assert!(thanks.message.contains("Por nada"));
        assert_eq!(thanks.status, Some(AppointmentStatus::Pending));

        let cancelled = f.service.simulated_reply(1, "cancelar").await.unwrap();
        assert_eq!(cancelled.status, Some(AppointmentStatus::Cancelled));
        assert!(f.service.simulated_reply(9, "1").await.is_err());
    }

    #[tokio::test]
    async fn test_stale_reply_leaves_new_booking_alone() {
        let f = fixture(None).await;
        f.service
            .book_on(&request("Ana", "53911111111", "1990-06-15"), today())
            .await
            .unwrap();
        f.service.simulated_reply(1, "2").await.unwrap();

        // Bia gets the slot Ana released
        let bia = f
            .service
            .book_on(&request("Bia", "53922222222", "1992-03-01"), today())
            .await
            .unwrap();
        assert_eq!(bia.appointment.time, "08:00");

        for text in ["2", "1"] {
            let stale = f.service.simulated_reply(1, text).await.unwrap();
            assert!(!stale.success);
            assert!(stale.message.contains("já foi cancelada"));
            assert_eq!(stale.status, Some(AppointmentStatus::Cancelled));
        }

        let (rows, totals) = f.service.schedule().booked_overview().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].patient, "Bia");
        assert_eq!(rows[0].time, "08:00");
        assert_eq!(rows[0].status, "pendente");
        assert_eq!(totals.confirmed, 0);
        assert_eq!(f.service.notifications().await.len(), 1);
        assert_eq!(
            f.service.appointments().await[1].status,
            AppointmentStatus::Pending
        );
    }
}

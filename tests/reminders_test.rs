use anyhow::Result;
use chrono::NaiveDate;
use httpmock::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use sus_agenda::adapters::{CsvScheduleStore, EvolutionClient, GeminiGuidance};
use sus_agenda::config::toml_config::{GuidanceConfig, WhatsAppConfig};
use sus_agenda::core::{
    Activity, BookingService, ReminderEngine, ReplyPoller, ScheduleService, Templates,
};
use tempfile::TempDir;

const INSTANCE: &str = "sus-agendamentos";

// Relative to 2026-11-20: D-7, D-3, D-1, an open row, a cancelled booking and an undated one.
const SCHEDULE_CSV: &str = "clinica,exame,data,horario,disponivel,paciente,telefone,status_confirmacao\n\
UBS Centro,Raio-X,27/11/2026,08:00,NAO,Ana Costa,53911112222,PENDENTE\n\
UBS Centro,Raio-X,23/11/2026,09:00,NAO,Bruno Dias,53933334444,CONFIRMADO\n\
UBS Centro,Ultrassom,21/11/2026,10:00,NAO,Carla Reis,53955556666,\n\
UBS Centro,Ultrassom,21/11/2026,11:00,SIM,,,CANCELADO\n\
UBS Centro,Ultrassom,22/11/2026,11:00,NAO,Davi Melo,53977778888,CANCELADO\n\
UBS Centro,Ultrassom,data a definir,11:00,NAO,Eva Luz,53999990000,PENDENTE\n";

struct Harness {
    server: MockServer,
    schedule: Arc<ScheduleService>,
    activity: Arc<Activity>,
    messenger: Arc<EvolutionClient>,
    schedule_path: std::path::PathBuf,
    _tmp: TempDir,
}

async fn harness() -> Harness {
    let tmp = TempDir::new().unwrap();
    let schedule_path = tmp.path().join("agenda.csv");
    std::fs::write(&schedule_path, SCHEDULE_CSV).unwrap();

    let server = MockServer::start_async().await;
    let messenger = Arc::new(EvolutionClient::new(&WhatsAppConfig {
        base_url: server.base_url(),
        api_key: "evolution-key".to_string(),
        ..WhatsAppConfig::default()
    }));

    Harness {
        server,
        schedule: Arc::new(ScheduleService::new(Arc::new(CsvScheduleStore::new(
            &schedule_path,
        )))),
        activity: Arc::new(Activity::new()),
        messenger,
        schedule_path,
        _tmp: tmp,
    }
}

fn templates() -> Templates {
    Templates::new("(53) 3000-0000", "Secretaria de Saúde", vec![7, 5, 3, 1])
}

fn engine(h: &Harness) -> ReminderEngine {
    ReminderEngine::new(
        h.schedule.clone(),
        h.activity.clone(),
        h.messenger.clone(),
        templates(),
        vec![7, 5, 3, 1],
        Duration::from_secs(3600),
    )
}

fn booking(h: &Harness) -> Arc<BookingService> {
    Arc::new(BookingService::new(
        h.schedule.clone(),
        h.activity.clone(),
        h.messenger.clone(),
        Arc::new(GeminiGuidance::new(&GuidanceConfig::default())),
        None,
        templates(),
    ))
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 11, 20).unwrap()
}

#[tokio::test]
async fn test_reminders_sent_once_per_offset() -> Result<()> {
    let h = harness().await;
    let send = h
        .server
        .mock_async(|when, then| {
            when.method(POST).path(format!("/message/sendText/{}", INSTANCE));
            then.status(201);
        })
        .await;

    let engine = engine(&h);
    let sent = engine.run_once(today()).await?;

    // Ana (D-7), Bruno (D-3) and Carla (D-1); Davi is cancelled and Eva has no date
    assert_eq!(sent, 3);
    send.assert_hits_async(3).await;

    let again = engine.run_once(today()).await?;
    assert_eq!(again, 0);
    send.assert_hits_async(3).await;

    assert_eq!(h.activity.metrics().await.reminders_sent, 3);
    Ok(())
}

#[tokio::test]
async fn test_reminder_content_for_tomorrow() {
    let h = harness().await;
    let tomorrow = h
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path(format!("/message/sendText/{}", INSTANCE))
                .body_contains("53955556666")
                .body_contains("Carla Reis")
                .body_contains("AMANHÃ");
            then.status(201);
        })
        .await;

    // Only Carla's D-1 reminder is accepted by the mock
    let sent = engine(&h).run_once(today()).await.unwrap();

    assert_eq!(sent, 1);
    tomorrow.assert_async().await;
}

#[tokio::test]
async fn test_failed_reminder_is_retried() {
    let h = harness().await;
    let mut failing = h
        .server
        .mock_async(|when, then| {
            when.method(POST).path(format!("/message/sendText/{}", INSTANCE));
            then.status(503);
        })
        .await;

    let engine = engine(&h);
    assert_eq!(engine.run_once(today()).await.unwrap(), 0);
    failing.delete_async().await;

    h.server
        .mock_async(|when, then| {
            when.method(POST).path(format!("/message/sendText/{}", INSTANCE));
            then.status(201);
        })
        .await;
    assert_eq!(engine.run_once(today()).await.unwrap(), 3);
}

#[tokio::test]
async fn test_no_reminders_outside_offsets() {
    let h = harness().await;
    let send = h
        .server
        .mock_async(|when, then| {
            when.method(POST).path(format!("/message/sendText/{}", INSTANCE));
            then.status(201);
        })
        .await;

    let early = NaiveDate::from_ymd_opt(2026, 11, 1).unwrap();
    assert_eq!(engine(&h).run_once(early).await.unwrap(), 0);
    send.assert_hits_async(0).await;
}

fn record(id: &str, jid: &str, text: &str, ts: i64) -> serde_json::Value {
    json!({
        "key": { "id": id, "remoteJid": jid, "fromMe": false },
        "message": { "conversation": text },
        "messageTimestamp": ts
    })
}

#[tokio::test]
async fn test_poller_processes_only_new_replies() {
    let h = harness().await;
    let booking = booking(&h);

    let mut history = h
        .server
        .mock_async(|when, then| {
            when.method(POST).path(format!("/chat/findMessages/{}", INSTANCE));
            then.status(200).json_body(json!({
                "messages": {
                    "records": [record("OLD", "5553911112222@s.whatsapp.net", "2", 1_763_600_000)]
                }
            }));
        })
        .await;

    let poller = ReplyPoller::new(booking.clone(), 20, Duration::from_secs(15));
    assert_eq!(poller.prime().await.unwrap(), 1);
    history.delete_async().await;

    h.server
        .mock_async(|when, then| {
            when.method(POST).path(format!("/chat/findMessages/{}", INSTANCE));
            then.status(200).json_body(json!([
                record("OLD", "5553911112222@s.whatsapp.net", "2", 1_763_600_000),
                record("NEW", "5553911112222@s.whatsapp.net", "1", 1_763_600_100),
                record("CHAT", "5553933334444@s.whatsapp.net", "obrigado", 1_763_600_200)
            ]));
        })
        .await;
    let ack = h
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path(format!("/message/sendText/{}", INSTANCE))
                .body_contains("Consulta Confirmada");
            then.status(201);
        })
        .await;

    assert_eq!(poller.poll_once().await.unwrap(), 1);
    ack.assert_async().await;

    // Same batch again: nothing new
    assert_eq!(poller.poll_once().await.unwrap(), 0);
    assert_eq!(poller.seen_len().await, 3);

    let csv = std::fs::read_to_string(&h.schedule_path).unwrap();
    assert!(csv.contains("27/11/2026,08:00,NAO,Ana Costa,53911112222,CONFIRMADO"));
    assert_eq!(h.activity.metrics().await.confirmed, 1);
}

#[tokio::test]
async fn test_poller_forgets_ids_outside_latest_batch() -> Result<()> {
    let h = harness().await;
    let poller = ReplyPoller::new(booking(&h), 20, Duration::from_secs(15));

    let mut first = h
        .server
        .mock_async(|when, then| {
            when.method(POST).path(format!("/chat/findMessages/{}", INSTANCE));
            then.status(200).json_body(json!([
                record("A", "5553933334444@s.whatsapp.net", "oi", 1_763_600_000),
                record("B", "5553933334444@s.whatsapp.net", "tudo bem", 1_763_600_100)
            ]));
        })
        .await;
    assert_eq!(poller.prime().await?, 2);
    first.delete_async().await;

    h.server
        .mock_async(|when, then| {
            when.method(POST).path(format!("/chat/findMessages/{}", INSTANCE));
            then.status(200).json_body(json!([
                record("B", "5553933334444@s.whatsapp.net", "tudo bem", 1_763_600_100),
                record("C", "5553933334444@s.whatsapp.net", "ok", 1_763_600_200)
            ]));
        })
        .await;
    assert_eq!(poller.poll_once().await?, 0);
    assert_eq!(poller.seen_len().await, 2);
    Ok(())
}

#[tokio::test]
async fn test_reminders_of_past_appointments_are_forgotten() -> Result<()> {
    let h = harness().await;
    h.server
        .mock_async(|when, then| {
            when.method(POST).path(format!("/message/sendText/{}", INSTANCE));
            then.status(201);
        })
        .await;

    let engine = engine(&h);
    assert_eq!(engine.run_once(today()).await?, 3);

    // Carla's appointment on 21/11 is past by 22/11; Ana and Bruno are not
    let later = NaiveDate::from_ymd_opt(2026, 11, 22).unwrap();
    assert_eq!(h.activity.prune_reminders(later).await, 1);
    assert!(h.activity.reminder_already_sent("UBS Centro|Raio-X|27/11/2026|08:00|53911112222_D7").await);
    Ok(())
}

//! Route table.
//!
//! Everything the dashboard calls lives under `/api/`. The provider webhook
//! sits at `/webhook/whatsapp` and generated audio is served from `/static`.

use crate::api::endpoints;
use crate::api::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::path::Path;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub fn app_router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    // NOTE: Path params use `:param` syntax (axum 0.7).
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/agendar", post(endpoints::appointments::book))
        .route(
            "/resposta-paciente",
            post(endpoints::appointments::reply),
        )
        .route("/notificacoes", get(endpoints::appointments::notifications))
        .route("/metricas", get(endpoints::appointments::metrics))
        .route("/agendamentos", get(endpoints::appointments::list))
        .route(
            "/planilha/agendados",
            get(endpoints::appointments::booked_rows),
        )
        .route("/upload-planilha", post(endpoints::schedule::upload))
        .route("/status-planilha", get(endpoints::schedule::status))
        .route("/limpar-planilha", post(endpoints::schedule::clear))
        .route("/download-planilha", get(endpoints::schedule::download))
        .route(
            "/simulador/conversas",
            get(endpoints::simulator::conversations),
        )
        .route(
            "/simulador/mensagem/:id",
            get(endpoints::simulator::message),
        )
        .route(
            "/simulador/responder/:id",
            post(endpoints::simulator::reply),
        )
        .route("/whatsapp/status", get(endpoints::whatsapp::status))
        .route("/whatsapp/qrcode", get(endpoints::whatsapp::qr_code))
        .route(
            "/whatsapp/criar-instancia",
            post(endpoints::whatsapp::create_instance),
        )
        .route("/whatsapp/config", get(endpoints::whatsapp::config))
        .route(
            "/whatsapp/configurar-webhook",
            post(endpoints::whatsapp::configure_webhook),
        );

    Router::new()
        .nest("/api", api)
        .route(
            "/webhook/whatsapp",
            get(endpoints::webhook::probe).post(endpoints::webhook::receive),
        )
        .nest_service("/static", ServeDir::new(static_dir.as_ref()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const CSV: &str = "clinica,exame,data,horario,disponivel\n\
                       UBS Centro,Raio-X,20/11/2026,08:00,SIM\n\
                       UBS Centro,Raio-X,20/11/2026,09:00,SIM\n";

    fn test_app() -> (Router, TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.schedule.path = tmp.path().join("agenda.csv").display().to_string();
        config.speech.enabled = false;
        let state = AppState::from_config(&config).unwrap();
        (app_router(state, tmp.path()), tmp)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_req(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn upload_req(file_name: &str, contents: &str) -> Request<Body> {
        let boundary = "agenda-boundary";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
             Content-Type: text/csv\r\n\r\n{c}\r\n--{b}--\r\n",
            b = boundary,
            f = file_name,
            c = contents
        );
        Request::builder()
            .method("POST")
            .uri("/api/upload-planilha")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_simulation_mode() {
        let (app, _tmp) = test_app();
        let (status, body) = send(app, get_req("/api/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["whatsapp_simulacao"], true);
    }

    #[tokio::test]
    async fn status_without_schedule() {
        let (app, _tmp) = test_app();
        let (status, body) = send(app, get_req("/api/status-planilha")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["carregado"], false);
        assert_eq!(body["mensagem"], "Nenhuma planilha carregada");
    }

    #[tokio::test]
    async fn upload_then_book() {
        let (app, _tmp) = test_app();

        let (status, body) = send(app.clone(), upload_req("agenda.csv", CSV)).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["sucesso"], true);
        assert_eq!(body["horarios_adicionados"], 2);

        let (status, body) = send(
            app.clone(),
            json_req(
                "/api/agendar",
                json!({
                    "nome": "Maria Souza",
                    "telefone": "(53) 99999-1234",
                    "data_nascimento": "1990-05-10",
                    "exame": "Raio-X"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["sucesso"], true);
        assert_eq!(body["idoso"], false);

        let (_, body) = send(app, get_req("/api/planilha/agendados")).await;
        assert_eq!(body["totais"]["agendados"], 1);
        assert_eq!(body["agendados"][0]["paciente"], "Maria Souza");
    }

    #[tokio::test]
    async fn upload_rejects_non_csv() {
        let (app, _tmp) = test_app();
        let (status, body) = send(app, upload_req("agenda.pdf", CSV)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["sucesso"], false);
    }

    #[tokio::test]
    async fn booking_without_schedule_is_not_found() {
        let (app, _tmp) = test_app();
        let (status, body) = send(
            app,
            json_req(
                "/api/agendar",
                json!({
                    "nome": "Maria",
                    "telefone": "53999991234",
                    "data_nascimento": "1990-05-10",
                    "exame": "Raio-X"
                }),
            ),
        )
        .await;

        assert!(status.is_client_error());
        assert_eq!(body["sucesso"], false);
    }

    #[tokio::test]
    async fn booking_requires_all_fields() {
        let (app, _tmp) = test_app();
        let (status, _) = send(app, json_req("/api/agendar", json!({ "nome": "Maria" }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_gets_error_body() {
        let (app, _tmp) = test_app();
        for uri in [
            "/api/agendar",
            "/api/resposta-paciente",
            "/api/simulador/responder/1",
        ] {
            let request = Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{\"nome\": "))
                .unwrap();
            let (status, body) = send(app.clone(), request).await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body["sucesso"], false);
            assert!(body["erro"].as_str().unwrap().starts_with("JSON inválido"));
        }
    }

    #[tokio::test]
    async fn download_without_schedule_is_not_found() {
        let (app, _tmp) = test_app();
        let (status, _) = send(app, get_req("/api/download-planilha")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn simulator_message_unknown_id() {
        let (app, _tmp) = test_app();
        let (status, _) = send(app, get_req("/api/simulador/mensagem/42")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn qrcode_requires_provider() {
        let (app, _tmp) = test_app();
        let (status, body) = send(app, get_req("/api/whatsapp/qrcode")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["sucesso"], false);
    }

    #[tokio::test]
    async fn whatsapp_config_hides_key() {
        let (app, _tmp) = test_app();
        let (_, body) = send(app, get_req("/api/whatsapp/config")).await;

        assert_eq!(body["modo_simulacao"], true);
        assert!(body.get("api_key").is_none());
    }

    #[tokio::test]
    async fn webhook_ignores_other_events() {
        let (app, _tmp) = test_app();
        let (status, body) = send(
            app,
            json_req("/webhook/whatsapp", json!({ "event": "connection.update" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ignored");
        assert_eq!(body["evento"], "connection.update");
    }

    #[tokio::test]
    async fn webhook_ignores_own_messages() {
        let (app, _tmp) = test_app();
        let payload = json!({
            "event": "messages.upsert",
            "data": {
                "key": { "remoteJid": "5553999991234@s.whatsapp.net", "fromMe": true },
                "message": { "conversation": "1" }
            }
        });
        let (_, body) = send(app, json_req("/webhook/whatsapp", payload)).await;

        assert_eq!(body["motivo"], "fromMe");
    }

    #[tokio::test]
    async fn webhook_accepts_patient_message() {
        let (app, _tmp) = test_app();
        let payload = json!({
            "event": "MESSAGES_UPSERT",
            "data": {
                "key": { "remoteJid": "5553999991234@s.whatsapp.net", "fromMe": false, "id": "ABC" },
                "message": { "conversation": "ok obrigado" },
                "messageTimestamp": 1_763_600_000
            }
        });
        let (status, body) = send(app, json_req("/webhook/whatsapp", payload)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["texto"], "ok obrigado");
    }

    #[tokio::test]
    async fn webhook_probe() {
        let (app, _tmp) = test_app();
        let (status, body) = send(app, get_req("/webhook/whatsapp")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "webhook ativo");
    }
}

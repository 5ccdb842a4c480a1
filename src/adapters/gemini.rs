use crate::config::toml_config::GuidanceConfig;
use crate::domain::ports::GuidanceGenerator;
use crate::utils::error::{AgendaError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// Text shown when the model is unavailable or returns nothing.
pub fn fallback_guidance(exam: &str) -> String {
    format!(
        "💙 ORIENTAÇÕES - {}\n\n\
         📋 O que levar:\n\
         • Documento com foto e Cartão SUS\n\
         • Exames anteriores\n\
         • Lista de medicamentos em uso\n\n\
         🏃 Chegue 15 minutos antes\n\n\
         Para consulta de {}, consulte a unidade de saúde.",
        exam.to_uppercase(),
        exam
    )
}

pub fn guidance_prompt(exam: &str) -> String {
    let upper = exam.to_uppercase();
    format!(
        "Você é um médico especialista em {exam} trabalhando no SUS.\n\n\
         Crie orientações ESPECÍFICAS E DETALHADAS para um paciente que vai fazer consulta de {exam}.\n\n\
         IMPORTANTE: As dicas preventivas devem ser EXCLUSIVAS da área de {exam}.\n\
         Por exemplo:\n\
         - Se for Cardiologista: fale de pressão arterial, colesterol, dor no peito\n\
         - Se for Dermatologista: fale de protetor solar, câncer de pele, manchas\n\
         - Se for Nutricionista: fale de alimentação balanceada, dieta, controle de peso\n\
         - Se for Oftalmologista: fale de saúde dos olhos, fadiga visual, uso de óculos\n\n\
         NÃO use dicas genéricas como \"beba água\" ou \"pratique exercícios\" que servem para tudo.\n\n\
         Formato EXATO (copie e preencha):\n\n\
         💙 ORIENTAÇÕES - {upper}\n\n\
         📋 O que levar:\n\
         • [Item 1 específico de {exam}]\n\
         • [Item 2 específico de {exam}]\n\
         • [Item 3 específico de {exam}]\n\n\
         ⚠️ Jejum: [Sim/Não e detalhes]\n\
         🏃 Chegue [X] minutos antes\n\n\
         💡 DICAS PREVENTIVAS - {upper}:\n\
         • [Dica preventiva específica 1 de {exam}]\n\
         • [Dica preventiva específica 2 de {exam}]\n\
         • [Dica preventiva específica 3 de {exam}]\n\
         • [Dica preventiva específica 4 de {exam}]\n\n\
         Seja específico, use linguagem simples, máximo 120 palavras."
    )
}

/// Guidance written by a Gemini model over the `generateContent` REST call.
#[derive(Debug, Clone)]
pub struct GeminiGuidance {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiGuidance {
    pub fn new(config: &GuidanceConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_default(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }

    async fn generate(&self, exam: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        );
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: guidance_prompt(exam),
                }],
            }],
        };

        tracing::debug!("Requesting guidance for {} from {}", exam, url);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgendaError::UpstreamError {
                service: "Gemini",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .find(|t| !t.trim().is_empty())
            .ok_or_else(|| AgendaError::validation("Gemini response has no text"))?;

        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl GuidanceGenerator for GeminiGuidance {
    async fn guidance(&self, exam: &str) -> String {
        if self.api_key.is_empty() {
            tracing::debug!("No guidance API key, using fallback text for {}", exam);
            return fallback_guidance(exam);
        }

        match self.generate(exam).await {
            Ok(text) => {
                tracing::info!("Guidance generated for {} ({} chars)", exam, text.len());
                text
            }
            Err(e) => {
                tracing::warn!("Guidance generation failed for {}: {}", exam, e);
                fallback_guidance(exam)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn config(endpoint: String, api_key: &str) -> GuidanceConfig {
        GuidanceConfig {
            api_key: api_key.to_string(),
            endpoint,
            ..GuidanceConfig::default()
        }
    }

    #[test]
    fn test_prompt_names_the_specialty() {
        let prompt = guidance_prompt("Dermatologista");
        assert!(prompt.contains("especialista em Dermatologista"));
        assert!(prompt.contains("ORIENTAÇÕES - DERMATOLOGISTA"));
    }

    #[tokio::test]
    async fn test_guidance_uses_first_candidate_text() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1beta/models/gemini-2.5-flash:generateContent")
                .query_param("key", "test-key");
            then.status(200).json_body(json!({
                "candidates": [{ "content": { "parts": [{ "text": "  Leve seus exames.  " }] } }]
            }));
        });

        let generator = GeminiGuidance::new(&config(server.base_url(), "test-key"));
        let text = generator.guidance("Cardiologista").await;

        mock.assert();
        assert_eq!(text, "Leve seus exames.");
    }

    #[tokio::test]
    async fn test_guidance_falls_back_on_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(500).body("quota exceeded");
        });

        let generator = GeminiGuidance::new(&config(server.base_url(), "test-key"));
        let text = generator.guidance("Cardiologista").await;
        assert_eq!(text, fallback_guidance("Cardiologista"));
    }

    #[tokio::test]
    async fn test_guidance_without_key_skips_the_call() {
        let generator = GeminiGuidance::new(&config("http://127.0.0.1:9".to_string(), ""));
        let text = generator.guidance("Nutricionista").await;
        assert!(text.contains("Para consulta de Nutricionista"));
    }
}

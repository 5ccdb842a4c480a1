use crate::config::toml_config::SpeechConfig;
use crate::domain::ports::{AudioClip, SpeechSynthesizer};
use crate::utils::error::{AgendaError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;

/// The translate endpoint rejects longer queries.
pub const MAX_CHUNK_CHARS: usize = 100;

const SPOKEN_REPLACEMENTS: [(&str, &str); 17] = [
    ("✅", "Confirmado."),
    ("❌", "Cancelado."),
    ("📅", "Data:"),
    ("⏰", "Horário:"),
    ("🏥", "Local:"),
    ("👨‍⚕️", "Especialidade:"),
    ("👵", "Idade:"),
    ("👴", ""),
    ("📲", ""),
    ("1️⃣", "Um."),
    ("2️⃣", "Dois."),
    ("🔊", ""),
    ("📝", ""),
    ("🎧", ""),
    ("🔔", "Atenção."),
    ("⚠️", "Atenção."),
    ("📞", "Telefone:"),
];

/// Turns a chat message into something a speech engine reads well.
pub fn clean_for_speech(text: &str) -> String {
    let mut cleaned = text.to_string();
    for (symbol, spoken) in SPOKEN_REPLACEMENTS {
        cleaned = cleaned.replace(symbol, spoken);
    }
    cleaned = cleaned.replace("\n\n", ". ").replace('\n', ". ");

    cleaned
        .chars()
        .filter(|c| !('\u{1F600}'..='\u{1F9FF}').contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Splits on whitespace into chunks of at most `max_chars` characters.
/// A single word longer than the limit is cut.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            chunks.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();

        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// MP3 synthesis through the public Google Translate TTS endpoint.
#[derive(Debug, Clone)]
pub struct GoogleTranslateTts {
    client: Client,
    endpoint: String,
    language: String,
    audio_dir: PathBuf,
    public_base_url: String,
}

impl GoogleTranslateTts {
    pub fn new(config: &SpeechConfig, public_base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
            endpoint: config.endpoint.clone(),
            language: config.language.clone(),
            audio_dir: PathBuf::from(&config.audio_dir),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_chunk(&self, chunk: &str, idx: usize, total: usize) -> Result<Vec<u8>> {
        let total = total.to_string();
        let idx = idx.to_string();
        let textlen = chunk.chars().count().to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("ie", "UTF-8"),
                ("q", chunk),
                ("tl", self.language.as_str()),
                ("client", "tw-ob"),
                ("total", total.as_str()),
                ("idx", idx.as_str()),
                ("textlen", textlen.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgendaError::UpstreamError {
                service: "Google TTS",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTranslateTts {
    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        let chunks = split_text(&clean_for_speech(text), MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(AgendaError::validation("Texto vazio para síntese de voz"));
        }

        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            audio.extend(self.fetch_chunk(chunk, idx, chunks.len()).await?);
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        let file_name = format!("audio_{}.mp3", &id[..8]);
        tokio::fs::create_dir_all(&self.audio_dir).await?;
        tokio::fs::write(self.audio_dir.join(&file_name), &audio).await?;

        tracing::info!(
            "Audio generated: {} ({} chunks, {} bytes)",
            file_name,
            chunks.len(),
            audio.len()
        );

        Ok(AudioClip {
            url: format!("{}/static/audios/{}", self.public_base_url, file_name),
            file_name,
        })
    }
}

use crate::adapters::csv_store::render_csv;
use crate::config::toml_config::ScheduleConfig;
use crate::domain::model::Schedule;
use crate::domain::ports::ScheduleStore;
use crate::utils::error::{AgendaError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRangeUpdate<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: Vec<Vec<String>>,
}

/// Schedule kept in the first tab of a Google spreadsheet (Sheets API v4).
#[derive(Debug, Clone)]
pub struct GoogleSheetsStore {
    client: Client,
    api_base: String,
    sheet_id: String,
    range: String,
    access_token: String,
}

impl GoogleSheetsStore {
    pub fn new(
        api_base: impl Into<String>,
        sheet_id: impl Into<String>,
        range: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
            api_base: api_base.into(),
            sheet_id: sheet_id.into(),
            range: range.into(),
            access_token: access_token.into(),
        }
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        let sheet_id = config
            .sheet_id
            .clone()
            .ok_or_else(|| AgendaError::MissingConfigError {
                field: "schedule.sheet_id".to_string(),
            })?;
        let token = config
            .access_token
            .clone()
            .ok_or_else(|| AgendaError::MissingConfigError {
                field: "schedule.access_token".to_string(),
            })?;
        Ok(Self::new(&config.api_base, sheet_id, &config.range, token))
    }

    /// `{base}/v4/spreadsheets/{id}/values/{range}{suffix}` with each segment escaped.
    fn values_url(&self, suffix: &str) -> Result<Url> {
        let mut url = Url::parse(&self.api_base).map_err(|e| AgendaError::InvalidConfigValueError {
            field: "schedule.api_base".to_string(),
            value: self.api_base.clone(),
            reason: e.to_string(),
        })?;
        let last = format!("{}{}", self.range, suffix);
        url.path_segments_mut()
            .map_err(|_| AgendaError::ConfigError {
                message: format!("schedule.api_base cannot be a base URL: {}", self.api_base),
            })?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.sheet_id.as_str(), "values", last.as_str()]);
        Ok(url)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AgendaError::UpstreamError {
            service: "Google Sheets",
            status: status.as_u16(),
            body,
        })
    }

    fn cell_text(value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

#[async_trait]
impl ScheduleStore for GoogleSheetsStore {
    async fn load(&self) -> Result<Option<Schedule>> {
        let url = self.values_url("")?;
        tracing::debug!("Fetching sheet values from {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let range: ValueRange = Self::check(response).await?.json().await?;

        if range.values.is_empty() {
            return Ok(None);
        }

        let grid = range
            .values
            .iter()
            .map(|row| row.iter().map(Self::cell_text).collect())
            .collect();
        Ok(Some(Schedule::from_grid(grid)?))
    }

    async fn save(&self, schedule: &Schedule) -> Result<()> {
        let mut url = self.values_url("")?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let body = ValueRangeUpdate {
            range: &self.range,
            major_dimension: "ROWS",
            values: schedule.to_grid(),
        };

        let response = self
            .client
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;

        tracing::debug!("Wrote {} slots to sheet {}", schedule.len(), self.sheet_id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let url = self.values_url(":clear")?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn export(&self) -> Result<Option<Vec<u8>>> {
        match self.load().await? {
            Some(schedule) => Ok(Some(render_csv(&schedule.to_grid())?)),
            None => Ok(None),
        }
    }

    fn describe(&self) -> String {
        format!("google_sheets:{}", self.sheet_id)
    }
}

use crate::domain::phone;
use crate::utils::error::{AgendaError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

pub const REQUIRED_COLUMNS: [&str; 5] = ["clinica", "exame", "data", "horario", "disponivel"];
pub const COLUMNS: [&str; 8] = [
    "clinica",
    "exame",
    "data",
    "horario",
    "disponivel",
    "paciente",
    "telefone",
    "status_confirmacao",
];

pub const ELDERLY_AGE: u32 = 60;
pub const SLOT_DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Availability {
    Open,
    #[default]
    Taken,
}

impl Availability {
    /// Anything other than `SIM` counts as taken.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("SIM") {
            Self::Open
        } else {
            Self::Taken
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "SIM",
            Self::Taken => "NAO",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfirmationStatus {
    #[default]
    Unset,
    Pending,
    Confirmed,
    Cancelled,
    /// Text typed into the sheet by hand. Kept as is and treated as active.
    Other(String),
}

impl ConfirmationStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unset => "",
            Self::Pending => "PENDENTE",
            Self::Confirmed => "CONFIRMADO",
            Self::Cancelled => "CANCELADO",
            Self::Other(raw) => raw,
        }
    }

    /// Like `from_str`, but unknown text becomes `Other`.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse()
            .unwrap_or_else(|_| Self::Other(raw.trim().to_string()))
    }
}

impl FromStr for ConfirmationStatus {
    type Err = AgendaError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_uppercase().as_str() {
            "" => Ok(Self::Unset),
            "PENDENTE" => Ok(Self::Pending),
            "CONFIRMADO" => Ok(Self::Confirmed),
            "CANCELADO" => Ok(Self::Cancelled),
            other => Err(AgendaError::validation(format!(
                "Status de confirmação desconhecido: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One schedule row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Slot {
    pub clinic: String,
    pub exam: String,
    pub date: String,
    pub time: String,
    pub available: Availability,
    pub patient: String,
    pub phone: String,
    pub status: ConfirmationStatus,
    /// Cells of columns this service does not use, by normalized header name.
    pub extra: BTreeMap<String, String>,
}

impl Slot {
    pub fn key(&self) -> String {
        format!("{}|{}|{}|{}", self.clinic, self.exam, self.date, self.time)
    }

    pub fn is_booked(&self) -> bool {
        !self.patient.trim().is_empty()
    }

    /// Accepts `dd/mm/YYYY` and the ISO form spreadsheet tools export.
    pub fn appointment_date(&self) -> Option<NaiveDate> {
        let raw = self.date.trim();
        NaiveDate::parse_from_str(raw, SLOT_DATE_FORMAT).ok().or_else(|| {
            raw.get(..10)
                .and_then(|iso| NaiveDate::parse_from_str(iso, "%Y-%m-%d").ok())
        })
    }

    fn cell(&self, column: &str) -> String {
        match column {
            "clinica" => self.clinic.clone(),
            "exame" => self.exam.clone(),
            "data" => self.date.clone(),
            "horario" => self.time.clone(),
            "disponivel" => self.available.as_str().to_string(),
            "paciente" => self.patient.clone(),
            "telefone" => self.phone.clone(),
            "status_confirmacao" => self.status.as_str().to_string(),
            other => self.extra.get(other).cloned().unwrap_or_default(),
        }
    }
}

fn normalize(column: &str) -> String {
    column.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    #[serde(rename = "horarios_adicionados")]
    pub added: usize,
    #[serde(rename = "horarios_duplicados")]
    pub duplicates: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduleSummary {
    #[serde(rename = "carregado")]
    pub loaded: bool,
    #[serde(rename = "total_horarios")]
    pub total_slots: usize,
    #[serde(rename = "vagas_disponiveis")]
    pub open_slots: usize,
    #[serde(rename = "vagas_ocupadas")]
    pub taken_slots: usize,
}

impl ScheduleSummary {
    pub fn not_loaded() -> Self {
        Self {
            loaded: false,
            total_slots: 0,
            open_slots: 0,
            taken_slots: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SheetCounts {
    #[serde(rename = "agendados")]
    pub booked: usize,
    #[serde(rename = "confirmados")]
    pub confirmed: usize,
    #[serde(rename = "cancelados")]
    pub cancelled: usize,
}

/// Read-only view of a booked row, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookedSlot {
    pub id: usize,
    #[serde(rename = "paciente")]
    pub patient: String,
    #[serde(rename = "telefone")]
    pub phone: String,
    #[serde(rename = "exame")]
    pub exam: String,
    #[serde(rename = "clinica")]
    pub clinic: String,
    #[serde(rename = "data")]
    pub date: String,
    #[serde(rename = "horario")]
    pub time: String,
    pub status: String,
}

/// The schedule table. Row position is the row handle. `columns` is the
/// sheet's own header, so rows are written back in the layout they came in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schedule {
    pub columns: Vec<String>,
    pub slots: Vec<Slot>,
}

impl Schedule {
    pub fn new(slots: Vec<Slot>) -> Self {
        Self {
            columns: Vec::new(),
            slots,
        }
    }

    /// Builds a schedule from a stored sheet. Unknown status text is kept
    /// and logged so one odd cell never makes the sheet unreadable.
    pub fn from_grid(grid: Vec<Vec<String>>) -> Result<Self> {
        Self::parse(grid, false)
    }

    /// Builds a schedule from an operator upload, rejecting unknown status
    /// text with its row number.
    pub fn from_upload(grid: Vec<Vec<String>>) -> Result<Self> {
        Self::parse(grid, true)
    }

    fn parse(grid: Vec<Vec<String>>, strict: bool) -> Result<Self> {
        let mut rows = grid.into_iter();
        let header = match rows.next() {
            Some(header) => header,
            None => return Ok(Self::default()),
        };

        let index: HashMap<String, usize> = header
            .iter()
            .enumerate()
            .map(|(i, name)| (normalize(name), i))
            .collect();

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|col| !index.contains_key(*col))
            .collect();
        if !missing.is_empty() {
            return Err(AgendaError::validation(format!(
                "Planilha deve ter as colunas: {} (faltando: {})",
                REQUIRED_COLUMNS.join(", "),
                missing.join(", ")
            )));
        }

        let mut slots = Vec::new();
        for (offset, row) in rows.enumerate() {
            if row.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            let cell = |name: &str| -> String {
                index
                    .get(name)
                    .and_then(|i| row.get(*i))
                    .map(|v| v.trim().to_string())
                    .unwrap_or_default()
            };
            // header is row 1
            let line = offset + 2;
            let raw_status = cell("status_confirmacao");
            let status = if strict {
                raw_status.parse().map_err(|e: AgendaError| {
                    AgendaError::validation(format!("Linha {}: {}", line, e))
                })?
            } else {
                let status = ConfirmationStatus::parse_lenient(&raw_status);
                if let ConfirmationStatus::Other(raw) = &status {
                    tracing::warn!("Linha {}: status '{}' not recognized, kept as is", line, raw);
                }
                status
            };
            let extra = header
                .iter()
                .enumerate()
                .map(|(i, name)| (normalize(name), i))
                .filter(|(name, _)| !COLUMNS.contains(&name.as_str()))
                .map(|(name, i)| {
                    let value = row.get(i).map(|v| v.trim().to_string()).unwrap_or_default();
                    (name, value)
                })
                .collect();
            slots.push(Slot {
                clinic: cell("clinica"),
                exam: cell("exame"),
                date: cell("data"),
                time: cell("horario"),
                available: Availability::parse(&cell("disponivel")),
                patient: cell("paciente"),
                phone: cell("telefone"),
                status,
                extra,
            });
        }

        Ok(Self {
            columns: header.iter().map(|name| name.trim().to_string()).collect(),
            slots,
        })
    }

    /// The sheet's header followed by any of `COLUMNS` it lacks.
    pub fn layout(&self) -> Vec<String> {
        let mut layout = self.columns.clone();
        let present: HashSet<String> = layout.iter().map(|c| normalize(c)).collect();
        layout.extend(
            COLUMNS
                .iter()
                .filter(|c| !present.contains(**c))
                .map(|c| c.to_string()),
        );
        layout
    }

    pub fn to_grid(&self) -> Vec<Vec<String>> {
        let layout = self.layout();
        let keys: Vec<String> = layout.iter().map(|c| normalize(c)).collect();
        let mut grid = Vec::with_capacity(self.slots.len() + 1);
        grid.push(layout);
        grid.extend(
            self.slots
                .iter()
                .map(|slot| keys.iter().map(|k| slot.cell(k)).collect()),
        );
        grid
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn find_open(&self, exam: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.exam == exam && s.available == Availability::Open)
    }

    pub fn find_by_phone(&self, phone_number: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.is_booked() && phone::matches(&s.phone, phone_number))
    }

    pub fn reserve(&mut self, idx: usize, patient: &str, phone_number: &str) -> Option<&Slot> {
        let slot = self.slots.get_mut(idx)?;
        slot.available = Availability::Taken;
        slot.patient = patient.to_string();
        slot.phone = phone_number.to_string();
        slot.status = ConfirmationStatus::Pending;
        Some(slot)
    }

    pub fn set_status(&mut self, idx: usize, status: ConfirmationStatus) -> Option<&Slot> {
        let slot = self.slots.get_mut(idx)?;
        slot.status = status;
        Some(slot)
    }

    pub fn release(&mut self, idx: usize) -> Option<&Slot> {
        let slot = self.slots.get_mut(idx)?;
        slot.available = Availability::Open;
        slot.patient.clear();
        slot.phone.clear();
        slot.status = ConfirmationStatus::Cancelled;
        Some(slot)
    }

    /// Appends incoming slots whose key is new. Duplicates inside the
    /// incoming sheet keep their first occurrence.
    pub fn merge(&mut self, incoming: Schedule) -> MergeOutcome {
        let mut known: HashSet<String> = self.columns.iter().map(|c| normalize(c)).collect();
        for column in incoming.columns {
            if known.insert(normalize(&column)) {
                self.columns.push(column);
            }
        }

        let existing: HashSet<String> = self.slots.iter().map(Slot::key).collect();
        let mut seen = HashSet::new();
        let mut outcome = MergeOutcome {
            added: 0,
            duplicates: 0,
        };

        for slot in incoming.slots {
            let key = slot.key();
            if !seen.insert(key.clone()) || existing.contains(&key) {
                outcome.duplicates += 1;
                continue;
            }
            self.slots.push(slot);
            outcome.added += 1;
        }

        outcome
    }

    pub fn summary(&self) -> ScheduleSummary {
        let open = self
            .slots
            .iter()
            .filter(|s| s.available == Availability::Open)
            .count();
        ScheduleSummary {
            loaded: true,
            total_slots: self.slots.len(),
            open_slots: open,
            taken_slots: self.slots.len() - open,
        }
    }

    pub fn counts(&self) -> SheetCounts {
        self.slots.iter().fold(SheetCounts::default(), |mut acc, s| {
            if s.is_booked() {
                acc.booked += 1;
            }
            match s.status {
                ConfirmationStatus::Confirmed => acc.confirmed += 1,
                ConfirmationStatus::Cancelled => acc.cancelled += 1,
                _ => {}
            }
            acc
        })
    }

    pub fn booked(&self) -> Vec<BookedSlot> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_booked())
            .map(|(idx, s)| BookedSlot {
                id: idx + 1,
                patient: s.patient.clone(),
                phone: s.phone.clone(),
                exam: s.exam.clone(),
                clinic: s.clinic.clone(),
                date: s.date.clone(),
                time: s.time.clone(),
                status: match &s.status {
                    ConfirmationStatus::Unset => "pendente".to_string(),
                    other => other.as_str().to_lowercase(),
                },
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentStatus {
    #[serde(rename = "pendente")]
    Pending,
    #[serde(rename = "confirmado")]
    Confirmed,
    #[serde(rename = "cancelado")]
    Cancelled,
}

/// A booking made through this process. Kept in memory only.
#[derive(Debug, Clone, Serialize)]
pub struct Appointment {
    pub id: u64,
    #[serde(rename = "paciente")]
    pub patient: String,
    #[serde(rename = "telefone")]
    pub phone: String,
    #[serde(rename = "idade")]
    pub age: u32,
    #[serde(rename = "data_nascimento")]
    pub birth_date: String,
    #[serde(rename = "exame")]
    pub exam: String,
    #[serde(rename = "clinica")]
    pub clinic: String,
    #[serde(rename = "data")]
    pub date: String,
    #[serde(rename = "horario")]
    pub time: String,
    pub status: AppointmentStatus,
    #[serde(rename = "data_agendamento")]
    pub booked_at: String,
    #[serde(rename = "lembretes_enviados")]
    pub reminders_sent: Vec<String>,
    pub audio_url: Option<String>,
    /// Key of the reserved schedule row.
    #[serde(skip)]
    pub slot_key: String,
}

impl Appointment {
    pub fn is_elderly(&self) -> bool {
        self.age >= ELDERLY_AGE
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: u64,
    #[serde(rename = "tipo")]
    pub kind: String,
    #[serde(rename = "mensagem")]
    pub message: String,
    #[serde(rename = "horario")]
    pub time: String,
    #[serde(rename = "data")]
    pub date: String,
    #[serde(rename = "horario_vaga")]
    pub slot_time: String,
    #[serde(rename = "exame")]
    pub exam: String,
    #[serde(rename = "clinica")]
    pub clinic: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Metrics {
    #[serde(rename = "agendados")]
    pub booked: u64,
    #[serde(rename = "confirmados")]
    pub confirmed: u64,
    #[serde(rename = "cancelados")]
    pub cancelled: u64,
    #[serde(rename = "lembretes_enviados")]
    pub reminders_sent: u64,
    #[serde(rename = "taxa_confirmacao")]
    pub confirmation_rate: f64,
}

impl Metrics {
    /// Confirmation percentage with one decimal.
    pub fn with_rate(mut self) -> Self {
        self.confirmation_rate = if self.booked > 0 {
            let rate = self.confirmed as f64 / self.booked as f64 * 100.0;
            (rate * 10.0).round() / 10.0
        } else {
            0.0
        };
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Confirm,
    Cancel,
    Unknown,
}

impl Reply {
    /// Free-text parse used by the operator and simulator endpoints.
    pub fn parse(text: &str) -> Self {
        let text = text.trim().to_lowercase();
        let first = text.split_whitespace().next().unwrap_or("");
        match first.trim_matches(|c: char| !c.is_alphanumeric()) {
            "1" | "sim" | "confirmo" | "confirmar" => Self::Confirm,
            "2" | "não" | "nao" | "cancelo" | "cancelar" => Self::Cancel,
            _ => Self::Unknown,
        }
    }

    /// Only the bare digits count on the WhatsApp channel.
    pub fn parse_strict(text: &str) -> Self {
        match text.trim() {
            "1" => Self::Confirm,
            "2" => Self::Cancel,
            _ => Self::Unknown,
        }
    }
}

pub fn age_on(birth: NaiveDate, today: NaiveDate) -> u32 {
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

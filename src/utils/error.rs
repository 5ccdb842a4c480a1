use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgendaError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Schedule not loaded")]
    ScheduleNotLoaded,

    #[error("No open slot for {exam}")]
    NoOpenSlot { exam: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("{service} returned HTTP {status}: {body}")]
    UpstreamError {
        service: &'static str,
        status: u16,
        body: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Storage,
    Configuration,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AgendaError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ApiError(_) | Self::UpstreamError { .. } => ErrorCategory::Network,
            Self::CsvError(_) | Self::IoError(_) | Self::SerializationError(_) => {
                ErrorCategory::Storage
            }
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            Self::ValidationError { .. }
            | Self::ScheduleNotLoaded
            | Self::NoOpenSlot { .. }
            | Self::NotFound { .. } => ErrorCategory::Input,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Input => ErrorSeverity::Low,
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Storage => ErrorSeverity::High,
            ErrorCategory::Configuration => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::ApiError(_) | Self::UpstreamError { .. } => {
                "Check network access and the provider credentials"
            }
            Self::CsvError(_) => "Check that the schedule file is valid CSV with a header row",
            Self::IoError(_) => "Check that the schedule file is not open in another program",
            Self::SerializationError(_) => "Check the payload format",
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. } => "Review the configuration file and environment",
            Self::ValidationError { .. } => "Fill in every required field",
            Self::ScheduleNotLoaded => "Upload the schedule spreadsheet first",
            Self::NoOpenSlot { .. } => "Upload more slots or try another exam",
            Self::NotFound { .. } => "Check the identifier",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::ScheduleNotLoaded => "Carregue a planilha de horários primeiro!".to_string(),
            Self::NoOpenSlot { exam } => {
                format!("Sem vagas disponíveis para {} no momento.", exam)
            }
            Self::ValidationError { message } | Self::NotFound { message } => message.clone(),
            Self::IoError(_) => {
                "Erro ao salvar planilha. Feche o arquivo e tente novamente.".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgendaError>;

use crate::domain::model::Schedule;
use crate::domain::ports::ScheduleStore;
use crate::utils::error::{AgendaError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

const UTF8_BOM: char = '\u{feff}';

/// Parses CSV bytes into rows of trimmed cells. Ragged rows are allowed.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record?;
        grid.push(record.iter().map(|cell| cell.trim().to_string()).collect::<Vec<_>>());
    }

    // Spreadsheet exports often start with a BOM
    if let Some(first) = grid.first_mut().and_then(|header| header.first_mut()) {
        *first = first.trim_start_matches(UTF8_BOM).to_string();
    }

    Ok(grid)
}

pub fn render_csv(grid: &[Vec<String>]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in grid {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| AgendaError::IoError(e.into_error()))
}

/// Schedule kept in a local CSV file. A missing file means nothing is loaded.
#[derive(Debug, Clone)]
pub struct CsvScheduleStore {
    path: PathBuf,
}

impl CsvScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ScheduleStore for CsvScheduleStore {
    async fn load(&self) -> Result<Option<Schedule>> {
        let Some(bytes) = self.read_bytes().await? else {
            return Ok(None);
        };
        let schedule = Schedule::from_grid(parse_csv(&bytes)?)?;
        tracing::debug!(
            "Loaded {} slots from {}",
            schedule.len(),
            self.path.display()
        );
        Ok(Some(schedule))
    }

    async fn save(&self, schedule: &Schedule) -> Result<()> {
        let data = render_csv(&schedule.to_grid())?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Write beside the target and rename so readers never see half a file
        let tmp_path = self.path.with_extension("csv.tmp");
        tokio::fs::write(&tmp_path, &data).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        tracing::debug!(
            "Saved {} slots ({} bytes) to {}",
            schedule.len(),
            data.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn export(&self) -> Result<Option<Vec<u8>>> {
        match self.load().await? {
            Some(schedule) => Ok(Some(render_csv(&schedule.to_grid())?)),
            None => Ok(None),
        }
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

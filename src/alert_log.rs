//! Local alert journal
//!
//! Every received alert is appended to `alerts_<YYYYMMDD>.log` inside the
//! configured directory, keyed by the local date at write time.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde_json::Value;
use thiserror::Error;
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};

#[derive(Debug, Error)]
pub enum AlertLogError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write alert entry: {0}")]
    Write(#[from] std::io::Error),
    #[error("failed to serialize alert payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

struct DailyFile {
    date: String,
    file: File,
}

pub struct AlertLog {
    dir: PathBuf,
    current: Mutex<Option<DailyFile>>,
}

impl AlertLog {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, AlertLogError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| AlertLogError::CreateDir {
                path: dir.clone(),
                source,
            })?;

        Ok(Self {
            dir,
            current: Mutex::new(None),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name_for(date: &DateTime<Local>) -> String {
        format!("alerts_{}.log", date.format("%Y%m%d"))
    }

    pub async fn record(&self, payload: &Value) -> Result<(), AlertLogError> {
        self.record_at(payload, Local::now()).await
    }

    pub async fn record_at(
        &self,
        payload: &Value,
        now: DateTime<Local>,
    ) -> Result<(), AlertLogError> {
        let full = serde_json::to_string_pretty(payload)?;
        let messages = [summarize(payload), format!("alert payload: {full}")];
        self.append(&messages, now).await
    }

    /// Marks a service start in the day's file, so restarts are visible
    /// between alerts.
    pub async fn record_startup(&self, mode: &str) -> Result<(), AlertLogError> {
        self.record_startup_at(mode, Local::now()).await
    }

    pub async fn record_startup_at(
        &self,
        mode: &str,
        now: DateTime<Local>,
    ) -> Result<(), AlertLogError> {
        let messages = [
            "=".repeat(50),
            "webhook alert receiver started".to_string(),
            format!("service mode: {mode}"),
        ];
        self.append(&messages, now).await
    }

    async fn append(&self, messages: &[String], now: DateTime<Local>) -> Result<(), AlertLogError> {
        let entry = format_entry(messages, &now);

        let mut current = self.current.lock().await;
        let date = now.format("%Y%m%d").to_string();
        if current.as_ref().map(|daily| daily.date.as_str()) != Some(date.as_str()) {
            let path = self.dir.join(Self::file_name_for(&now));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|source| AlertLogError::Open { path, source })?;
            *current = Some(DailyFile { date, file });
        }

        if let Some(daily) = current.as_mut() {
            daily.file.write_all(entry.as_bytes()).await?;
            daily.file.flush().await?;
        }
        Ok(())
    }
}

/// One-line digest of a Grafana-style payload. Present fields are shown
/// whatever their JSON type; defaults apply only to absent keys.
pub fn summarize(payload: &Value) -> String {
    let field = |name: &str, default: &str| match payload.get(name) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => default.to_string(),
    };
    let alert_count = match payload.get("alerts") {
        Some(Value::Array(items)) => items.len(),
        Some(Value::Object(fields)) => fields.len(),
        Some(Value::String(text)) => text.chars().count(),
        _ => 0,
    };

    format!(
        "alert received [receiver={}, status={}, count={}, title={}]",
        field("receiver", ""),
        field("status", "unknown"),
        alert_count,
        field("title", ""),
    )
}

fn format_entry(messages: &[String], now: &DateTime<Local>) -> String {
    let stamp = now.format("%Y-%m-%d %H:%M:%S");
    messages
        .iter()
        .map(|message| format!("{stamp} - INFO - {message}\n"))
        .collect()
}

//! Durable run ledger.
//!
//! Records are kept newest-first in a single JSON array. Every mutation is
//! written back immediately through a temporary file and a rename.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::HistoryError;

/// Lifecycle status of a run record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Success,
    Failed,
    Cancelled,
}

impl RecordStatus {
    /// Only `pending` records move, and only to a terminal status.
    pub fn can_transition(self, to: RecordStatus) -> bool {
        matches!(
            (self, to),
            (RecordStatus::Pending, RecordStatus::Success | RecordStatus::Failed)
        )
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStatus::Pending => write!(f, "pending"),
            RecordStatus::Success => write!(f, "success"),
            RecordStatus::Failed => write!(f, "failed"),
            RecordStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Channel that finally carried the note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PublishMethod {
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "mcp-relay")]
    McpRelay,
    #[serde(rename = "browser")]
    Browser,
}

impl fmt::Display for PublishMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishMethod::Auto => f.pad("auto"),
            PublishMethod::McpRelay => f.pad("mcp-relay"),
            PublishMethod::Browser => f.pad("browser"),
        }
    }
}

/// One ledger entry per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub timestamp: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub images: Vec<String>,
    pub status: RecordStatus,
    pub publish_method: PublishMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<String>,
    #[serde(default)]
    pub word_count: usize,
}

/// Note data copied into a new record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSnapshot {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub images: Vec<String>,
    pub scheduled_at: Option<DateTime<Local>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryStatistics {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub pending: usize,
    pub cancelled: usize,
    pub methods: BTreeMap<String, usize>,
    pub success_rate: String,
}

pub struct HistoryStore {
    path: PathBuf,
    records: Vec<HistoryRecord>,
}

impl HistoryStore {
    /// Opens the ledger at `path`, creating an empty one when missing.
    ///
    /// A file that exists but does not hold a record array is reported as
    /// [`HistoryError::Corrupted`] and left untouched.
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        let records = load(path)?;
        let store = Self {
            path: path.to_path_buf(),
            records,
        };
        if !path.exists() {
            store.save()?;
        }
        debug!(path = %path.display(), records = store.records.len(), "history loaded");
        Ok(store)
    }

    /// Rereads the file so a mutation applies on top of what other
    /// processes wrote since the last access.
    fn reload(&mut self) -> Result<(), HistoryError> {
        self.records = load(&self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Mints a record, inserts it at the head and persists.
    pub fn add_record(
        &mut self,
        snapshot: RecordSnapshot,
        status: RecordStatus,
        method: PublishMethod,
    ) -> Result<HistoryRecord, HistoryError> {
        self.add_record_with_message(snapshot, status, method, None)
    }

    /// [`add_record`](Self::add_record) for records born terminal, which
    /// carry their reason from the start.
    pub fn add_record_with_message(
        &mut self,
        snapshot: RecordSnapshot,
        status: RecordStatus,
        method: PublishMethod,
        message: Option<&str>,
    ) -> Result<HistoryRecord, HistoryError> {
        let now = Local::now();
        let word_count = snapshot.content.chars().filter(|c| !c.is_whitespace()).count();
        let record = HistoryRecord {
            id: mint_id(now),
            timestamp: now.to_rfc3339(),
            title: snapshot.title,
            content: snapshot.content,
            tags: snapshot.tags,
            images: snapshot.images,
            status,
            publish_method: method,
            status_message: message.map(str::to_string),
            updated_at: None,
            scheduled_at: snapshot.scheduled_at.map(|t| t.to_rfc3339()),
            word_count,
        };

        self.reload()?;
        self.records.insert(0, record.clone());
        self.save()?;
        info!(id = %record.id, %status, %method, "history record added");
        Ok(record)
    }

    /// Moves a record to `status`. Returns `false` when `id` is unknown.
    pub fn update_status(
        &mut self,
        id: &str,
        status: RecordStatus,
        message: Option<&str>,
    ) -> Result<bool, HistoryError> {
        self.update_outcome(id, status, None, message)
    }

    /// Like [`update_status`](Self::update_status), also replacing the
    /// publish method when one is given.
    pub fn update_outcome(
        &mut self,
        id: &str,
        status: RecordStatus,
        method: Option<PublishMethod>,
        message: Option<&str>,
    ) -> Result<bool, HistoryError> {
        self.reload()?;
        let Some(record) = self.records.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        if !record.status.can_transition(status) {
            return Err(HistoryError::InvalidTransition {
                id: id.to_string(),
                from: record.status,
                to: status,
            });
        }

        record.status = status;
        if let Some(method) = method {
            record.publish_method = method;
        }
        if let Some(message) = message {
            record.status_message = Some(message.to_string());
        }
        record.updated_at = Some(Local::now().to_rfc3339());
        self.save()?;
        info!(id, %status, "history record updated");
        Ok(true)
    }

    /// Newest-first, optionally filtered by status.
    pub fn get_records(&self, limit: usize, status: Option<RecordStatus>) -> Vec<HistoryRecord> {
        self.records
            .iter()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get_record(&self, id: &str) -> Option<&HistoryRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn statistics(&self) -> HistoryStatistics {
        let count = |status: RecordStatus| self.records.iter().filter(|r| r.status == status).count();
        let total = self.records.len();
        let success = count(RecordStatus::Success);

        let mut methods = BTreeMap::new();
        for record in &self.records {
            *methods.entry(record.publish_method.to_string()).or_insert(0) += 1;
        }

        let success_rate = if total == 0 {
            "0%".to_string()
        } else {
            format!("{:.1}%", success as f64 * 100.0 / total as f64)
        };

        HistoryStatistics {
            total,
            success,
            failed: count(RecordStatus::Failed),
            pending: count(RecordStatus::Pending),
            cancelled: count(RecordStatus::Cancelled),
            methods,
            success_rate,
        }
    }

    /// Drops records older than `days` days. Returns how many were removed.
    pub fn clear_old_records(&mut self, days: u32) -> Result<usize, HistoryError> {
        self.clear_older_than(days, Local::now())
    }

    /// Same as [`clear_old_records`](Self::clear_old_records) against a fixed
    /// `now`. Records whose timestamp does not parse are dropped.
    pub fn clear_older_than(&mut self, days: u32, now: DateTime<Local>) -> Result<usize, HistoryError> {
        self.reload()?;
        let cutoff = now - Duration::days(i64::from(days));
        let before = self.records.len();
        self.records
            .retain(|r| parse_timestamp(&r.timestamp).is_some_and(|t| t >= cutoff));
        let removed = before - self.records.len();
        if removed > 0 {
            self.save()?;
            info!(removed, days, "old history records cleared");
        }
        Ok(removed)
    }

    fn save(&self) -> Result<(), HistoryError> {
        let io_err = |source: std::io::Error| HistoryError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(&self.records).map_err(|source| HistoryError::Corrupted {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self
            .path
            .with_extension(format!("json.{}.tmp", std::process::id()));
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

fn load(path: &Path) -> Result<Vec<HistoryRecord>, HistoryError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path).map_err(|source| HistoryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw).map_err(|source| HistoryError::Corrupted {
        path: path.to_path_buf(),
        source,
    })
}

/// `record_<unix-secs>_<8 hex>`; the suffix keeps ids created in the same
/// second apart.
fn mint_id(now: DateTime<Local>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("record_{}_{}", now.timestamp(), &suffix[..8])
}

/// Accepts RFC 3339 and naive ISO timestamps (read as local time).
fn parse_timestamp(raw: &str) -> Option<DateTime<Local>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Local));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
}

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use lure_core::backend::error_excerpt;
use lure_core::config::setting_value;
use lure_core::db::Database;
use lure_core::models::{BackupId, CampaignBackup, QueuedSave, QueuedSaveId, SaveConflict};
use lure_core::save::QueueReason;
use lure_core::{Campaign, CampaignId, Connectivity, SaveConfig, SaveService};
use serde::Serialize;

use crate::backend::CliBackend;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

pub const PROFILE_ENV: &str = "LURE_PROFILE";
pub const API_URL_ENV: &str = "LURE_API_URL";
pub const API_TOKEN_ENV: &str = "LURE_API_TOKEN";
pub const DB_PATH_ENV: &str = "LURE_DB_PATH";

pub type CliService = SaveService<CliBackend>;

/// Settings every command runs with, after profile and env resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliContext {
    pub profile: String,
    pub db_path: PathBuf,
    pub api_base_url: Option<String>,
    pub api_token: Option<String>,
}

impl CliContext {
    pub fn resolve(cli_db_path: Option<PathBuf>, profile: Option<&str>) -> Result<Self, CliError> {
        let config = CliProfilesConfig::load().map_err(CliError::Config)?;
        Self::from_sources(&config, profile, cli_db_path, |key| env::var(key).ok())
    }

    /// Flags win over environment variables, which win over the stored profile.
    pub fn from_sources<F>(
        config: &CliProfilesConfig,
        explicit_profile: Option<&str>,
        cli_db_path: Option<PathBuf>,
        lookup: F,
    ) -> Result<Self, CliError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile =
            config.resolve_profile_name(explicit_profile, lookup(PROFILE_ENV).as_deref());
        let stored = config.profile(&profile).cloned().unwrap_or_default();

        let db_path = match cli_db_path
            .or_else(|| setting_value(lookup(DB_PATH_ENV)).map(PathBuf::from))
            .or_else(|| stored.db_path.clone())
        {
            Some(path) => path,
            None => default_db_path()?,
        };
        let api_base_url = setting_value(lookup(API_URL_ENV))
            .map(|url| url.trim_end_matches('/').to_string())
            .or_else(|| stored.api_base_url());

        Ok(Self {
            profile,
            db_path,
            api_base_url,
            api_token: setting_value(lookup(API_TOKEN_ENV)),
        })
    }
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("lure").join("lure.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

/// Open the save pipeline; `offline` keeps every save in the local queue
pub async fn open_service(context: &CliContext, offline: bool) -> Result<CliService, CliError> {
    if let Some(parent) = context.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let backend =
        CliBackend::from_settings(context.api_base_url.as_deref(), context.api_token.clone())?;
    if !offline && !backend.is_configured() {
        tracing::info!(
            "Profile '{}' has no API base URL; saves stay in the local queue",
            context.profile
        );
    }
    let online = !offline && backend.is_configured();

    let db = Database::open(&context.db_path).await?;
    let config = SaveConfig::from_env()?;
    Ok(SaveService::new(
        db,
        Arc::new(backend),
        Connectivity::new(online),
        config,
    ))
}

pub fn read_campaign_file(path: &Path) -> Result<Campaign, CliError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|error| CliError::CampaignFile {
        path: path.display().to_string(),
        message: error.to_string(),
    })
}

/// Pretty-print `value` to `output`, or stdout when omitted
pub fn write_json_output<T: Serialize>(value: &T, output: Option<&Path>) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    if let Some(path) = output {
        std::fs::write(path, format!("{rendered}\n"))?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }
    Ok(())
}

pub fn parse_campaign_id(value: &str) -> Result<CampaignId, CliError> {
    value.parse::<CampaignId>().map_err(|_| CliError::InvalidId {
        kind: "campaign",
        value: value.to_string(),
    })
}

pub fn parse_queued_save_id(value: &str) -> Result<QueuedSaveId, CliError> {
    value
        .trim()
        .parse::<QueuedSaveId>()
        .map_err(|_| CliError::InvalidId {
            kind: "queue entry",
            value: value.to_string(),
        })
}

pub fn parse_backup_id(value: &str) -> Result<BackupId, CliError> {
    value
        .trim()
        .parse::<BackupId>()
        .map_err(|_| CliError::InvalidId {
            kind: "backup",
            value: value.to_string(),
        })
}

pub fn describe_queue_reason(reason: &QueueReason) -> String {
    match reason {
        QueueReason::Offline => "offline".to_string(),
        QueueReason::Unreachable(error) => format!("server unreachable: {}", error_excerpt(error)),
    }
}

#[derive(Debug, Serialize)]
pub struct QueuedSaveItem {
    pub id: String,
    pub campaign_id: String,
    pub kind: &'static str,
    pub base_revision: u64,
    pub state: &'static str,
    pub retries: u32,
    pub created_at: i64,
    pub created_at_iso: String,
    pub next_attempt_at: i64,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BackupItem {
    pub id: String,
    pub campaign_id: String,
    pub name: String,
    pub revision: u64,
    pub created_at: i64,
    pub created_at_iso: String,
}

#[derive(Debug, Serialize)]
pub struct ConflictItem {
    pub id: i64,
    pub campaign_id: String,
    pub local_revision: u64,
    pub server_revision: u64,
    pub detected_at: i64,
    pub detected_at_iso: String,
    pub resolution: Option<&'static str>,
    pub resolved_at: Option<i64>,
}

pub fn queued_save_to_item(entry: &QueuedSave) -> QueuedSaveItem {
    QueuedSaveItem {
        id: entry.id.to_string(),
        campaign_id: entry.campaign_id.to_string(),
        kind: entry.payload.label(),
        base_revision: entry.base_revision,
        state: entry.state.as_str(),
        retries: entry.retries,
        created_at: entry.created_at,
        created_at_iso: format_timestamp(entry.created_at),
        next_attempt_at: entry.next_attempt_at,
        last_error: entry.last_error.clone(),
    }
}

pub fn backup_to_item(backup: &CampaignBackup) -> BackupItem {
    BackupItem {
        id: backup.id.to_string(),
        campaign_id: backup.campaign_id.to_string(),
        name: backup.name.clone(),
        revision: backup.campaign.revision,
        created_at: backup.created_at,
        created_at_iso: format_timestamp(backup.created_at),
    }
}

pub fn conflict_to_item(conflict: &SaveConflict) -> ConflictItem {
    ConflictItem {
        id: conflict.id,
        campaign_id: conflict.campaign_id.clone(),
        local_revision: conflict.local_revision,
        server_revision: conflict.server_revision,
        detected_at: conflict.detected_at,
        detected_at_iso: format_timestamp(conflict.detected_at),
        resolution: conflict.resolution.map(|resolution| resolution.as_str()),
        resolved_at: conflict.resolved_at,
    }
}

pub fn format_queue_lines(entries: &[QueuedSave], now_ms: i64) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let line = format!(
                "{:<13}  {:<13}  {:<8}  base={:<4}  retries={}  {}",
                short_id(&entry.id.to_string()),
                short_id(entry.campaign_id.as_str()),
                entry.payload.label(),
                entry.base_revision,
                entry.retries,
                format_relative_time(entry.created_at, now_ms)
            );
            match entry.last_error.as_deref() {
                Some(error) => format!("{line}  {}", error_excerpt(error)),
                None => line,
            }
        })
        .collect()
}

pub fn format_backup_lines(backups: &[CampaignBackup]) -> Vec<String> {
    backups
        .iter()
        .map(|backup| {
            format!(
                "{:<13}  rev={:<4}  {:<24}  {}",
                short_id(&backup.id.to_string()),
                backup.campaign.revision,
                backup.name,
                format_timestamp(backup.created_at)
            )
        })
        .collect()
}

pub fn format_conflict_lines(conflicts: &[SaveConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  campaign={}  local={} server={}  {}",
                format_timestamp(conflict.detected_at),
                conflict.campaign_id,
                conflict.local_revision,
                conflict.server_revision,
                conflict
                    .resolution
                    .map_or("open", |resolution| resolution.as_str())
            )
        })
        .collect()
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

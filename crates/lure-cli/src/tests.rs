use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::Parser;
use lure_core::models::{CampaignType, QueueEntryState, QueuedSave, QueuedSaveId, SavePayload};
use lure_core::save::DrainReport;
use lure_core::{BackendError, Campaign, CampaignBackend, ConflictResolution, SaveOutcome};
use serde_json::json;

use crate::backend::CliBackend;
use crate::cli::{Cli, Commands, CompletionShell, QueueCommands, ResolutionArg};
use crate::commands::common::{
    format_queue_lines, format_relative_time, format_timestamp, open_service, parse_backup_id,
    parse_queued_save_id, read_campaign_file, CliContext, API_TOKEN_ENV, API_URL_ENV, DB_PATH_ENV,
    PROFILE_ENV,
};
use crate::commands::completions::render_completions;
use crate::commands::config::format_context_lines;
use crate::commands::queue::format_drain_report;
use crate::commands::save::run_save;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

fn offline_context(dir: &Path) -> CliContext {
    CliContext {
        profile: "default".to_string(),
        db_path: dir.join("lure.db"),
        api_base_url: None,
        api_token: None,
    }
}

fn write_campaign(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join("campaign.json");
    let campaign = json!({
        "id": "c1",
        "name": name,
        "type": "quiz",
        "game_config": {"questions": [{"q": "2+2?", "a": 4}]}
    });
    std::fs::write(&path, campaign.to_string()).unwrap();
    path
}

#[test]
fn save_accepts_conflict_policy() {
    let cli = Cli::try_parse_from([
        "lure",
        "save",
        "campaign.json",
        "--offline",
        "--on-conflict",
        "overwrite",
    ])
    .unwrap();

    match cli.command {
        Commands::Save {
            file,
            offline,
            on_conflict,
        } => {
            assert_eq!(file, PathBuf::from("campaign.json"));
            assert!(offline);
            assert_eq!(on_conflict, Some(ResolutionArg::Overwrite));
        }
        _ => panic!("expected save command"),
    }
}

#[test]
fn global_flags_follow_subcommands() {
    let cli = Cli::try_parse_from(["lure", "queue", "list", "--json", "--db-path", "/tmp/x.db"])
        .unwrap();
    assert_eq!(cli.db_path, Some(PathBuf::from("/tmp/x.db")));
    assert!(matches!(
        cli.command,
        Commands::Queue {
            command: QueueCommands::List { json: true }
        }
    ));
}

#[test]
fn unknown_resolution_is_rejected() {
    assert!(Cli::try_parse_from(["lure", "resolve", "c1", "merge"]).is_err());
}

#[test]
fn resolution_args_map_to_core_resolutions() {
    assert_eq!(
        ConflictResolution::from(ResolutionArg::Reload),
        ConflictResolution::ReloadDiscardLocal
    );
    assert_eq!(
        ConflictResolution::from(ResolutionArg::Overwrite),
        ConflictResolution::ForceOverwrite
    );
    assert_eq!(
        ConflictResolution::from(ResolutionArg::Cancel),
        ConflictResolution::Cancel
    );
}

#[test]
fn context_prefers_flags_then_env_then_profile() {
    let mut config = CliProfilesConfig {
        version: 1,
        active_profile: Some("work".to_string()),
        profiles: BTreeMap::new(),
    };
    config.profiles.insert(
        "work".to_string(),
        CliProfile {
            api_base_url: Some("https://work.example.com".to_string()),
            db_path: Some(PathBuf::from("/data/work.db")),
        },
    );

    let no_env = |_: &str| None;
    let context = CliContext::from_sources(&config, None, None, no_env).unwrap();
    assert_eq!(context.profile, "work");
    assert_eq!(context.db_path, PathBuf::from("/data/work.db"));
    assert_eq!(
        context.api_base_url.as_deref(),
        Some("https://work.example.com")
    );
    assert_eq!(context.api_token, None);

    let env = |key: &str| match key {
        API_URL_ENV => Some("https://env.example.com/".to_string()),
        DB_PATH_ENV => Some("/env/lure.db".to_string()),
        API_TOKEN_ENV => Some(" secret ".to_string()),
        _ => None,
    };
    let context = CliContext::from_sources(&config, None, None, env).unwrap();
    assert_eq!(context.db_path, PathBuf::from("/env/lure.db"));
    assert_eq!(
        context.api_base_url.as_deref(),
        Some("https://env.example.com")
    );
    assert_eq!(context.api_token.as_deref(), Some("secret"));

    let context =
        CliContext::from_sources(&config, None, Some(PathBuf::from("/flag.db")), env).unwrap();
    assert_eq!(context.db_path, PathBuf::from("/flag.db"));
}

#[test]
fn context_reads_profile_from_env() {
    let mut config = CliProfilesConfig::default();
    config.profiles.insert(
        "staging".to_string(),
        CliProfile {
            api_base_url: Some("https://staging.example.com".to_string()),
            db_path: Some(PathBuf::from("/data/staging.db")),
        },
    );

    let env = |key: &str| (key == PROFILE_ENV).then(|| "staging".to_string());
    let context = CliContext::from_sources(&config, None, None, env).unwrap();
    assert_eq!(context.profile, "staging");
    assert_eq!(context.db_path, PathBuf::from("/data/staging.db"));

    let context =
        CliContext::from_sources(&config, Some("other"), Some(PathBuf::from("/flag.db")), env)
            .unwrap();
    assert_eq!(context.profile, "other");
    assert_eq!(context.api_base_url, None);
}

#[test]
fn invalid_ids_are_reported_by_kind() {
    let error = parse_queued_save_id("not-a-uuid").unwrap_err();
    assert!(matches!(
        error,
        CliError::InvalidId {
            kind: "queue entry",
            ..
        }
    ));
    assert!(parse_backup_id(" ").is_err());
    assert!(parse_queued_save_id(&QueuedSaveId::new().to_string()).is_ok());
}

#[test]
fn malformed_campaign_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{\"name\": \"no id\"}").unwrap();

    let error = read_campaign_file(&path).unwrap_err();
    match error {
        CliError::CampaignFile { path: reported, .. } => {
            assert!(reported.ends_with("broken.json"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60_000, now), "3d ago");
}

#[test]
fn format_timestamp_returns_utc_label() {
    assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn queue_lines_include_kind_base_and_error() {
    let mut campaign = Campaign::new("Spring quiz", CampaignType::Quiz);
    campaign.id = "c1".parse().unwrap();
    let entry = QueuedSave {
        id: QueuedSaveId::new(),
        campaign_id: campaign.id.clone(),
        payload: SavePayload::Snapshot { campaign },
        base_revision: 4,
        created_at: 0,
        retries: 2,
        next_attempt_at: 0,
        last_error: Some("backend unreachable: timeout".to_string()),
        state: QueueEntryState::Pending,
    };

    let lines = format_queue_lines(&[entry], 120_000);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("snapshot"));
    assert!(lines[0].contains("base=4"));
    assert!(lines[0].contains("retries=2"));
    assert!(lines[0].contains("2m ago"));
    assert!(lines[0].ends_with("backend unreachable: timeout"));
}

#[test]
fn drain_report_lists_only_nonzero_counters() {
    let report = DrainReport {
        flushed: 2,
        retried: 1,
        remaining: 1,
        ..DrainReport::default()
    };
    assert_eq!(format_drain_report(&report), "2 flushed, 1 retrying; 1 remaining");

    let offline = DrainReport {
        skipped_offline: true,
        remaining: 3,
        ..DrainReport::default()
    };
    assert_eq!(
        format_drain_report(&offline),
        "Offline; 3 save(s) left in the queue"
    );
}

#[test]
fn config_show_hides_token_value() {
    let context = CliContext {
        profile: "default".to_string(),
        db_path: PathBuf::from("/data/lure.db"),
        api_base_url: None,
        api_token: Some("secret".to_string()),
    };
    let rendered = format_context_lines(&context, "/config/cli-config.json").join("\n");
    assert!(rendered.contains("(not set)"));
    assert!(rendered.contains(API_TOKEN_ENV));
    assert!(!rendered.contains("secret"));
}

#[test]
fn completions_use_binary_name() {
    let script = String::from_utf8(render_completions(CompletionShell::Bash)).unwrap();
    assert!(script.contains("lure"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unconfigured_backend_reports_network_errors() {
    let backend = CliBackend::from_settings(None, None).unwrap();
    assert!(!backend.is_configured());

    let error = backend.read(&"c1".parse().unwrap()).await.unwrap_err();
    assert!(matches!(error, BackendError::Network(_)));
    assert!(CliBackend::from_settings(Some("ftp://example.com"), None).is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_save_lands_in_durable_queue() {
    let dir = tempfile::tempdir().unwrap();
    let context = offline_context(dir.path());
    let file = write_campaign(dir.path(), "Spring quiz");

    run_save(&file, true, None, &context).await.unwrap();

    let service = open_service(&context, true).await.unwrap();
    let pending = service.pending_saves().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].campaign_id.as_str(), "c1");

    let draft = service
        .draft(&"c1".parse().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(draft.campaign.name, "Spring quiz");
}

#[tokio::test(flavor = "multi_thread")]
async fn save_without_api_url_queues_and_drain_keeps_it() {
    let dir = tempfile::tempdir().unwrap();
    let context = offline_context(dir.path());
    let campaign = read_campaign_file(&write_campaign(dir.path(), "Wheel of fortune")).unwrap();

    let service = open_service(&context, false).await.unwrap();
    let outcome = service.save(&campaign).await.unwrap();
    assert!(matches!(outcome, SaveOutcome::Queued { .. }));

    let report = service.flush_queue().await.unwrap();
    assert!(report.skipped_offline);
    assert_eq!(report.remaining, 1);
}

use std::path::Path;

use lure_core::compression::compress_json;
use lure_core::diff::create_diff;
use lure_core::{SaveConfig, SaveOutcome};

use crate::cli::ResolutionArg;
use crate::commands::common::{
    describe_queue_reason, open_service, parse_campaign_id, read_campaign_file, write_json_output,
    CliContext,
};
use crate::commands::conflicts::report_resolution;
use crate::error::CliError;

pub async fn run_save(
    file: &Path,
    offline: bool,
    on_conflict: Option<ResolutionArg>,
    context: &CliContext,
) -> Result<(), CliError> {
    let campaign = read_campaign_file(file)?;
    let service = open_service(context, offline).await?;

    match service.save(&campaign).await? {
        SaveOutcome::NoChanges => {
            println!("No changes to save for campaign {}", campaign.id);
        }
        SaveOutcome::Saved {
            revision,
            sent_diff,
        } => {
            let kind = if sent_diff { "diff" } else { "snapshot" };
            println!(
                "Saved campaign {} at revision {revision} ({kind})",
                campaign.id
            );
        }
        SaveOutcome::Queued { entry_id, reason } => {
            println!(
                "Queued save {entry_id} of campaign {} ({})",
                campaign.id,
                describe_queue_reason(&reason)
            );
        }
        SaveOutcome::Conflicted {
            local_revision,
            server_revision,
        } => {
            let Some(resolution) = on_conflict else {
                return Err(CliError::Conflicted {
                    campaign_id: campaign.id.to_string(),
                    local_revision,
                    server_revision,
                });
            };
            let outcome = service
                .resolve_conflict(&campaign.id, resolution.into(), Some(&campaign))
                .await?;
            // A reload replaces the file with the server copy.
            report_resolution(&campaign.id, outcome, Some(file))?;
        }
    }

    Ok(())
}

pub async fn run_pull(
    campaign_id: &str,
    output: Option<&Path>,
    context: &CliContext,
) -> Result<(), CliError> {
    let campaign_id = parse_campaign_id(campaign_id)?;
    let service = open_service(context, false).await?;
    let campaign = service.pull(&campaign_id).await?;
    write_json_output(&campaign, output)
}

pub fn run_diff(old: &Path, new: &Path) -> Result<(), CliError> {
    let before = read_campaign_file(old)?;
    let after = read_campaign_file(new)?;

    let Some(diff) = create_diff(&before, &after)? else {
        println!("No changes");
        return Ok(());
    };

    let threshold = SaveConfig::from_env()?.compression_threshold;
    let stored = compress_json(&diff.patch, threshold)?;
    println!(
        "{} operation(s) against revision {}, {} bytes{}",
        diff.operation_count(),
        diff.base_revision,
        diff.patch_size,
        if stored.is_compressed() {
            format!(" ({} bytes compressed)", stored.compressed_size)
        } else {
            String::new()
        }
    );
    write_json_output(&diff.patch, None)
}

use std::path::Path;

use lure_core::save::ResolutionOutcome;
use lure_core::CampaignId;

use crate::cli::ResolutionArg;
use crate::commands::common::{
    conflict_to_item, format_conflict_lines, open_service, parse_campaign_id, write_json_output,
    CliContext,
};
use crate::error::CliError;

pub async fn run_conflicts(limit: usize, json: bool, context: &CliContext) -> Result<(), CliError> {
    let service = open_service(context, true).await?;
    let conflicts = service.conflicts(limit).await?;

    if json {
        let items = conflicts.iter().map(conflict_to_item).collect::<Vec<_>>();
        return write_json_output(&items, None);
    }

    if conflicts.is_empty() {
        println!("No conflicts recorded");
        return Ok(());
    }
    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_resolve(
    campaign_id: &str,
    resolution: ResolutionArg,
    context: &CliContext,
) -> Result<(), CliError> {
    let campaign_id = parse_campaign_id(campaign_id)?;
    let service = open_service(context, false).await?;
    let outcome = service
        .resolve_conflict(&campaign_id, resolution.into(), None)
        .await?;
    report_resolution(&campaign_id, outcome, None)
}

/// Print a resolution outcome; a reloaded campaign is written to `output`
pub fn report_resolution(
    campaign_id: &CampaignId,
    outcome: ResolutionOutcome,
    output: Option<&Path>,
) -> Result<(), CliError> {
    match outcome {
        ResolutionOutcome::Reloaded { campaign } => {
            println!(
                "Reloaded campaign {campaign_id} at server revision {}",
                campaign.revision
            );
            if let Some(path) = output {
                write_json_output(&campaign, Some(path))?;
            }
        }
        ResolutionOutcome::Overwritten { revision } => {
            println!("Overwrote campaign {campaign_id} at revision {revision}");
        }
        ResolutionOutcome::StillConflicted {
            local_revision,
            server_revision,
        } => {
            println!(
                "Campaign {campaign_id} is still conflicted (local revision {local_revision}, server revision {server_revision})"
            );
        }
        ResolutionOutcome::NothingToResolve => {
            println!("Campaign {campaign_id} has no open conflict");
        }
    }
    Ok(())
}

use crate::cli::DraftCommands;
use crate::commands::common::{
    format_timestamp, open_service, parse_campaign_id, write_json_output, CliContext,
};
use crate::error::CliError;

pub async fn run_draft(command: DraftCommands, context: &CliContext) -> Result<(), CliError> {
    match command {
        DraftCommands::Show { campaign_id } => {
            let campaign_id = parse_campaign_id(&campaign_id)?;
            let service = open_service(context, true).await?;
            match service.draft(&campaign_id).await? {
                Some(draft) => {
                    tracing::debug!(
                        "Draft of campaign {} saved {}",
                        campaign_id,
                        format_timestamp(draft.saved_at)
                    );
                    write_json_output(&draft.campaign, None)
                }
                None => {
                    println!("No draft for campaign {campaign_id}");
                    Ok(())
                }
            }
        }
        DraftCommands::Clear { campaign_id } => {
            let campaign_id = parse_campaign_id(&campaign_id)?;
            let service = open_service(context, true).await?;
            if service.clear_draft(&campaign_id).await? {
                println!("Cleared draft of campaign {campaign_id}");
            } else {
                println!("No draft for campaign {campaign_id}");
            }
            Ok(())
        }
    }
}

use crate::cli::BackupCommands;
use crate::commands::common::{
    backup_to_item, format_backup_lines, open_service, parse_backup_id, parse_campaign_id,
    read_campaign_file, write_json_output, CliContext,
};
use crate::error::CliError;

pub async fn run_backup(command: BackupCommands, context: &CliContext) -> Result<(), CliError> {
    let service = open_service(context, true).await?;

    match command {
        BackupCommands::Create { file, name } => {
            let name = name.trim();
            if name.is_empty() {
                return Err(CliError::Config("backup name cannot be empty".to_string()));
            }
            let campaign = read_campaign_file(&file)?;
            let backup = service.create_backup(&campaign, name).await?;
            println!(
                "Created backup {} of campaign {} at revision {}",
                backup.id, backup.campaign_id, backup.campaign.revision
            );
        }
        BackupCommands::List { campaign_id, json } => {
            let campaign_id = parse_campaign_id(&campaign_id)?;
            let backups = service.list_backups(&campaign_id).await?;
            if json {
                let items = backups.iter().map(backup_to_item).collect::<Vec<_>>();
                return write_json_output(&items, None);
            }
            if backups.is_empty() {
                println!("No backups for campaign {campaign_id}");
            }
            for line in format_backup_lines(&backups) {
                println!("{line}");
            }
        }
        BackupCommands::Restore { id, output } => {
            let id = parse_backup_id(&id)?;
            let campaign = service.restore_backup(&id).await?;
            write_json_output(&campaign, output.as_deref())?;
        }
        BackupCommands::Delete { id } => {
            let id = parse_backup_id(&id)?;
            service.delete_backup(&id).await?;
            println!("Deleted backup {id}");
        }
    }

    Ok(())
}

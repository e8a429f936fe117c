use lure_core::save::DrainReport;

use crate::cli::QueueCommands;
use crate::commands::common::{
    format_queue_lines, now_ms, open_service, parse_queued_save_id, queued_save_to_item,
    write_json_output, CliContext,
};
use crate::error::CliError;

pub async fn run_queue(command: QueueCommands, context: &CliContext) -> Result<(), CliError> {
    match command {
        QueueCommands::List { json } => {
            let service = open_service(context, true).await?;
            let entries = service.pending_saves().await?;
            print_entries(&entries, json, "No pending saves")
        }
        QueueCommands::Failed { json } => {
            let service = open_service(context, true).await?;
            let entries = service.failed_saves().await?;
            print_entries(&entries, json, "No failed saves")
        }
        QueueCommands::Drain => {
            let service = open_service(context, false).await?;
            let report = service.flush_queue().await?;
            println!("{}", format_drain_report(&report));
            Ok(())
        }
        QueueCommands::Retry { id } => {
            let id = parse_queued_save_id(&id)?;
            let service = open_service(context, true).await?;
            service.retry_failed(&id).await?;
            println!("Requeued save {id}");
            Ok(())
        }
        QueueCommands::Discard { id } => {
            let id = parse_queued_save_id(&id)?;
            let service = open_service(context, true).await?;
            service.discard_save(&id).await?;
            println!("Discarded save {id}");
            Ok(())
        }
    }
}

fn print_entries(
    entries: &[lure_core::models::QueuedSave],
    json: bool,
    empty_message: &str,
) -> Result<(), CliError> {
    if json {
        let items = entries.iter().map(queued_save_to_item).collect::<Vec<_>>();
        return write_json_output(&items, None);
    }

    if entries.is_empty() {
        println!("{empty_message}");
        return Ok(());
    }
    for line in format_queue_lines(entries, now_ms()) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_drain_report(report: &DrainReport) -> String {
    if report.skipped_offline {
        return format!(
            "Offline; {} save(s) left in the queue",
            report.remaining
        );
    }

    let mut parts = vec![format!("{} flushed", report.flushed)];
    for (count, label) in [
        (report.retried, "retrying"),
        (report.dead_lettered, "failed"),
        (report.conflicts, "conflicted"),
        (report.blocked, "blocked by conflicts"),
        (report.deferred, "backing off"),
    ] {
        if count > 0 {
            parts.push(format!("{count} {label}"));
        }
    }
    format!("{}; {} remaining", parts.join(", "), report.remaining)
}

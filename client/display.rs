use chrono::{Local, TimeZone};
use comfy_table::presets::UTF8_HORIZONTAL_ONLY;
use comfy_table::{ContentArrangement, Table};

use pushq_lib::network::feedback::FeedbackEntry;
use pushq_lib::report::{AttemptRecord, Summary};

pub fn print_summary(summary: &Summary) {
    println!(
        "{} messages queued, {} notifications: {} sent, {} failed",
        summary.queued_messages,
        summary.total_notifications,
        summary.sent_notifications,
        summary.failed_notifications
    );
}

/// Print the per-recipient error report in a nicely formatted table.
pub fn print_report<'a, I: Iterator<Item = &'a AttemptRecord>>(records: I) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Message", "Recipient", "Attempts", "Errors"]);

    for record in records {
        let errors = record
            .errors
            .iter()
            .map(|error| match error.status {
                Some(status) => format!("[{status}] {}", error.description),
                None => error.description.clone(),
            })
            .collect::<Vec<String>>()
            .join("\n");

        table.add_row(vec![
            format!("{:016x}", record.message_id),
            short_token(&record.recipient),
            record.attempts.to_string(),
            errors,
        ]);
    }

    println!("{table}");
}

/// Print the feedback service's stale-token report.
pub fn print_feedback(entries: &[FeedbackEntry]) {
    if entries.is_empty() {
        println!("The feedback service reported no stale tokens.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Last failure", "Device token"]);

    for entry in entries {
        table.add_row(vec![format_timestamp(entry.timestamp), entry.token.clone()]);
    }

    println!("{table}");
}

/// Device tokens are 64 characters long, which blows up any table.
/// Show the first and last few characters instead.
fn short_token(token: &str) -> String {
    if token.len() <= 16 {
        return token.to_string();
    }
    format!("{}…{}", &token[..8], &token[token.len() - 8..])
}

fn format_timestamp(timestamp: u32) -> String {
    match Local.timestamp_opt(timestamp as i64, 0) {
        chrono::LocalResult::Single(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => timestamp.to_string(),
    }
}

use std::path::Path;

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use serde::Serialize;

use chatmirror_export::read_header;

use crate::ui;

#[derive(Serialize)]
struct Status {
    path: String,
    exists: bool,
    topic: Option<String>,
    chat_type: Option<String>,
    source: Option<String>,
    total_messages: Option<usize>,
    created: Option<String>,
    last_sync: Option<String>,
}

pub async fn run(path: &Path, json: bool) -> Result<()> {
    let header = read_header(path).with_context(|| format!("Could not read export {}", path.display()))?;
    let instant = |t: chrono::DateTime<chrono::Utc>| t.to_rfc3339_opts(SecondsFormat::Millis, true);

    if json {
        let status = Status {
            path: path.display().to_string(),
            exists: header.is_some(),
            topic: header.as_ref().map(|h| h.topic.clone()),
            chat_type: header.as_ref().map(|h| h.chat_type.clone()),
            source: header.as_ref().map(|h| h.source.clone()),
            total_messages: header.as_ref().map(|h| h.total_message_count),
            created: header.as_ref().and_then(|h| h.created_at).map(instant),
            last_sync: header.as_ref().and_then(|h| h.last_sync_at).map(instant),
        };
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let Some(header) = header else {
        ui::info(&format!("{} does not exist yet; the next export will create it.", path.display()));
        return Ok(());
    };

    println!();
    ui::field("Export", &path.display().to_string());
    ui::field("Topic", &header.topic);
    ui::field("Chat type", &header.chat_type);
    ui::field("Source", &header.source);
    ui::field("Messages", &header.total_message_count.to_string());
    ui::field("Created", &header.created_at.map(instant).unwrap_or_else(|| "unknown".to_string()));
    match header.last_sync_at {
        Some(t) => ui::field("Last sync", &instant(t)),
        None => {
            ui::field("Last sync", "unknown");
            ui::warn("No usable Last Sync; the next export will do a full refresh");
        }
    }
    println!();

    Ok(())
}

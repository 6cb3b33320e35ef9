use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use chatmirror_core::{conversation_info_or_fallback, Credential, GraphSource, SourceRef};
use chatmirror_export::{default_export_path, sync_conversation, SyncOptions, SyncOutcome};

use crate::config::{Config, ACCESS_TOKEN_ENV};
use crate::ui;

/// Where the conversation comes from, as given on the command line.
pub struct SourceArgs {
    pub source: Option<String>,
    pub chat: Option<String>,
    pub team: Option<String>,
    pub channel: Option<String>,
}

impl SourceArgs {
    fn resolve(self) -> Result<SourceRef> {
        if let Some(raw) = self.source {
            return SourceRef::parse(&raw).ok_or_else(|| {
                anyhow!("Unrecognized source {:?}; expected chat:<id> or channel:<team>/<channel>", raw)
            });
        }
        match (self.chat, self.team, self.channel) {
            (Some(chat), None, None) => Ok(SourceRef::chat(chat)),
            (None, Some(team), Some(channel)) => Ok(SourceRef::channel(team, channel)),
            (None, None, None) => bail!("Specify a source: chat:<id>, --chat <id>, or --team <id> --channel <id>"),
            _ => bail!("Use either --chat, or --team together with --channel"),
        }
    }
}

pub struct ExportArgs {
    pub source: SourceArgs,
    pub output: Option<PathBuf>,
    pub limit: Option<usize>,
    pub full: bool,
}

pub async fn run(config: &Config, args: ExportArgs) -> Result<()> {
    let source_ref = args.source.resolve()?;

    let credential = Credential::from_env(ACCESS_TOKEN_ENV, config.remote.auth_mode)
        .ok_or_else(|| anyhow!("{} is not set; export a bearer token for the remote API", ACCESS_TOKEN_ENV))?;
    let source = GraphSource::new(
        config.remote.base_url.clone(),
        credential,
        Duration::from_secs(config.remote.timeout_secs),
    )?;

    let path = match args.output {
        Some(path) => path,
        None => {
            let pb = ui::spinner("Looking up conversation");
            let info = conversation_info_or_fallback(&source, &source_ref).await;
            pb.finish_and_clear();
            if info.degraded {
                ui::warn("Conversation details unavailable; naming the export after its identifier");
            }
            default_export_path(&config.export.output_dir, &info, &source_ref)
        }
    };

    let options = SyncOptions {
        format: config.export.format_options(),
        strategies: config.sync.strategies(),
        force_full: args.full,
        cap: args.limit,
        max_pages: config.sync.max_pages,
    };

    let pb = ui::spinner(&format!("Syncing {}", source_ref));
    let outcome = sync_conversation(&source, &source_ref, &path, &options).await;
    pb.finish_and_clear();

    let outcome = outcome.with_context(|| format!("Export of {} to {} failed", source_ref, path.display()))?;
    let shown = path.display();
    match outcome {
        SyncOutcome::Created { count } => ui::success(&format!("Exported {} messages to {}", count, shown)),
        SyncOutcome::CreatedEmpty => ui::success(&format!("No messages yet; created {}", shown)),
        SyncOutcome::Appended { count } => ui::success(&format!("Appended {} new messages to {}", count, shown)),
        SyncOutcome::UpToDate => ui::success(&format!("{} is up to date", shown)),
        SyncOutcome::Refreshed { count } => ui::success(&format!("Refreshed {} ({} messages)", shown, count)),
    }

    Ok(())
}

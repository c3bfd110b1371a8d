use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use colored::*;
use tracing_subscriber::EnvFilter;

use zoom_recording_backup::backup::{run_until_interrupted, BackupRun, FileProcessor, RunStats, UploadStage};
use zoom_recording_backup::config::{load_user_list, Config};
use zoom_recording_backup::ledger::LedgerStore;
use zoom_recording_backup::sharepoint::{GraphClient, GraphSession};
use zoom_recording_backup::zoom::ZoomClient;
use zoom_recording_backup::{BackupError, Result};

const DEFAULT_USER_FILE: &str = "users.json";

#[derive(Parser)]
#[command(name = "zoom-backup")]
#[command(about = "Back up Zoom cloud recordings to SharePoint", version)]
struct Args {
    /// JSON file with the emails of the users to back up
    #[arg(short = 'f', long)]
    userfile: Option<PathBuf>,

    /// Email of a single user to back up
    #[arg(short, long)]
    user: Option<String>,

    /// Report what would be transferred without downloading, uploading or
    /// writing the ledger
    #[arg(long = "dry_run")]
    dry_run: bool,

    /// Configuration file (default: zoom-recording-cloud-backup.conf or
    /// $ZOOM_BACKUP_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.json_logs);

    println!(
        "\n{}\n",
        format!("Zoom Recording Cloud Backup v{}", env!("CARGO_PKG_VERSION"))
            .cyan()
            .bold()
    );

    let config_path = Config::resolve_path(args.config.as_deref());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => return fail(&e),
    };

    let (users, dry_run) = match resolve_users(&args) {
        Ok(resolved) => resolved,
        Err(e) => return fail(&e),
    };
    println!("{} {} user(s) loaded", "✓".green(), users.len());
    if dry_run {
        println!("{}", "Dry run: nothing will be transferred".yellow());
    }

    let run = run_backup(&config, &users, dry_run);
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Unable to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    match run_until_interrupted(run, interrupt).await {
        Some(Ok(_)) => ExitCode::SUCCESS,
        Some(Err(e)) => fail(&e),
        None => {
            tracing::warn!("Interrupted, stopping the backup");
            println!(
                "\n{}",
                "Interrupted. Files not yet recorded as complete are retried on the next run.".yellow()
            );
            ExitCode::SUCCESS
        }
    }
}

fn fail(err: &BackupError) -> ExitCode {
    tracing::error!(error = %err, "Backup aborted");
    println!("{} {}", "✗".red(), err);
    ExitCode::from(1)
}

async fn run_backup(config: &Config, users: &[String], dry_run: bool) -> Result<RunStats> {
    let network = &config.network;
    let api_timeout = Duration::from_secs(network.api_timeout_secs);
    let transfer_timeout = Duration::from_secs(network.request_timeout_secs);
    let retry = network.retry_policy();

    let templates = config.naming_templates()?;
    let range = config.listing_range()?;
    let ledger = LedgerStore::new(&config.storage.completed_log);

    let zoom = ZoomClient::new(&config.zoom.api_base_url, api_timeout, transfer_timeout)?;
    let zoom_session = zoom.authenticate(&config.zoom).await?;

    let graph = GraphClient::new(&config.sharepoint, api_timeout, transfer_timeout)?;
    let graph_session = if !config.storage.upload {
        tracing::info!("Uploads disabled, files stay in the staging directory");
        None
    } else if dry_run {
        Some(GraphSession::unauthenticated())
    } else {
        Some(
            graph
                .authenticate(&config.sharepoint.tenant_id, &config.sharepoint.client_id)
                .await?,
        )
    };

    let mut processor = FileProcessor::new(&zoom, &zoom_session, &ledger, &templates, &config.storage.download_dir)
        .with_retry_policy(retry)
        .with_dry_run(dry_run);
    if let Some(session) = &graph_session {
        processor = processor.with_upload(UploadStage {
            target: &graph,
            session,
            remote_folder: config.sharepoint.remote_folder_name.clone(),
        });
    }

    BackupRun::new(&zoom, &zoom_session, &ledger, processor, range)
        .with_listing_retry(retry)
        .execute(users)
        .await
}

/// Users from the flags, or from interactive prompts when neither flag is
/// given. Returns the users and whether to dry-run.
fn resolve_users(args: &Args) -> Result<(Vec<String>, bool)> {
    let (users, dry_run) = match (&args.userfile, &args.user) {
        (Some(path), _) => (load_user_list(path)?, args.dry_run),
        (None, Some(user)) => (vec![user.trim().to_string()], args.dry_run),
        (None, None) => prompt_users()?,
    };

    let users: Vec<String> = users.into_iter().filter(|u| !u.is_empty()).collect();
    if users.is_empty() {
        return Err(BackupError::config("No users to back up"));
    }
    Ok((users, dry_run))
}

fn prompt_users() -> Result<(Vec<String>, bool)> {
    println!("{}", "Whose recordings should be backed up?".bold());
    println!("  1. All users in a user file");
    println!("  2. A specific user");
    let choice = prompt("Enter choice [1]: ")?;

    let users = match choice.as_str() {
        "" | "1" => {
            let path = prompt(&format!("User file [{}]: ", DEFAULT_USER_FILE))?;
            let path = if path.is_empty() { DEFAULT_USER_FILE.to_string() } else { path };
            load_user_list(&PathBuf::from(path))?
        }
        "2" => vec![prompt("Enter user's email: ")?],
        other => return Err(BackupError::config(format!("Unknown choice '{}'", other))),
    };

    println!("\n{}", "Is this a dry run?".bold());
    let answer = prompt("Y/n: ")?.to_lowercase();
    let dry_run = !(answer == "n" || answer == "no");

    Ok((users, dry_run))
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label.cyan());
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

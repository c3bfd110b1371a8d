// Zoom Backup maintenance CLI
// Inspects and repairs the ledger and checks configuration without transferring anything

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use colored::*;

use zoom_recording_backup::config::Config;
use zoom_recording_backup::ledger::LedgerStore;
use zoom_recording_backup::recording::{FileStatus, Recording, RecordingFile};
use zoom_recording_backup::zoom::{date_windows, MAX_WINDOW_DAYS};
use zoom_recording_backup::Result;

#[derive(Parser)]
#[command(name = "zoom-backup-cli")]
#[command(about = "Zoom Backup ledger and configuration tool", long_about = None)]
struct Cli {
    /// Configuration file (default: zoom-recording-cloud-backup.conf or
    /// $ZOOM_BACKUP_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ledger file, overriding Storage:completed_log
    #[arg(short, long)]
    ledger: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count ledger files per status and list failed files
    Status,

    /// Queue failed files for the next run
    Reset,

    /// Validate the configuration and print the resolved settings
    CheckConfig,

    /// Print the listing windows for the configured date range
    Windows,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Status => show_status(&ledger_path(&cli)),
        Commands::Reset => reset_failed(&ledger_path(&cli)),
        Commands::CheckConfig => check_config(cli.config.as_deref()),
        Commands::Windows => show_windows(cli.config.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            ExitCode::from(1)
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<(PathBuf, Config)> {
    let path = Config::resolve_path(explicit);
    let config = Config::load(&path)?;
    Ok((path, config))
}

/// `--ledger`, else the configured ledger, else the default file name
fn ledger_path(cli: &Cli) -> PathBuf {
    if let Some(path) = &cli.ledger {
        return path.clone();
    }
    match load_config(cli.config.as_deref()) {
        Ok((_, config)) => config.storage.completed_log,
        Err(e) => {
            println!("{} {}", "○".yellow(), e);
            println!("  Falling back to the default ledger location");
            PathBuf::from("completed-downloads.json")
        }
    }
}

fn show_status(path: &Path) -> Result<()> {
    let ledger = LedgerStore::new(path).load()?;

    println!("\n{} {}", "Ledger:".bold(), path.display().to_string().cyan());
    println!("{}", "─".repeat(60));
    println!("  Meetings: {}", ledger.len());

    let records = ledger.file_records();
    let mut counts: BTreeMap<&str, usize> = FileStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    let mut unknown = 0;
    for (_, record) in &records {
        match record.status {
            Some(status) => *counts.entry(status.as_str()).or_insert(0) += 1,
            None => unknown += 1,
        }
    }

    println!("  Files: {}", records.len());
    for status in FileStatus::ALL {
        let count = counts.get(status.as_str()).copied().unwrap_or(0);
        let line = format!("    {:<16} {}", status.as_str(), count);
        if status.is_failed() && count > 0 {
            println!("{}", line.red());
        } else if status == FileStatus::Uploaded {
            println!("{}", line.green());
        } else {
            println!("{}", line);
        }
    }
    if unknown > 0 {
        println!("    {:<16} {}", "no status", unknown);
    }

    let failed: Vec<_> = records
        .iter()
        .filter(|(_, r)| r.status.map_or(false, |s| s.is_failed()))
        .collect();
    if !failed.is_empty() {
        println!("\n{}", "Failed files".bold());
        println!("{}", "─".repeat(60));
        for (meeting_id, record) in failed {
            println!(
                "  {} {} {} ({}.{}) {}",
                "✗".red(),
                meeting_id,
                record.id.as_deref().unwrap_or("?"),
                record.recording_type.as_deref().unwrap_or("?"),
                record.file_extension.as_deref().unwrap_or("?"),
                record.status.map(|s| s.to_string()).unwrap_or_default().red()
            );
        }
        println!("\nRun {} to retry them on the next backup", "zoom-backup-cli reset".cyan());
    }

    Ok(())
}

fn reset_failed(path: &Path) -> Result<()> {
    let summary = LedgerStore::new(path).reset_failed()?;

    if summary.total() == 0 {
        println!("{} No failed files in {}", "✓".green(), path.display());
        return Ok(());
    }

    println!(
        "{} {} download failure(s) set back to {}",
        "✓".green(),
        summary.download_failed,
        FileStatus::Pending.as_str().cyan()
    );
    println!(
        "{} {} upload failure(s) set back to {}",
        "✓".green(),
        summary.upload_failed,
        FileStatus::Downloaded.as_str().cyan()
    );
    Ok(())
}

fn check_config(explicit: Option<&Path>) -> Result<()> {
    let (path, config) = load_config(explicit)?;
    let (start, end) = config.listing_range()?;
    let templates = config.naming_templates()?;

    println!("{} Configuration valid: {}", "✓".green(), path.display().to_string().cyan());
    println!("{}", "─".repeat(60));

    println!("{}", "Recordings".bold());
    println!("  Date range: {} to {} (inclusive)", start, end.pred_opt().unwrap_or(end));
    println!("  Timezone: {}", templates.timezone());
    println!("  Filename: {}", config.recordings.filename);
    println!("  Folder: {}", config.recordings.folder);

    let sample = sample_recording();
    let names = templates.format_names(&sample, &sample.files[0]);
    println!("  Sample folder: {}", names.folder.cyan());
    println!("  Sample file: {}", names.filename.cyan());

    println!("{}", "Storage".bold());
    println!("  Staging directory: {}", config.storage.download_dir.display());
    println!("  Ledger: {}", config.storage.completed_log.display());
    println!(
        "  Upload: {}",
        if config.storage.upload { "enabled".green() } else { "disabled".yellow() }
    );

    println!("{}", "SharePoint".bold());
    println!("  Site: {}", config.sharepoint.site_url);
    println!("  Drive: {}", config.sharepoint.drive_id);
    println!("  Remote folder: {}", config.sharepoint.remote_folder_name);

    println!("{}", "Network".bold());
    println!("  Transfer timeout: {}s", config.network.request_timeout_secs);
    println!("  API timeout: {}s", config.network.api_timeout_secs);
    println!(
        "  Attempts: {} ({}s apart)",
        config.network.max_attempts, config.network.retry_delay_secs
    );

    Ok(())
}

fn show_windows(explicit: Option<&Path>) -> Result<()> {
    let (_, config) = load_config(explicit)?;
    let (start, end) = config.listing_range()?;
    let windows = date_windows(start, end, MAX_WINDOW_DAYS);

    println!(
        "\n{} {} window(s) of at most {} days",
        "Listing:".bold(),
        windows.len(),
        MAX_WINDOW_DAYS
    );
    println!("{}", "─".repeat(60));
    for (i, window) in windows.iter().enumerate() {
        println!(
            "  {:>3}. from={} to={} ({} days)",
            i + 1,
            window.start,
            window.last_day(),
            window.days()
        );
    }
    Ok(())
}

fn sample_recording() -> Recording {
    Recording {
        id: "sample".to_string(),
        account_id: String::new(),
        topic: "Weekly Sync".to_string(),
        start_time: Utc
            .with_ymd_and_hms(2024, 3, 5, 15, 30, 0)
            .single()
            .unwrap_or_else(Utc::now),
        size_bytes: 0,
        password: None,
        owner: "user@example.com".to_string(),
        files: vec![RecordingFile {
            id: "a1b2c3".to_string(),
            download_url: String::new(),
            file_extension: "mp4".to_string(),
            recording_type: "shared_screen_with_speaker_view".to_string(),
            file_size: None,
            status: FileStatus::Pending,
        }],
    }
}

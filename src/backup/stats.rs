use colored::*;

use crate::recording::FileStatus;
use crate::transfer::format_size;

/// What `process_file` decided for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Nothing to do in the current status
    Skipped(FileStatus),
    /// Downloaded and left on local disk
    Downloaded { bytes: u64 },
    Uploaded { bytes: u64 },
    DownloadFailed,
    UploadFailed,
    /// Dry run; the action was only logged
    DryRun,
}

impl FileOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, FileOutcome::DownloadFailed | FileOutcome::UploadFailed)
    }
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub completed_count: u64,
    pub failed_file_count: u64,
    pub total_bytes_transferred: u64,
    pub downloaded_count: u64,
    pub skipped_count: u64,
    pub dry_run_count: u64,
}

impl RunStats {
    pub fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Uploaded { bytes } => {
                self.completed_count += 1;
                self.total_bytes_transferred += bytes;
            }
            FileOutcome::Downloaded { .. } => self.downloaded_count += 1,
            FileOutcome::DownloadFailed | FileOutcome::UploadFailed => self.failed_file_count += 1,
            FileOutcome::Skipped(_) => self.skipped_count += 1,
            FileOutcome::DryRun => self.dry_run_count += 1,
        }
    }

    pub fn print_summary(&self) {
        println!("\n{}", "Backup summary".bold());
        println!(
            "  {} successfully uploaded: {} files",
            "✓".green(),
            self.completed_count
        );
        if self.downloaded_count > 0 {
            println!("  kept on local disk: {} files", self.downloaded_count);
        }
        if self.dry_run_count > 0 {
            println!("  dry run, not transferred: {} files", self.dry_run_count);
        }
        if self.failed_file_count > 0 {
            println!(
                "  {} failed: {} files",
                "✗".red(),
                self.failed_file_count.to_string().red()
            );
        } else {
            println!("  failed: 0 files");
        }
        println!(
            "  total size of uploaded files: {}",
            format_size(self.total_bytes_transferred)
        );
    }
}

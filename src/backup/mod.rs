mod cleanup;
mod file_state;
mod orchestrator;
mod stats;

pub use cleanup::remove_empty_dirs;
pub use file_state::{FileProcessor, UploadStage};
pub use orchestrator::{run_until_interrupted, BackupRun};
pub use stats::{FileOutcome, RunStats};

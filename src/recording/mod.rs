mod model;
mod naming;
mod state;

pub use model::{parse_start_time, RawRecording, RawRecordingFile, Recording, RecordingFile};
pub use naming::{
    clean_topic, sanitize_filename, sanitize_folder, title_case, FileNames, NamingTemplates,
    Template,
};
pub use state::FileStatus;

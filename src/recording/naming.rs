//! Folder and file names for recording files.
//!
//! Names come from user templates such as
//! `{meeting_time} - {topic} - {rec_type} - {recording_id}.{file_extension}`.
//! Rendering is pure: the same recording and file always give the same names,
//! which matters because a resumed run recomputes the staging path of a file
//! downloaded by an earlier run.

use chrono::format::{Item, StrftimeItems};
use chrono_tz::Tz;

use super::model::{Recording, RecordingFile};
use crate::error::{BackupError, Result};

/// Characters removed from topics and rendered names
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const FALLBACK_NAME: &str = "recording";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder {
    MeetingTime,
    Topic,
    RecType,
    RecordingId,
    FileExtension,
    Year,
    Month,
    Day,
}

impl Placeholder {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "meeting_time" => Some(Self::MeetingTime),
            "topic" => Some(Self::Topic),
            "rec_type" => Some(Self::RecType),
            "recording_id" => Some(Self::RecordingId),
            "file_extension" => Some(Self::FileExtension),
            "year" => Some(Self::Year),
            "month" => Some(Self::Month),
            "day" => Some(Self::Day),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Value(Placeholder),
}

/// A parsed name template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) => name.push(ch),
                            None => {
                                return Err(BackupError::config(format!(
                                    "Unclosed placeholder in template '{}'",
                                    source
                                )))
                            }
                        }
                    }
                    let placeholder = Placeholder::parse(name.trim()).ok_or_else(|| {
                        BackupError::config(format!(
                            "Unknown placeholder {{{}}} in template '{}'",
                            name, source
                        ))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Value(placeholder));
                }
                '}' => {
                    return Err(BackupError::config(format!(
                        "Unmatched '}}' in template '{}'",
                        source
                    )))
                }
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    fn render(&self, values: &NameValues) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Value(p) => out.push_str(values.get(*p)),
            }
        }
        out
    }
}

/// Filename and folder templates plus the clock settings used to render them
#[derive(Debug, Clone)]
pub struct NamingTemplates {
    filename: Template,
    folder: Template,
    strftime: String,
    timezone: Tz,
}

impl NamingTemplates {
    pub fn new(filename: &str, folder: &str, strftime: &str, timezone: Tz) -> Result<Self> {
        if StrftimeItems::new(strftime).any(|item| matches!(item, Item::Error)) {
            return Err(BackupError::config(format!(
                "Invalid Recordings:strftime '{}'",
                strftime
            )));
        }

        Ok(Self {
            filename: Template::parse(filename)?,
            folder: Template::parse(folder)?,
            strftime: strftime.to_string(),
            timezone,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Renders `(filename, folder)` for one file of a recording
    pub fn format_names(&self, recording: &Recording, file: &RecordingFile) -> FileNames {
        let local = recording.start_time.with_timezone(&self.timezone);

        let values = NameValues {
            meeting_time: local.format(&self.strftime).to_string(),
            topic: clean_topic(&recording.topic),
            rec_type: title_case(&file.recording_type.replace('_', " ")),
            recording_id: file.id.clone(),
            file_extension: file.file_extension.to_lowercase(),
            year: local.format("%Y").to_string(),
            month: local.format("%m").to_string(),
            day: local.format("%d").to_string(),
        };

        FileNames {
            filename: sanitize_filename(&self.filename.render(&values)),
            folder: sanitize_folder(&self.folder.render(&values)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNames {
    pub filename: String,
    /// Relative folder, `/`-separated
    pub folder: String,
}

struct NameValues {
    meeting_time: String,
    topic: String,
    rec_type: String,
    recording_id: String,
    file_extension: String,
    year: String,
    month: String,
    day: String,
}

impl NameValues {
    fn get(&self, placeholder: Placeholder) -> &str {
        match placeholder {
            Placeholder::MeetingTime => &self.meeting_time,
            Placeholder::Topic => &self.topic,
            Placeholder::RecType => &self.rec_type,
            Placeholder::RecordingId => &self.recording_id,
            Placeholder::FileExtension => &self.file_extension,
            Placeholder::Year => &self.year,
            Placeholder::Month => &self.month,
            Placeholder::Day => &self.day,
        }
    }
}

fn is_invalid(c: char) -> bool {
    c.is_control() || INVALID_CHARS.contains(&c)
}

/// Drops invalid characters and turns spaces into underscores
pub fn clean_topic(topic: &str) -> String {
    topic
        .chars()
        .filter(|c| !is_invalid(*c))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}

/// `shared screen with speaker view` to `Shared Screen With Speaker View`
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_word = false;
    for c in value.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| !is_invalid(*c)).collect();
    let trimmed = cleaned.trim().trim_end_matches('.').trim_end();
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn sanitize_folder(folder: &str) -> String {
    let parts: Vec<String> = folder
        .split(|c: char| c == '/' || c == '\\')
        .map(|part| {
            let cleaned: String = part.chars().filter(|c| !is_invalid(*c)).collect();
            cleaned.trim().trim_end_matches('.').trim_end().to_string()
        })
        .filter(|part| !part.is_empty() && part != "." && part != "..")
        .collect();

    if parts.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        parts.join("/")
    }
}

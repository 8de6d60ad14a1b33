//! Deterministic artifact naming. The output tree is partitioned by call
//! date (`YYYY/MM/DD`) and, for transcripts, scoped per call
//! (`call_<id>/`), so concurrent records never contend on the same path.

use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDateTime};

use super::{CallRecord, UserType};

/// Character budget for a transcript/audio base name. Audio URLs can be
/// arbitrarily long; names derived from them must stay well under
/// filesystem name-length limits.
pub const MAX_BASE_NAME_CHARS: usize = 30;

pub const METADATA_FILE_NAME: &str = "call_metadata.json";

const DEFAULT_AUDIO_EXTENSION: &str = ".wav";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatePartition {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl DatePartition {
    pub fn from_datetime(ts: &NaiveDateTime) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
            day: ts.day(),
        }
    }

    pub fn relative_dir(&self) -> PathBuf {
        PathBuf::from(format!(
            "{:04}/{:02}/{:02}",
            self.year, self.month, self.day
        ))
    }
}

/// File name portion of an audio URL, with query string and fragment
/// stripped.
fn url_file_name(audio_url: &str) -> &str {
    let trimmed = audio_url
        .split(['?', '#'])
        .next()
        .unwrap_or(audio_url)
        .trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

pub fn audio_stem(audio_url: &str) -> &str {
    let name = url_file_name(audio_url);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

pub fn audio_extension(audio_url: &str) -> Option<&str> {
    let name = url_file_name(audio_url);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

/// Base name for one leg's artifacts: `<user_type>_<stem>`, truncated to
/// [`MAX_BASE_NAME_CHARS`]. Truncation counts characters, not bytes.
pub fn leg_base_name(user_type: &UserType, audio_url: &str) -> String {
    let full = format!("{}_{}", user_type.label(), audio_stem(audio_url));
    full.chars().take(MAX_BASE_NAME_CHARS).collect()
}

pub fn audio_file_name(user_type: &UserType, audio_url: &str) -> String {
    let extension = audio_extension(audio_url)
        .map(|ext| format!(".{}", ext))
        .unwrap_or_else(|| DEFAULT_AUDIO_EXTENSION.to_string());
    format!("{}{}", leg_base_name(user_type, audio_url), extension)
}

pub fn transcript_file_name(user_type: &UserType, audio_url: &str) -> String {
    format!("{}.txt", leg_base_name(user_type, audio_url))
}

pub fn call_dir_name(record: &CallRecord) -> String {
    format!("call_{}", record.call_id)
}

pub fn audio_path(audio_root: &Path, record: &CallRecord) -> PathBuf {
    audio_root
        .join(DatePartition::from_datetime(&record.started_at).relative_dir())
        .join(audio_file_name(&record.user_type, &record.audio_url))
}

pub fn transcript_dir(transcript_root: &Path, record: &CallRecord) -> PathBuf {
    transcript_root
        .join(DatePartition::from_datetime(&record.started_at).relative_dir())
        .join(call_dir_name(record))
}

pub fn transcript_path(transcript_root: &Path, record: &CallRecord) -> PathBuf {
    transcript_dir(transcript_root, record)
        .join(transcript_file_name(&record.user_type, &record.audio_url))
}

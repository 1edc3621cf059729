use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::LogError;

pub const MAX_TEXT_CHARS: usize = 300;
pub const MAX_ENTRIES_PER_DAY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub engine: String,
    pub language: String,
    pub text: String,
}

impl LogEntry {
    pub fn new(timestamp: DateTime<Utc>, engine: &str, language: &str, text: &str) -> Self {
        Self {
            timestamp,
            engine: engine.to_string(),
            language: language.to_string(),
            text: text.chars().take(MAX_TEXT_CHARS).collect(),
        }
    }
}

pub fn parse_day(raw: &str) -> Result<NaiveDate, LogError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| LogError::BadDate(raw.to_string()))
}

/// Append-only spoken-text log, one JSON array file per UTC day.
#[derive(Debug, Clone)]
pub struct TtsLog {
    dir: PathBuf,
}

impl TtsLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("tts-log-{}.json", day.format("%Y-%m-%d")))
    }

    /// Entries for one day; a day with no file is empty.
    pub fn read_day(&self, day: NaiveDate) -> Result<Vec<LogEntry>, LogError> {
        read_entries(&self.path_for(day))
    }

    pub fn append(&self, entry: LogEntry) -> Result<(), LogError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(entry.timestamp.date_naive());
        let mut entries = read_entries(&path)?;
        entries.push(entry);
        if entries.len() > MAX_ENTRIES_PER_DAY {
            let excess = entries.len() - MAX_ENTRIES_PER_DAY;
            entries.drain(..excess);
        }
        save_atomic(&path, &entries)
    }

    /// Fire-and-forget: failures are logged and never reach the caller.
    pub fn record(&self, engine: &str, language: &str, text: &str) {
        let entry = LogEntry::new(Utc::now(), engine, language, text);
        if let Err(err) = self.append(entry) {
            tracing::warn!(error = %err, dir = %self.dir.display(), "tts log write failed");
        }
    }
}

fn read_entries(path: &Path) -> Result<Vec<LogEntry>, LogError> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(serde_json::from_str(&s)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}

fn save_atomic(path: &Path, entries: &[LogEntry]) -> Result<(), LogError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn temp_log(tag: &str) -> TtsLog {
        let dir = std::env::temp_dir().join(format!("depthrain-log-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        TtsLog::new(dir)
    }

    fn at(day: u32, secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 0, 0, secs.min(59))
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn entries_land_in_the_file_for_their_day() {
        let log = temp_log("days");
        log.append(LogEntry::new(at(1, 0), "simulated", "en-US", "hello"))
            .expect("append");
        log.append(LogEntry::new(at(2, 0), "simulated", "zh-CN", "你好"))
            .expect("append");

        let day1 = log.read_day(parse_day("2024-03-01").expect("date")).expect("read");
        assert_eq!(day1.len(), 1);
        assert_eq!(day1[0].text, "hello");
        assert!(log.path_for(at(2, 0).date_naive()).ends_with("tts-log-2024-03-02.json"));
        let _ = fs::remove_dir_all(&log.dir);
    }

    #[test]
    fn text_is_truncated_by_chars() {
        let long: String = "语".repeat(400);
        let entry = LogEntry::new(at(1, 0), "x", "zh-CN", &long);
        assert_eq!(entry.text.chars().count(), MAX_TEXT_CHARS);
    }

    #[test]
    fn day_keeps_newest_entries() {
        let log = temp_log("cap");
        fs::create_dir_all(&log.dir).expect("mkdir");
        let seeded: Vec<LogEntry> = (0..MAX_ENTRIES_PER_DAY)
            .map(|i| LogEntry::new(at(5, 0), "x", "en-US", &i.to_string()))
            .collect();
        save_atomic(&log.path_for(at(5, 0).date_naive()), &seeded).expect("seed");

        log.append(LogEntry::new(at(5, 1), "x", "en-US", "newest"))
            .expect("append");
        let entries = log.read_day(at(5, 0).date_naive()).expect("read");
        assert_eq!(entries.len(), MAX_ENTRIES_PER_DAY);
        assert_eq!(entries[0].text, "1");
        assert_eq!(entries.last().map(|e| e.text.as_str()), Some("newest"));
        let _ = fs::remove_dir_all(&log.dir);
    }

    #[test]
    fn missing_day_is_empty_and_bad_dates_fail() {
        let log = temp_log("missing");
        assert!(log.read_day(at(9, 0).date_naive()).expect("read").is_empty());
        assert!(matches!(parse_day("03/01/2024"), Err(LogError::BadDate(_))));
    }

    #[test]
    fn record_swallows_errors() {
        // A file where the directory should be makes every write fail.
        let path = std::env::temp_dir().join(format!("depthrain-log-file-{}", std::process::id()));
        fs::write(&path, b"not a dir").expect("write");
        TtsLog::new(&path).record("x", "en-US", "ignored");
        let _ = fs::remove_file(&path);
    }
}

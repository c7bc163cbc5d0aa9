//! JSON Lines event files: input pattern expansion and a sequential reader.
//!
//! Each non-blank line is one [`EventRecord`]. Blank lines are ignored both by
//! [`count_events`] and by [`EventReader`], so the two always agree.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::{EventMetaData, Track};

/// One event as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub meta: EventMetaData,
    #[serde(default)]
    pub tracks: Vec<Track>,
    /// Any other top-level entries, kept as raw JSON.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Expand `patterns` into a sorted, de-duplicated file list.
///
/// Patterns use `glob` syntax. A pattern that matches no regular file is an
/// error, as is a plain path that does not exist.
pub fn expand_inputs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        if !pattern.contains(['*', '?', '[']) {
            let path = Path::new(pattern);
            if !path.is_file() {
                return Err(anyhow!("input file {} does not exist", path.display()));
            }
            files.push(path.to_path_buf());
            continue;
        }

        let before = files.len();
        let entries = glob::glob(pattern)
            .with_context(|| format!("invalid input pattern '{pattern}'"))?;
        for entry in entries {
            let path = entry.with_context(|| format!("expand input pattern '{pattern}'"))?;
            if path.is_file() {
                files.push(path);
            }
        }
        if files.len() == before {
            return Err(anyhow!("input pattern '{pattern}' matched no files"));
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Number of events across `files`.
pub fn count_events(files: &[PathBuf]) -> Result<u64> {
    let mut total = 0;
    for path in files {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        for line in BufReader::new(file).lines() {
            let line = line.with_context(|| format!("read {}", path.display()))?;
            if !line.trim().is_empty() {
                total += 1;
            }
        }
    }
    Ok(total)
}

struct OpenFile {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

/// Sequential reader over a list of event files.
pub struct EventReader {
    files: Vec<PathBuf>,
    next_file: usize,
    current: Option<OpenFile>,
}

impl EventReader {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            next_file: 0,
            current: None,
        }
    }

    /// Advance past one event. Returns `false` once the input is exhausted.
    pub fn skip(&mut self) -> Result<bool> {
        Ok(self.next_line()?.is_some())
    }

    /// Parse the next event, or `None` once the input is exhausted.
    pub fn read(&mut self) -> Result<Option<EventRecord>> {
        let Some((location, line)) = self.next_line()? else {
            return Ok(None);
        };
        let record = serde_json::from_str(&line)
            .with_context(|| format!("parse event record at {location}"))?;
        Ok(Some(record))
    }

    fn next_line(&mut self) -> Result<Option<(String, String)>> {
        loop {
            if self.current.is_none() {
                let Some(path) = self.files.get(self.next_file) else {
                    return Ok(None);
                };
                self.next_file += 1;
                let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
                self.current = Some(OpenFile {
                    path: path.clone(),
                    lines: BufReader::new(file).lines(),
                    line_no: 0,
                });
            }
            let Some(open) = self.current.as_mut() else {
                continue;
            };
            match open.lines.next() {
                Some(line) => {
                    open.line_no += 1;
                    let line = line.with_context(|| format!("read {}", open.path.display()))?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    let location = format!("{}:{}", open.path.display(), open.line_no);
                    return Ok(Some((location, line)));
                }
                None => self.current = None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn record_line(run: u32, event: u64) -> String {
        format!(
            r#"{{"meta":{{"experiment":7,"run":{run},"event":{event}}},"tracks":[],"RawKLM":{{"hits":{event}}}}}"#
        )
    }

    fn write_events(path: &Path, lines: &[String]) {
        let mut contents = lines.join("\n");
        contents.push('\n');
        fs::write(path, contents).expect("write events");
    }

    #[test]
    fn wildcards_expand_sorted_and_deduplicated() {
        let temp = tempfile::tempdir().expect("tempdir");
        for name in ["b.jsonl", "a.jsonl", "notes.txt"] {
            fs::write(temp.path().join(name), "").expect("write");
        }
        let star = temp.path().join("*.jsonl").display().to_string();
        let exact = temp.path().join("a.jsonl").display().to_string();
        let question = temp.path().join("?.jsonl").display().to_string();

        let files = expand_inputs(&[star, exact, question]).expect("expand");
        let names: Vec<_> = files
            .iter()
            .filter_map(|path| path.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(names, vec!["a.jsonl", "b.jsonl"]);
    }

    #[test]
    fn unmatched_pattern_and_missing_file_are_errors() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("*.root").display().to_string();
        let err = expand_inputs(&[missing]).expect_err("no match");
        assert!(err.to_string().contains("matched no files"));

        let absent = temp.path().join("absent.jsonl").display().to_string();
        assert!(expand_inputs(&[absent]).is_err());

        let invalid = temp.path().join("[.jsonl").display().to_string();
        let err = expand_inputs(&[invalid]).expect_err("bad pattern");
        assert!(err.to_string().contains("invalid input pattern"));
    }

    #[test]
    fn wildcards_skip_directories_and_cross_subdirectories() {
        let temp = tempfile::tempdir().expect("tempdir");
        for run in ["run1", "run2"] {
            fs::create_dir_all(temp.path().join(run)).expect("run dir");
            fs::write(temp.path().join(run).join("events.jsonl"), "").expect("write");
        }
        fs::create_dir_all(temp.path().join("run3.jsonl")).expect("dir named like input");

        let nested = temp.path().join("run*/events.jsonl").display().to_string();
        let flat = temp.path().join("*.jsonl").display().to_string();
        let files = expand_inputs(&[nested]).expect("expand");
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("run1/events.jsonl"));
        assert!(files[1].ends_with("run2/events.jsonl"));

        let err = expand_inputs(&[flat]).expect_err("only a directory matches");
        assert!(err.to_string().contains("matched no files"));
    }

    #[test]
    fn reader_spans_files_and_keeps_extra_entries() {
        let temp = tempfile::tempdir().expect("tempdir");
        let first = temp.path().join("a.jsonl");
        let second = temp.path().join("b.jsonl");
        write_events(&first, &[record_line(1, 1), String::new(), record_line(1, 2)]);
        write_events(&second, &[record_line(2, 3)]);
        let files = vec![first, second];

        assert_eq!(count_events(&files).expect("count"), 3);

        let mut reader = EventReader::new(files);
        assert!(reader.skip().expect("skip"));
        let record = reader.read().expect("read").expect("record");
        assert_eq!(record.meta.event, 2);
        assert_eq!(record.extra["RawKLM"]["hits"], 2);
        let record = reader.read().expect("read").expect("record");
        assert_eq!(record.meta.run, 2);
        assert!(reader.read().expect("read").is_none());
        assert!(!reader.skip().expect("skip"));
    }

    #[test]
    fn malformed_line_reports_location() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("bad.jsonl");
        write_events(&path, &[record_line(1, 1), "{not json".to_string()]);
        let mut reader = EventReader::new(vec![path]);
        reader.read().expect("first record");
        let err = reader.read().expect_err("malformed");
        assert!(format!("{err:#}").contains("bad.jsonl:2"));
    }
}

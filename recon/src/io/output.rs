//! Output file writers. Every file is written to a sibling temp file first and
//! renamed into place, so a crashed run never leaves a truncated output.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::stats::RunStatistics;

/// Pretty JSON document with a trailing newline.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    write_atomic(path, &buf)
}

pub fn write_statistics(path: &Path, statistics: &RunStatistics) -> Result<()> {
    write_json(path, statistics)
}

/// Line-oriented file streamed into `<path>.tmp` and renamed into place by
/// [`LineWriter::commit`].
pub struct LineWriter {
    path: PathBuf,
    tmp_path: PathBuf,
    writer: BufWriter<File>,
    lines: u64,
}

impl LineWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let tmp_path = prepare(path)?;
        let file =
            File::create(&tmp_path).with_context(|| format!("create {}", tmp_path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            tmp_path,
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    pub fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.writer, "{line}")
            .with_context(|| format!("write {}", self.tmp_path.display()))?;
        self.lines += 1;
        Ok(())
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Flush and rename into place. Returns the final path.
    pub fn commit(mut self) -> Result<PathBuf> {
        self.writer
            .flush()
            .with_context(|| format!("flush {}", self.tmp_path.display()))?;
        fs::rename(&self.tmp_path, &self.path)
            .with_context(|| format!("replace {}", self.path.display()))?;
        Ok(self.path)
    }
}

/// Create the parent directory and return the sibling temp path.
fn prepare(path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    Ok(PathBuf::from(tmp_name))
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = prepare(path)?;
    fs::write(&tmp_path, contents).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

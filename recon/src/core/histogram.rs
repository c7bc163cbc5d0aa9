//! Profile histograms and the run-scoped collection modules deposit them into.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One-dimensional profile: per bin, the mean of the `y` values filled at `x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub bins: usize,
    pub low: f64,
    pub high: f64,
    /// Per-bin `(entries, sum_y, sum_y2)`, with underflow at index 0 and
    /// overflow at index `bins + 1`.
    cells: Vec<ProfileCell>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProfileCell {
    pub entries: u64,
    pub sum_y: f64,
    pub sum_y2: f64,
}

impl ProfileCell {
    pub fn mean(&self) -> Option<f64> {
        if self.entries == 0 {
            return None;
        }
        Some(self.sum_y / self.entries as f64)
    }
}

impl Profile {
    pub fn new(name: &str, title: &str, bins: usize, low: f64, high: f64) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            x_label: String::new(),
            y_label: String::new(),
            bins,
            low,
            high,
            cells: vec![ProfileCell::default(); bins + 2],
        }
    }

    pub fn with_axes(mut self, x_label: &str, y_label: &str) -> Self {
        self.x_label = x_label.to_string();
        self.y_label = y_label.to_string();
        self
    }

    /// Index into `cells` for `x`, including under/overflow.
    pub fn find_bin(&self, x: f64) -> usize {
        if x.is_nan() || x < self.low {
            return 0;
        }
        if x >= self.high {
            return self.bins + 1;
        }
        let width = (self.high - self.low) / self.bins as f64;
        let idx = ((x - self.low) / width) as usize;
        idx.min(self.bins - 1) + 1
    }

    pub fn fill(&mut self, x: f64, y: f64) {
        let idx = self.find_bin(x);
        let cell = &mut self.cells[idx];
        cell.entries += 1;
        cell.sum_y += y;
        cell.sum_y2 += y * y;
    }

    pub fn reset(&mut self) {
        for cell in &mut self.cells {
            *cell = ProfileCell::default();
        }
    }

    /// Total entries, under/overflow included.
    pub fn entries(&self) -> u64 {
        self.cells.iter().map(|cell| cell.entries).sum()
    }

    pub fn cell(&self, idx: usize) -> Option<&ProfileCell> {
        self.cells.get(idx)
    }

    pub fn underflow(&self) -> &ProfileCell {
        &self.cells[0]
    }

    pub fn overflow(&self) -> &ProfileCell {
        &self.cells[self.bins + 1]
    }
}

/// Histograms handed over by modules at finalize, grouped by directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramBook {
    directories: BTreeMap<String, Vec<Profile>>,
}

impl HistogramBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposit(&mut self, directory: &str, profile: Profile) {
        self.directories
            .entry(directory.to_string())
            .or_default()
            .push(profile);
    }

    pub fn directory(&self, directory: &str) -> Option<&[Profile]> {
        self.directories.get(directory).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.directories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return everything deposited so far.
    pub fn drain(&mut self) -> HistogramBook {
        std::mem::take(self)
    }
}

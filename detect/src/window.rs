//! Fixed-length strided windows over a recording.

use serde::{Deserialize, Serialize};

use crate::error::DetectError;

/// One analysis window. `end` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl Window {
    /// Number of samples covered, `end - start + 1`.
    pub fn n_samples(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Maps window indices to sample ranges.
///
/// Window `i` starts at `i * hop` and spans `sequence_len` samples, clamped to
/// the last frame. There are `max(n_frames / hop, 1)` windows, so a recording
/// shorter than one window still yields one (padded later by the front-end).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowIndexer {
    n_frames: usize,
    sequence_len: usize,
    hop: usize,
    num_windows: usize,
}

impl WindowIndexer {
    pub fn new(n_frames: usize, sequence_len: usize, hop: usize) -> Result<Self, DetectError> {
        if n_frames == 0 || sequence_len == 0 || hop == 0 {
            return Err(DetectError::InvalidOptions(format!(
                "window indexer needs positive sizes (n_frames {n_frames}, sequence_len {sequence_len}, hop {hop})"
            )));
        }
        Ok(Self {
            n_frames,
            sequence_len,
            hop,
            num_windows: (n_frames / hop).max(1),
        })
    }

    pub fn num_windows(&self) -> usize {
        self.num_windows
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    pub fn sequence_len(&self) -> usize {
        self.sequence_len
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Window `index`, or `None` past the last window.
    pub fn window(&self, index: usize) -> Option<Window> {
        if index >= self.num_windows {
            return None;
        }
        let start = index * self.hop;
        let end = (start + self.sequence_len - 1).min(self.n_frames - 1);
        Some(Window { index, start, end })
    }

    /// All windows in index order, computed lazily.
    pub fn iter(&self) -> impl Iterator<Item = Window> + '_ {
        (0..self.num_windows).filter_map(|i| self.window(i))
    }
}

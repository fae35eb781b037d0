//! Connected component labeling using union-find over horizontal runs.
//!
//! Each row of the mask is run-length encoded, runs are merged with the
//! overlapping runs of the previous row, and provisional labels are flattened
//! to `1..=n`. Label order follows the first pixel of each component in
//! raster order, which makes region discovery order deterministic.

#[cfg(test)]
mod tests;

use super::config::Connectivity;
use crate::common::Buffer2;

// ============================================================================
// Run-Length Encoding
// ============================================================================

/// A horizontal run of foreground pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Run {
    start: u32, // inclusive
    end: u32,   // exclusive
    label: u32,
}

impl Run {
    /// Columns of the previous row that may touch this run, `end` exclusive.
    #[inline]
    fn search_window(&self, connectivity: Connectivity) -> (u32, u32) {
        match connectivity {
            Connectivity::Four => (self.start, self.end),
            Connectivity::Eight => (self.start.saturating_sub(1), self.end + 1),
        }
    }
}

#[inline]
fn runs_connected(prev: &Run, curr: &Run, connectivity: Connectivity) -> bool {
    match connectivity {
        Connectivity::Four => prev.start < curr.end && prev.end > curr.start,
        Connectivity::Eight => prev.start < curr.end + 1 && prev.end + 1 > curr.start,
    }
}

pub(super) fn extract_runs(row: &[bool], runs: &mut Vec<Run>) {
    let mut start = None;
    for (x, &on) in row.iter().enumerate() {
        match (on, start) {
            (true, None) => start = Some(x as u32),
            (false, Some(s)) => {
                runs.push(Run {
                    start: s,
                    end: x as u32,
                    label: 0,
                });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(Run {
            start: s,
            end: row.len() as u32,
            label: 0,
        });
    }
}

// ============================================================================
// LabelMap
// ============================================================================

/// Per-pixel component labels; 0 is background.
#[derive(Debug)]
pub struct LabelMap {
    labels: Buffer2<u32>,
    num_labels: usize,
}

impl LabelMap {
    pub fn from_mask(mask: &Buffer2<bool>, connectivity: Connectivity) -> Self {
        let mut labels = Buffer2::new_default(mask.width(), mask.height());
        let num_labels = if mask.is_empty() {
            0
        } else {
            label_mask(mask, &mut labels, connectivity)
        };
        Self { labels, num_labels }
    }

    /// Number of connected components (excluding background).
    #[inline]
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.labels.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.labels.height()
    }

    #[inline]
    pub fn labels(&self) -> &[u32] {
        self.labels.pixels()
    }

    /// Linear pixel indices of every component, indexed by `label - 1`.
    /// Indices within a component are in raster order.
    pub fn components(&self) -> Vec<Vec<u32>> {
        let mut components = vec![Vec::new(); self.num_labels];
        for (idx, &label) in self.labels.pixels().iter().enumerate() {
            if label != 0 {
                components[(label - 1) as usize].push(idx as u32);
            }
        }
        components
    }
}

impl std::ops::Index<usize> for LabelMap {
    type Output = u32;

    #[inline]
    fn index(&self, idx: usize) -> &Self::Output {
        &self.labels[idx]
    }
}

// ============================================================================
// Labeling
// ============================================================================

/// Merges each run of the current row with the runs above it.
/// Runs with no neighbor above get a fresh label.
fn merge_runs_with_prev(
    curr_runs: &mut [Run],
    prev_runs: &[Run],
    connectivity: Connectivity,
    uf: &mut UnionFind,
) {
    let mut prev_idx = 0;
    for run in curr_runs.iter_mut() {
        let (search_start, search_end) = run.search_window(connectivity);

        while prev_idx < prev_runs.len() && prev_runs[prev_idx].end <= search_start {
            prev_idx += 1;
        }

        let mut assigned = None;
        let mut check_idx = prev_idx;
        while check_idx < prev_runs.len() && prev_runs[check_idx].start < search_end {
            let prev_run = &prev_runs[check_idx];
            if runs_connected(prev_run, run, connectivity) {
                match assigned {
                    Some(label) if label != prev_run.label => uf.union(label, prev_run.label),
                    None => assigned = Some(prev_run.label),
                    _ => {}
                }
            }
            check_idx += 1;
        }

        run.label = assigned.unwrap_or_else(|| uf.make_set());
    }
}

fn label_mask(mask: &Buffer2<bool>, labels: &mut Buffer2<u32>, connectivity: Connectivity) -> usize {
    let width = mask.width();

    let mut uf = UnionFind::new();
    let mut prev_runs: Vec<Run> = Vec::with_capacity(width / 4);
    let mut curr_runs: Vec<Run> = Vec::with_capacity(width / 4);

    for y in 0..mask.height() {
        curr_runs.clear();
        extract_runs(mask.row(y), &mut curr_runs);

        if curr_runs.is_empty() {
            prev_runs.clear();
            continue;
        }

        merge_runs_with_prev(&mut curr_runs, &prev_runs, connectivity, &mut uf);

        let row_start = y * width;
        for run in &curr_runs {
            for x in run.start..run.end {
                labels[row_start + x as usize] = run.label;
            }
        }

        std::mem::swap(&mut prev_runs, &mut curr_runs);
    }

    uf.flatten_labels(labels.pixels_mut())
}

// ============================================================================
// Union-find
// ============================================================================

/// Union-find over provisional labels `1..`. The smaller label always becomes
/// the root, so roots keep raster discovery order.
#[derive(Debug, Default)]
struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    fn new() -> Self {
        Self {
            parent: Vec::with_capacity(256),
        }
    }

    #[inline]
    fn make_set(&mut self) -> u32 {
        let label = self.parent.len() as u32 + 1;
        self.parent.push(label);
        label
    }

    /// Find with path compression.
    fn find(&mut self, label: u32) -> u32 {
        let mut root = label;
        while self.parent[(root - 1) as usize] != root {
            root = self.parent[(root - 1) as usize];
        }

        let mut current = label;
        while current != root {
            let next = self.parent[(current - 1) as usize];
            self.parent[(current - 1) as usize] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, a: u32, b: u32) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            let (smaller, larger) = (root_a.min(root_b), root_a.max(root_b));
            self.parent[(larger - 1) as usize] = smaller;
        }
    }

    /// Rewrites provisional labels to sequential `1..=n`, returns n.
    fn flatten_labels(&mut self, labels: &mut [u32]) -> usize {
        let len = self.parent.len();
        if len == 0 {
            return 0;
        }

        let mut label_map = vec![0u32; len + 1];
        let mut num_labels = 0u32;
        for i in 1..=len as u32 {
            let root = self.find(i);
            if label_map[root as usize] == 0 {
                num_labels += 1;
                label_map[root as usize] = num_labels;
            }
            label_map[i as usize] = label_map[root as usize];
        }

        for l in labels.iter_mut().filter(|l| **l != 0) {
            *l = label_map[*l as usize];
        }

        num_labels as usize
    }
}

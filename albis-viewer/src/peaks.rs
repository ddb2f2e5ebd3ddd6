//! Peak list and row selection.

use albis_analysis::peaks::{DEFAULT_MAX_PEAKS, MAX_PEAKS_LIMIT};
use albis_analysis::{detect_peaks, Peak, PeakFinderConfig};
use albis_core::{Frame, Mask};

/// How a peak row was clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectMode {
    /// Plain click: select only this row.
    #[default]
    Replace,
    /// Shift-click: select the range from the anchor.
    Range,
    /// Ctrl/Cmd-click: toggle this row.
    Toggle,
}

/// Detected peaks with a multi-row selection.
#[derive(Debug, Clone)]
pub struct PeakState {
    enabled: bool,
    count: usize,
    peaks: Vec<Peak>,
    selected: Vec<usize>,
    anchor: Option<usize>,
}

impl Default for PeakState {
    fn default() -> Self {
        Self {
            enabled: false,
            count: DEFAULT_MAX_PEAKS,
            peaks: Vec::new(),
            selected: Vec::new(),
            anchor: None,
        }
    }
}

impl PeakState {
    #[must_use]
    pub fn new(count: usize) -> Self {
        let mut state = Self::default();
        state.set_count(count);
        state
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable detection. Disabling drops the peaks and the
    /// selection.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.peaks.clear();
            self.selected.clear();
            self.anchor = None;
        }
    }

    /// Requested peak count.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Set the requested peak count, clamped to `1..=500`.
    pub fn set_count(&mut self, count: usize) {
        self.count = count.clamp(1, MAX_PEAKS_LIMIT);
    }

    #[must_use]
    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    /// Selected row indices in ascending order.
    #[must_use]
    pub fn selected(&self) -> &[usize] {
        &self.selected
    }

    #[must_use]
    pub fn anchor(&self) -> Option<usize> {
        self.anchor
    }

    #[must_use]
    pub fn is_selected(&self, idx: usize) -> bool {
        self.selected.binary_search(&idx).is_ok()
    }

    /// Selected peaks.
    pub fn selected_peaks(&self) -> impl Iterator<Item = &Peak> + '_ {
        self.selected.iter().filter_map(|&i| self.peaks.get(i))
    }

    /// Run the peak finder on `frame` when enabled.
    pub fn detect(&mut self, frame: &Frame, mask: Option<&Mask>) -> &[Peak] {
        if !self.enabled {
            return &self.peaks;
        }
        let config = PeakFinderConfig::default().with_max_peaks(self.count);
        let peaks = detect_peaks(frame, mask, &config);
        log::debug!("detected {} peaks (max {})", peaks.len(), self.count);
        self.set_peaks(peaks);
        &self.peaks
    }

    /// Replace the peak list and revalidate the selection.
    pub fn set_peaks(&mut self, peaks: Vec<Peak>) {
        self.peaks = peaks;
        let len = self.peaks.len();
        self.selected.retain(|&i| i < len);
        if !matches!(self.anchor, Some(a) if a < len) {
            self.anchor = self.selected.last().copied();
        }
        if self.selected.is_empty() && len > 0 {
            self.selected.push(0);
            self.anchor = Some(0);
        }
        if len == 0 {
            self.anchor = None;
        }
    }

    /// Apply a click on row `idx`.
    pub fn select(&mut self, idx: usize, mode: SelectMode) {
        if idx >= self.peaks.len() {
            return;
        }
        match (mode, self.anchor) {
            (SelectMode::Range, Some(anchor)) if anchor < self.peaks.len() => {
                self.selected = (anchor.min(idx)..=anchor.max(idx)).collect();
            }
            (SelectMode::Toggle, _) => {
                match self.selected.binary_search(&idx) {
                    Ok(pos) => {
                        self.selected.remove(pos);
                    }
                    Err(pos) => self.selected.insert(pos, idx),
                }
                self.anchor = Some(idx);
            }
            _ => {
                self.selected = vec![idx];
                self.anchor = Some(idx);
            }
        }
    }

    /// Deselect all rows.
    pub fn clear_selection(&mut self) {
        self.selected.clear();
        self.anchor = None;
    }
}

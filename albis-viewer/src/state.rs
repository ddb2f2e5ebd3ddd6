//! Viewer controller.
//!
//! [`ViewerState`] owns the displayed frame and everything derived from
//! it: statistics, the contrast window, the mask, the ROI and the peak
//! list. All transitions go through its methods so derived state never
//! drifts from the frame it was computed on.

use std::path::{Path, PathBuf};

use albis_analysis::{compute_global_stats_with_median, Point, RoiMode, RoiResult};
use albis_core::{
    compute_auto_levels, compute_stats, Colormap, ContrastWindow, Frame, FrameStats, GlobalStats,
    Mask, Palette,
};
use albis_io::{mask_key, FileKind, Metadata};
use albis_render::{
    select_renderer, Backend, ContrastParams, FrameView, Renderer, RendererKind, RgbaImage,
};

use crate::config::ViewerConfig;
use crate::export::{self, ExportSource};
use crate::interaction::{HistTarget, Interaction};
use crate::mask::{MaskOrigin, MaskState};
use crate::peaks::PeakState;
use crate::roi::RoiState;
use crate::schedule::{Coalescer, Completion, FrameScheduler, FrameTicket, Playback, Task};
use crate::{Result, ViewerError};

/// What is open: file, dataset and the selected frame and threshold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceInfo {
    pub file: String,
    pub dataset: String,
    pub frame_count: usize,
    pub frame_index: usize,
    pub threshold_count: usize,
    pub threshold: usize,
    /// The file carries mask datasets (HDF5).
    pub has_mask_source: bool,
}

impl SourceInfo {
    /// Key under which the mask of the current threshold is cached.
    #[must_use]
    pub fn mask_key(&self) -> String {
        mask_key(&self.file, self.threshold, self.threshold_count)
    }

    /// Threshold to send with frame and mask requests.
    #[must_use]
    pub fn threshold_param(&self) -> Option<usize> {
        (self.threshold_count > 1).then_some(self.threshold)
    }

    fn export_source(&self) -> ExportSource<'_> {
        ExportSource::new(Some(self.file.as_str()), self.frame_index)
            .with_threshold(self.threshold, self.threshold_count)
    }
}

/// Application state for one viewer.
pub struct ViewerState {
    source: SourceInfo,
    frame: Option<Frame>,
    stats: Option<FrameStats>,
    global_stats: Option<GlobalStats>,
    window: ContrastWindow,
    palette: Palette,
    auto_scale: bool,
    hist_log_x: bool,
    mask: MaskState,
    roi: RoiState,
    peaks: PeakState,
    interaction: Interaction,
    scheduler: FrameScheduler,
    playback: Playback,
    coalescer: Coalescer,
    renderer: Box<dyn Renderer>,
    renderer_status: Option<String>,
}

impl ViewerState {
    /// Create a viewer drawing with `renderer`.
    #[must_use]
    pub fn new(config: &ViewerConfig, renderer: Box<dyn Renderer>) -> Self {
        let window = ContrastWindow::default().with_colormap(config.colormap);
        Self {
            source: SourceInfo::default(),
            frame: None,
            stats: None,
            global_stats: None,
            window,
            palette: Palette::build(config.colormap),
            auto_scale: config.auto_scale,
            hist_log_x: config.hist_log_x,
            mask: MaskState::default(),
            roi: RoiState::new(),
            peaks: PeakState::new(config.peak_count),
            interaction: Interaction::default(),
            scheduler: FrameScheduler::new(),
            playback: Playback::new(config.fps),
            coalescer: Coalescer::default(),
            renderer,
            renderer_status: None,
        }
    }

    /// Create a viewer with the renderer chosen by `backend`.
    #[must_use]
    pub fn with_backend(config: &ViewerConfig, backend: Backend) -> Self {
        let selection = select_renderer(backend);
        if let Some(status) = &selection.status {
            log::warn!("{status}");
        }
        let mut state = Self::new(config, selection.renderer);
        state.renderer_status = selection.status;
        state
    }

    #[must_use]
    pub fn source(&self) -> &SourceInfo {
        &self.source
    }

    #[must_use]
    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    #[must_use]
    pub fn stats(&self) -> Option<&FrameStats> {
        self.stats.as_ref()
    }

    #[must_use]
    pub fn global_stats(&self) -> Option<&GlobalStats> {
        self.global_stats.as_ref()
    }

    #[must_use]
    pub fn window(&self) -> ContrastWindow {
        self.window
    }

    #[must_use]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    #[must_use]
    pub fn auto_scale(&self) -> bool {
        self.auto_scale
    }

    #[must_use]
    pub fn hist_log_x(&self) -> bool {
        self.hist_log_x
    }

    #[must_use]
    pub fn mask_state(&self) -> &MaskState {
        &self.mask
    }

    #[must_use]
    pub fn roi(&self) -> &RoiState {
        &self.roi
    }

    pub fn roi_mut(&mut self) -> &mut RoiState {
        &mut self.roi
    }

    #[must_use]
    pub fn peaks(&self) -> &PeakState {
        &self.peaks
    }

    pub fn peaks_mut(&mut self) -> &mut PeakState {
        &mut self.peaks
    }

    #[must_use]
    pub fn interaction(&self) -> Interaction {
        self.interaction
    }

    #[must_use]
    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    #[must_use]
    pub fn renderer_kind(&self) -> RendererKind {
        self.renderer.kind()
    }

    /// Why the preferred renderer is not in use, if it is not.
    #[must_use]
    pub fn renderer_status(&self) -> Option<&str> {
        self.renderer_status.as_deref()
    }

    fn frame_size(&self) -> (usize, usize) {
        self.frame
            .as_ref()
            .map_or((0, 0), |f| (f.width(), f.height()))
    }

    fn active_mask(&self) -> Option<&Mask> {
        let (w, h) = self.frame_size();
        self.mask.active(w, h)
    }

    // ---- source selection ----

    /// Open `dataset` of `file` as described by `meta`. Frames are then
    /// loaded with [`ViewerState::request_frame`].
    pub fn open(&mut self, file: &str, dataset: &str, meta: &Metadata) {
        let has_mask_source = FileKind::of(Path::new(file)).has_mask();
        self.open_with_counts(
            file,
            dataset,
            meta.frame_count(),
            meta.threshold_count(),
            has_mask_source,
        );
    }

    /// Open a source with explicit frame and threshold counts.
    pub fn open_with_counts(
        &mut self,
        file: &str,
        dataset: &str,
        frame_count: usize,
        threshold_count: usize,
        has_mask_source: bool,
    ) {
        let same_file = self.source.file == file;
        let threshold = if same_file {
            self.source.threshold.min(threshold_count.saturating_sub(1))
        } else {
            0
        };
        self.source = SourceInfo {
            file: file.to_string(),
            dataset: dataset.to_string(),
            frame_count: frame_count.max(1),
            frame_index: 0,
            threshold_count: threshold_count.max(1),
            threshold,
            has_mask_source,
        };
        if !has_mask_source {
            self.mask.clear();
        }
        self.mask.reset_auto();
        self.playback.stop();
        self.scheduler.reset(self.source.frame_count);
    }

    /// Select threshold channel `threshold` (clamped). Invalidates the
    /// mask and, when a frame is shown, reloads it.
    pub fn set_threshold(&mut self, threshold: usize) -> Option<FrameTicket> {
        let threshold = threshold.min(self.source.threshold_count.saturating_sub(1));
        if threshold == self.source.threshold {
            return None;
        }
        self.source.threshold = threshold;
        self.mask.invalidate();
        let index = self.source.frame_index;
        self.scheduler.reset(self.source.frame_count);
        if self.frame.is_none() {
            return None;
        }
        self.request_frame(index)
    }

    // ---- frame loading ----

    /// Ask for frame `index`. Returns a ticket when the load should start
    /// now; otherwise the request is queued.
    pub fn request_frame(&mut self, index: usize) -> Option<FrameTicket> {
        let ticket = self.scheduler.request(index);
        if let Some(ticket) = ticket {
            self.source.frame_index = ticket.index();
        }
        ticket
    }

    /// Deliver a loaded frame. Stale responses are dropped. Returns the
    /// next request to start, if one was queued.
    pub fn receive_frame(&mut self, ticket: FrameTicket, frame: Frame) -> Option<FrameTicket> {
        match self.scheduler.complete(ticket) {
            Completion::Stale => None,
            Completion::Apply { next } => {
                self.source.frame_index = ticket.index();
                self.apply_frame(frame);
                if let Some(next) = next {
                    self.source.frame_index = next.index();
                }
                next
            }
        }
    }

    /// A frame request failed.
    pub fn frame_failed(&mut self, ticket: FrameTicket, error: &ViewerError) -> Option<FrameTicket> {
        log::error!("frame {} failed: {error}", ticket.index());
        let next = self.scheduler.fail(ticket);
        if let Some(next) = next {
            self.source.frame_index = next.index();
        }
        next
    }

    /// Make `frame` the displayed frame and recompute everything derived
    /// from it.
    pub fn apply_frame(&mut self, frame: Frame) {
        let (w, h) = (frame.width(), frame.height());
        self.stats = Some(compute_stats(&frame, self.hist_log_x));
        if !self.source.has_mask_source {
            self.mask.adopt_sentinels(&frame);
        }
        self.mask.align(w, h);
        self.mask.sync(w, h, false);
        self.frame = Some(frame);
        self.refresh_global_stats();
        if self.auto_scale {
            self.apply_auto_levels();
        }
        for task in Task::ALL {
            self.coalescer.request(task);
        }
        self.run_analysis();
    }

    fn refresh_global_stats(&mut self) {
        self.global_stats = self
            .frame
            .as_ref()
            .map(|frame| compute_global_stats_with_median(frame, self.active_mask()));
    }

    // ---- mask ----

    /// Mask key to fetch, or `None` when the loaded mask is current or the
    /// source has no mask datasets.
    #[must_use]
    pub fn mask_request(&self) -> Option<String> {
        if !self.source.has_mask_source {
            return None;
        }
        let key = self.source.mask_key();
        self.mask.needs_load(&key).then_some(key)
    }

    /// Install a mask fetched for `key`. Masks for another key are ignored.
    pub fn install_mask(&mut self, key: &str, mask: Mask, path: &str) {
        if key != self.source.mask_key() {
            log::debug!("dropping mask for {key}");
            return;
        }
        self.mask.install(
            mask,
            key,
            MaskOrigin::Dataset(path.to_string()),
            self.frame.as_ref(),
            true,
        );
        self.after_mask_change();
    }

    /// A mask fetch failed.
    pub fn mask_failed(&mut self, key: &str) {
        self.mask.load_failed(key);
        self.after_mask_change();
    }

    /// User toggle of the mask checkbox.
    pub fn set_mask_enabled(&mut self, enabled: bool) {
        self.mask.set_enabled(enabled);
        self.after_mask_change();
    }

    fn after_mask_change(&mut self) {
        self.refresh_global_stats();
        self.coalescer.request(Task::Histogram);
        self.run_analysis();
    }

    // ---- contrast window ----

    /// Round to whole numbers for integer frames.
    #[must_use]
    pub fn snap_value(&self, value: f64) -> f64 {
        match &self.frame {
            Some(frame) if value.is_finite() && frame.dtype().is_integer() => value.round(),
            _ => value,
        }
    }

    fn clamp_to_stats(&self, value: f64) -> f64 {
        let value = self.snap_value(value);
        self.stats.as_ref().map_or(value, |s| s.clamp(value))
    }

    /// Window from the auto-contrast algorithm.
    pub fn apply_auto_levels(&mut self) {
        let Some(frame) = &self.frame else {
            return;
        };
        let stats = self.stats.as_ref();
        let levels = compute_auto_levels(frame, stats.and_then(|s| s.sat_max), stats);
        self.window.min = levels.min;
        self.window.max = levels.max;
    }

    /// Turn auto-scaling on or off; turning it on applies auto levels.
    pub fn set_auto_scale(&mut self, auto_scale: bool) {
        self.auto_scale = auto_scale;
        if auto_scale {
            self.apply_auto_levels();
        }
    }

    /// The auto-contrast button.
    pub fn auto_contrast(&mut self) {
        self.set_auto_scale(true);
    }

    /// Manually entered black level. The max follows if it would drop
    /// below the new min.
    pub fn set_min(&mut self, value: f64) {
        let value = self.clamp_to_stats(value);
        self.window.min = value;
        if self.window.max < value {
            self.window.max = value;
        }
        self.auto_scale = false;
    }

    /// Manually entered white level. The min follows if it would rise
    /// above the new max.
    pub fn set_max(&mut self, value: f64) {
        let value = self.clamp_to_stats(value);
        self.window.max = value;
        if self.window.min > value {
            self.window.min = value;
        }
        self.auto_scale = false;
    }

    pub fn set_invert(&mut self, invert: bool) {
        self.window.invert = invert;
    }

    pub fn set_colormap(&mut self, colormap: Colormap) {
        if colormap == self.window.colormap {
            return;
        }
        self.window.colormap = colormap;
        self.palette = Palette::build(colormap);
    }

    /// Switch the histogram x-axis between linear and symlog.
    pub fn set_hist_log_x(&mut self, log_x: bool) {
        self.hist_log_x = log_x;
        if let Some(frame) = &self.frame {
            self.stats = Some(compute_stats(frame, log_x));
        }
        self.coalescer.request(Task::Histogram);
    }

    /// Press on the histogram at `x` of an axis `width` pixels wide.
    pub fn begin_hist_drag(&mut self, x: f64, width: f64) -> bool {
        let Some(stats) = &self.stats else {
            return false;
        };
        let min_x = stats.value_to_x(self.window.min, width);
        let max_x = stats.value_to_x(self.window.max, width);
        match HistTarget::pick(x, min_x, max_x) {
            Some(target) => self.interaction.begin_hist_drag(target),
            None => false,
        }
    }

    /// Drag the grabbed histogram marker to `x`.
    pub fn update_hist_drag(&mut self, x: f64, width: f64) {
        let Interaction::HistDragging { target } = self.interaction else {
            return;
        };
        let Some(stats) = &self.stats else {
            return;
        };
        let (lo, hi) = (stats.min, stats.max);
        let value = self.snap_value(stats.x_to_value(x, width));
        if !value.is_finite() {
            return;
        }
        match target {
            HistTarget::Min => self.window.min = value.min(self.window.max).max(lo),
            HistTarget::Max => self.window.max = value.max(self.window.min).min(hi),
        }
        self.auto_scale = false;
        self.coalescer.request(Task::Histogram);
    }

    // ---- ROI and peaks ----

    /// Change the ROI shape.
    pub fn set_roi_mode(&mut self, mode: RoiMode) {
        self.roi.set_mode(mode);
        self.coalescer.request(Task::RoiOverlay);
        self.coalescer.request(Task::RoiStats);
    }

    /// Recompute ROI statistics after editing the ROI through
    /// [`ViewerState::roi_mut`].
    pub fn refresh_roi(&mut self) -> Option<&RoiResult> {
        self.coalescer.request(Task::RoiOverlay);
        self.coalescer.request(Task::RoiStats);
        self.run_analysis();
        self.roi.result()
    }

    /// Primary-button press on the image at `point`. `roi_trigger` is the
    /// ROI drawing gesture (right-drag or ctrl-drag). Returns the
    /// interaction that started.
    pub fn pointer_down(&mut self, point: Point, zoom: f64, roi_trigger: bool) -> Interaction {
        if !self.interaction.is_idle() {
            return self.interaction;
        }
        if roi_trigger && self.roi.begin_draw(point) {
            self.interaction.begin_roi_drag();
        } else if self.roi.is_active() {
            let handle = self.roi.handle_at(point, zoom);
            if (handle.is_some() || self.roi.contains(point, zoom))
                && self.roi.start_edit_drag(handle, point)
            {
                if let Some(handle) = self.roi.edit_handle() {
                    self.interaction.begin_roi_edit(handle);
                }
            } else {
                self.interaction.begin_pan();
            }
        } else {
            self.interaction.begin_pan();
        }
        self.interaction
    }

    /// Pointer moved to `point`.
    pub fn pointer_move(&mut self, point: Point) {
        let (w, h) = self.frame_size();
        match self.interaction {
            Interaction::RoiDragging => self.roi.update_draw(point),
            Interaction::RoiEditing { .. } => self.roi.update_edit_drag(point, w, h),
            Interaction::Panning => {
                self.coalescer.request(Task::Overview);
                return;
            }
            _ => return,
        }
        self.coalescer.request(Task::RoiOverlay);
        self.coalescer.request(Task::RoiStats);
    }

    /// Pointer released; ends whatever interaction was active.
    pub fn pointer_up(&mut self) -> Interaction {
        let ended = self.interaction.end();
        match ended {
            Interaction::RoiDragging => self.roi.end_draw(),
            Interaction::RoiEditing { .. } => self.roi.end_edit_drag(),
            Interaction::Panning => {
                self.coalescer.request(Task::PixelOverlay);
            }
            _ => {}
        }
        if matches!(
            ended,
            Interaction::RoiDragging | Interaction::RoiEditing { .. }
        ) {
            self.coalescer.request(Task::RoiStats);
            self.run_analysis();
        }
        ended
    }

    /// Enable or disable peak detection.
    pub fn set_peaks_enabled(&mut self, enabled: bool) {
        self.peaks.set_enabled(enabled);
        if enabled {
            self.coalescer.request(Task::Peaks);
            self.run_analysis();
        }
    }

    /// Change the requested peak count and re-detect.
    pub fn set_peak_count(&mut self, count: usize) {
        self.peaks.set_count(count);
        self.coalescer.request(Task::Peaks);
        self.run_analysis();
    }

    /// Run ROI statistics and peak detection if they are due.
    fn run_analysis(&mut self) {
        let Some(frame) = &self.frame else {
            return;
        };
        let (w, h) = (frame.width(), frame.height());
        let mask = self.mask.active(w, h);
        if self.coalescer.take(Task::RoiStats) {
            self.roi.update(frame, mask);
        }
        if self.coalescer.take(Task::Peaks) {
            self.peaks.detect(frame, mask);
        }
    }

    /// Clear and return the display tasks due this tick (overview,
    /// histogram, overlays).
    pub fn take_redraws(&mut self) -> Vec<Task> {
        self.run_analysis();
        self.coalescer.drain()
    }

    // ---- playback ----

    /// Start or stop playback.
    pub fn set_playing(&mut self, playing: bool) -> bool {
        if playing {
            self.playback.play(self.source.frame_count)
        } else {
            self.playback.stop();
            false
        }
    }

    pub fn set_fps(&mut self, fps: u32) {
        self.playback = self.playback.with_fps(fps);
    }

    pub fn set_frame_step(&mut self, step: usize) {
        self.playback = self.playback.with_step(step);
    }

    /// Playback timer fired: request the next frame.
    pub fn playback_tick(&mut self) -> Option<FrameTicket> {
        if !self.playback.is_playing() {
            return None;
        }
        let current = self.scheduler.loaded().unwrap_or(self.source.frame_index);
        let next = self
            .playback
            .next_index(current, self.source.frame_count);
        self.request_frame(next)
    }

    // ---- output ----

    /// Render the current frame.
    ///
    /// # Errors
    /// Returns [`ViewerError::NoFrame`] before the first frame, or the
    /// renderer's error.
    pub fn render(&mut self) -> Result<RgbaImage> {
        let frame = self.frame.as_ref().ok_or(ViewerError::NoFrame)?;
        let mask = self.mask.active(frame.width(), frame.height());
        let view = FrameView::new(frame).with_mask(mask);
        let params = ContrastParams {
            window: self.window,
            palette: &self.palette,
        };
        Ok(self.renderer.render(view, params)?)
    }

    /// Render and save the current frame as PNG.
    ///
    /// # Errors
    /// Returns an error if rendering or writing fails.
    pub fn export_png<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let image = self.render()?;
        export::write_png(path, &image)
    }

    /// Write the peak list CSV into `dir`, returning the file path.
    ///
    /// # Errors
    /// Returns an error if there are no peaks or the file cannot be written.
    pub fn export_peaks_csv<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let csv = export::peaks_to_csv(self.peaks.peaks())?;
        let path = dir.as_ref().join(self.source.export_source().peak_csv_name());
        export::write_text(&path, &csv)?;
        Ok(path)
    }

    /// Write the ROI profile CSV into `dir`, returning the file path.
    ///
    /// # Errors
    /// Returns an error if there is no ROI data or the file cannot be
    /// written.
    pub fn export_roi_csv<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let mode = self.roi.mode();
        let csv = export::roi_to_csv(mode, self.roi.result())?;
        let path = dir.as_ref().join(self.source.export_source().roi_csv_name(mode));
        export::write_text(&path, &csv)?;
        Ok(path)
    }
}

//! Frame-load scheduling, playback timing and redraw coalescing.
//!
//! [`FrameScheduler`] keeps at most one frame request in flight. Requests
//! made while one is outstanding replace each other, and only the latest
//! is issued once the current load finishes. Every request carries a
//! generation number; switching file, dataset or threshold bumps the
//! generation so late responses for the old selection are rejected.
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use std::time::Duration;

use crate::config::{MAX_FPS, MIN_FPS};

/// Shortest playback interval.
pub const MIN_PLAYBACK_INTERVAL: Duration = Duration::from_millis(50);

/// Handle for one issued frame request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTicket {
    generation: u64,
    index: usize,
}

impl FrameTicket {
    /// Frame index to load.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Outcome of a finished request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The response belongs to the current selection and should be shown.
    /// `next` is the queued request to issue now, if any.
    Apply { next: Option<FrameTicket> },
    /// The response is for a superseded selection or request; drop it.
    Stale,
}

/// Latest-wins frame request scheduler.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    generation: u64,
    frame_count: usize,
    loaded: Option<usize>,
    in_flight: Option<FrameTicket>,
    pending: Option<usize>,
}

impl FrameScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new selection (file, dataset or threshold) with
    /// `frame_count` frames. Outstanding requests become stale.
    pub fn reset(&mut self, frame_count: usize) {
        self.generation += 1;
        self.frame_count = frame_count;
        self.loaded = None;
        self.in_flight = None;
        self.pending = None;
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Index of the last applied frame.
    #[must_use]
    pub fn loaded(&self) -> Option<usize> {
        self.loaded
    }

    /// Index queued behind the request in flight.
    #[must_use]
    pub fn pending(&self) -> Option<usize> {
        self.pending
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    fn clamp(&self, index: usize) -> usize {
        index.min(self.frame_count.saturating_sub(1))
    }

    fn issue(&mut self, index: usize) -> FrameTicket {
        let ticket = FrameTicket {
            generation: self.generation,
            index,
        };
        self.in_flight = Some(ticket);
        ticket
    }

    /// Request frame `index` (clamped to the stack). Returns a ticket to
    /// load now, or `None` if the request was queued behind the one in
    /// flight.
    pub fn request(&mut self, index: usize) -> Option<FrameTicket> {
        let index = self.clamp(index);
        if self.in_flight.is_some() {
            self.pending = Some(index);
            return None;
        }
        self.pending = None;
        Some(self.issue(index))
    }

    /// Whether a response for `ticket` may still be applied.
    #[must_use]
    pub fn accepts(&self, ticket: FrameTicket) -> bool {
        self.in_flight == Some(ticket)
    }

    /// Record a successful response.
    pub fn complete(&mut self, ticket: FrameTicket) -> Completion {
        if !self.accepts(ticket) {
            log::debug!(
                "dropping stale frame {} (generation {}, current {})",
                ticket.index,
                ticket.generation,
                self.generation
            );
            return Completion::Stale;
        }
        self.in_flight = None;
        self.loaded = Some(ticket.index);
        Completion::Apply {
            next: self.next_pending(),
        }
    }

    /// Record a failed request. Returns the queued request to issue, if any.
    pub fn fail(&mut self, ticket: FrameTicket) -> Option<FrameTicket> {
        if !self.accepts(ticket) {
            return None;
        }
        self.in_flight = None;
        self.next_pending()
    }

    fn next_pending(&mut self) -> Option<FrameTicket> {
        let pending = self.pending.take()?;
        if self.loaded == Some(pending) {
            return None;
        }
        Some(self.issue(pending))
    }
}

/// Auto-advance settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Playback {
    playing: bool,
    fps: u32,
    step: usize,
}

impl Default for Playback {
    fn default() -> Self {
        Self {
            playing: false,
            fps: MAX_FPS,
            step: 1,
        }
    }
}

impl Playback {
    #[must_use]
    pub fn new(fps: u32) -> Self {
        Self::default().with_fps(fps)
    }

    /// Set the rate, clamped to `1..=10`.
    #[must_use]
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps.clamp(MIN_FPS, MAX_FPS);
        self
    }

    /// Set the frame step, at least 1.
    #[must_use]
    pub fn with_step(mut self, step: usize) -> Self {
        self.step = step.max(1);
        self
    }

    #[must_use]
    pub fn fps(&self) -> u32 {
        self.fps
    }

    #[must_use]
    pub fn step(&self) -> usize {
        self.step
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Start playback. Single-frame stacks never play.
    pub fn play(&mut self, frame_count: usize) -> bool {
        self.playing = frame_count > 1;
        self.playing
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    /// Timer interval: `max(1000 / fps, 50)` ms.
    #[must_use]
    pub fn interval(&self) -> Duration {
        let ms = (1000.0 / f64::from(self.fps)).round() as u64;
        Duration::from_millis(ms).max(MIN_PLAYBACK_INTERVAL)
    }

    /// Frame after `current`, wrapping to 0 past the end.
    #[must_use]
    pub fn next_index(&self, current: usize, frame_count: usize) -> usize {
        let next = current + self.step;
        if next >= frame_count {
            0
        } else {
            next
        }
    }
}

/// Deferred recomputation that runs at most once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Overview,
    Histogram,
    PixelOverlay,
    RoiOverlay,
    RoiStats,
    Peaks,
}

impl Task {
    pub const ALL: [Task; 6] = [
        Task::Overview,
        Task::Histogram,
        Task::PixelOverlay,
        Task::RoiOverlay,
        Task::RoiStats,
        Task::Peaks,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Coalesces bursts of recompute requests into one run per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Coalescer {
    scheduled: u8,
}

impl Coalescer {
    /// Mark `task` as due. Returns `true` if it was not already scheduled,
    /// i.e. the caller must arrange a tick.
    pub fn request(&mut self, task: Task) -> bool {
        let was = self.scheduled & task.bit() != 0;
        self.scheduled |= task.bit();
        !was
    }

    /// Clear `task`, returning whether it was scheduled.
    pub fn take(&mut self, task: Task) -> bool {
        let was = self.scheduled & task.bit() != 0;
        self.scheduled &= !task.bit();
        was
    }

    /// Clear and return every scheduled task.
    pub fn drain(&mut self) -> Vec<Task> {
        Task::ALL.into_iter().filter(|&t| self.take(t)).collect()
    }

    #[must_use]
    pub fn is_scheduled(&self, task: Task) -> bool {
        self.scheduled & task.bit() != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_wins() {
        let mut scheduler = FrameScheduler::new();
        scheduler.reset(100);
        let first = scheduler.request(3).unwrap();
        assert!(scheduler.request(4).is_none());
        assert!(scheduler.request(9).is_none());
        assert_eq!(scheduler.pending(), Some(9));

        let Completion::Apply { next } = scheduler.complete(first) else {
            panic!("first response rejected");
        };
        let next = next.unwrap();
        assert_eq!(next.index(), 9);
        assert_eq!(scheduler.loaded(), Some(3));
        assert_eq!(scheduler.complete(next), Completion::Apply { next: None });
        assert!(!scheduler.is_loading());
    }

    #[test]
    fn test_pending_same_as_loaded_is_dropped() {
        let mut scheduler = FrameScheduler::new();
        scheduler.reset(10);
        let ticket = scheduler.request(2).unwrap();
        scheduler.request(2);
        assert_eq!(scheduler.complete(ticket), Completion::Apply { next: None });
    }

    #[test]
    fn test_stale_after_reset() {
        let mut scheduler = FrameScheduler::new();
        scheduler.reset(10);
        let old = scheduler.request(5).unwrap();
        scheduler.reset(4);
        let fresh = scheduler.request(5).unwrap();
        assert_eq!(fresh.index(), 3);
        assert_eq!(scheduler.complete(old), Completion::Stale);
        assert!(scheduler.is_loading());
        assert!(matches!(scheduler.complete(fresh), Completion::Apply { .. }));
    }

    #[test]
    fn test_failure_issues_pending() {
        let mut scheduler = FrameScheduler::new();
        scheduler.reset(10);
        let ticket = scheduler.request(1).unwrap();
        scheduler.request(7);
        let next = scheduler.fail(ticket).unwrap();
        assert_eq!(next.index(), 7);
        assert_eq!(scheduler.loaded(), None);
    }

    #[test]
    fn test_playback_interval_and_wrap() {
        let playback = Playback::new(10).with_step(3);
        assert_eq!(playback.interval(), Duration::from_millis(100));
        assert_eq!(Playback::new(1).interval(), Duration::from_millis(1000));
        assert_eq!(Playback::new(50).fps(), 10);
        assert_eq!(playback.next_index(5, 10), 8);
        assert_eq!(playback.next_index(8, 10), 0);
        assert_eq!(Playback::default().with_step(0).step(), 1);
    }

    #[test]
    fn test_single_frame_does_not_play() {
        let mut playback = Playback::default();
        assert!(!playback.play(1));
        assert!(playback.play(2));
        playback.stop();
        assert!(!playback.is_playing());
    }

    #[test]
    fn test_coalescer() {
        let mut coalescer = Coalescer::default();
        assert!(coalescer.request(Task::Histogram));
        assert!(!coalescer.request(Task::Histogram));
        assert!(coalescer.request(Task::RoiStats));
        assert_eq!(coalescer.drain(), vec![Task::Histogram, Task::RoiStats]);
        assert!(!coalescer.take(Task::Histogram));
        assert!(coalescer.request(Task::Histogram));
    }
}

//! Mask availability and enable state.
//!
//! A mask is *available* when one is loaded and its shape equals the
//! frame shape. It is *enabled* when available and either the user turned
//! it on or automatic mode is still in effect. Toggling by hand leaves
//! automatic mode.

use albis_core::{Frame, Mask};

/// Where the loaded mask came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskOrigin {
    /// Read from a mask dataset; holds the dataset path.
    Dataset(String),
    /// Synthesized from negative pixel values of the frame.
    Sentinel,
}

/// Loaded mask plus its availability and enable flags.
#[derive(Debug, Clone)]
pub struct MaskState {
    mask: Option<Mask>,
    origin: Option<MaskOrigin>,
    key: String,
    available: bool,
    enabled: bool,
    auto: bool,
}

impl Default for MaskState {
    fn default() -> Self {
        Self {
            mask: None,
            origin: None,
            key: String::new(),
            available: false,
            enabled: false,
            auto: true,
        }
    }
}

impl MaskState {
    #[must_use]
    pub fn mask(&self) -> Option<&Mask> {
        self.mask.as_ref()
    }

    #[must_use]
    pub fn origin(&self) -> Option<&MaskOrigin> {
        self.origin.as_ref()
    }

    /// Key of the loaded mask (file path, `path#threshold` for
    /// multi-threshold data).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn is_auto(&self) -> bool {
        self.auto
    }

    /// Mask to apply to a `width` x `height` frame, if enabled and aligned.
    #[must_use]
    pub fn active(&self, width: usize, height: usize) -> Option<&Mask> {
        self.mask
            .as_ref()
            .filter(|m| self.enabled && m.matches(width, height))
    }

    /// Recompute availability for a frame shape. When available, `force`
    /// or automatic mode turns the mask on.
    pub fn sync(&mut self, width: usize, height: usize, force: bool) {
        self.available = self.mask.as_ref().is_some_and(|m| m.matches(width, height));
        if !self.available {
            self.enabled = false;
        } else if force || self.auto {
            self.enabled = true;
        }
    }

    /// Drop the mask and return to automatic mode.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Re-enter automatic mode, e.g. after opening a new dataset.
    pub fn reset_auto(&mut self) {
        self.auto = true;
    }

    /// Forget the key so the next [`MaskState::needs_load`] asks for a
    /// fresh mask.
    pub fn invalidate(&mut self) {
        self.key.clear();
    }

    /// User toggle. Leaves automatic mode.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled && self.available;
        self.auto = false;
    }

    /// Whether the mask for `key` still has to be fetched.
    #[must_use]
    pub fn needs_load(&self, key: &str) -> bool {
        self.mask.is_none() || self.key != key
    }

    /// Install a fetched mask and sync it against `frame`.
    pub fn install(
        &mut self,
        mask: Mask,
        key: &str,
        origin: MaskOrigin,
        frame: Option<&Frame>,
        force: bool,
    ) {
        self.mask = Some(mask);
        self.key = key.to_string();
        self.origin = Some(origin);
        if let Some(frame) = frame {
            self.align(frame.width(), frame.height());
            self.sync(frame.width(), frame.height(), force);
        }
    }

    /// A mask fetch failed: keep showing the frame, unmasked.
    pub fn load_failed(&mut self, key: &str) {
        log::warn!("mask unavailable for {key}");
        self.enabled = false;
    }

    /// Fall back to a sentinel mask when no mask dataset is loaded.
    pub fn adopt_sentinels(&mut self, frame: &Frame) {
        if matches!(self.origin, Some(MaskOrigin::Dataset(_))) {
            return;
        }
        match Mask::from_negative_values(frame.width(), frame.height(), frame.data()) {
            Some(mask) => {
                self.mask = Some(mask);
                self.origin = Some(MaskOrigin::Sentinel);
            }
            None if self.origin == Some(MaskOrigin::Sentinel) => {
                self.mask = None;
                self.origin = None;
            }
            None => {}
        }
    }

    /// Transpose a mask stored as the transpose of the frame. Masks of any
    /// other shape are kept but stay unavailable.
    pub fn align(&mut self, width: usize, height: usize) {
        let Some(mask) = self.mask.take() else {
            return;
        };
        let transposed = mask.width() == height && mask.height() == width;
        if mask.matches(width, height) || !transposed {
            if !mask.matches(width, height) {
                log::warn!(
                    "mask {}x{} does not fit frame {width}x{height}",
                    mask.width(),
                    mask.height()
                );
            }
            self.mask = Some(mask);
            return;
        }
        match mask.align_to(width, height) {
            Ok(aligned) => self.mask = Some(aligned),
            Err(e) => log::warn!("{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(width: usize, height: usize) -> Mask {
        Mask::new(width, height, vec![0; width * height]).unwrap()
    }

    #[test]
    fn test_auto_enable_on_matching_shape() {
        let frame = Frame::new(4, 2, vec![0u16; 8]).unwrap();
        let mut state = MaskState::default();
        state.install(mask(4, 2), "a.h5", MaskOrigin::Dataset("/m".into()), Some(&frame), false);
        assert!(state.is_available());
        assert!(state.is_enabled());
        assert!(state.active(4, 2).is_some());
    }

    #[test]
    fn test_transposed_mask_is_aligned() {
        let frame = Frame::new(4, 2, vec![0u16; 8]).unwrap();
        let mut state = MaskState::default();
        state.install(mask(2, 4), "a.h5", MaskOrigin::Dataset("/m".into()), Some(&frame), true);
        assert_eq!(state.mask().map(Mask::shape), Some([2, 4]));
        assert!(state.is_enabled());
    }

    #[test]
    fn test_mismatch_disables() {
        let mut state = MaskState::default();
        state.install(mask(3, 3), "a.h5", MaskOrigin::Dataset("/m".into()), None, true);
        state.sync(4, 2, true);
        assert!(!state.is_available());
        assert!(!state.is_enabled());
        assert!(state.active(4, 2).is_none());
    }

    #[test]
    fn test_user_toggle_leaves_auto() {
        let mut state = MaskState::default();
        state.install(mask(2, 2), "a.h5", MaskOrigin::Dataset("/m".into()), None, false);
        state.sync(2, 2, false);
        state.set_enabled(false);
        assert!(!state.is_auto());
        state.sync(2, 2, false);
        assert!(!state.is_enabled());
        state.sync(2, 2, true);
        assert!(state.is_enabled());
    }

    #[test]
    fn test_needs_load_by_key() {
        let mut state = MaskState::default();
        assert!(state.needs_load("a.h5"));
        state.install(mask(2, 2), "a.h5#0", MaskOrigin::Dataset("/m".into()), None, false);
        assert!(!state.needs_load("a.h5#0"));
        assert!(state.needs_load("a.h5#1"));
        state.invalidate();
        assert!(state.needs_load("a.h5#0"));
    }

    #[test]
    fn test_sentinel_fallback() {
        let frame = Frame::new(2, 2, vec![5i32, -1, -2, 7]).unwrap();
        let mut state = MaskState::default();
        state.adopt_sentinels(&frame);
        assert_eq!(state.origin(), Some(&MaskOrigin::Sentinel));
        state.sync(2, 2, false);
        assert!(state.is_enabled());

        let clean = Frame::new(2, 2, vec![5i32, 1, 2, 7]).unwrap();
        state.adopt_sentinels(&clean);
        assert!(state.mask().is_none());
    }

    #[test]
    fn test_clear() {
        let mut state = MaskState::default();
        state.install(mask(2, 2), "a.h5", MaskOrigin::Dataset("/m".into()), None, false);
        state.set_enabled(true);
        state.clear();
        assert!(state.mask().is_none());
        assert!(state.is_auto());
        assert!(!state.is_enabled());
        assert_eq!(state.key(), "");
    }
}

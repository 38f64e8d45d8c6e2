//! Last-known layout bookkeeping.
//!
//! The context always records the layout and access mask each barrier leaves
//! an image in. In strict mode the recorder also checks every barrier, clear,
//! render pass and descriptor bind against that record and fails before the
//! command is recorded.
//!
//! Changes made while recording are staged. They become the committed state
//! when the command buffer is submitted and are dropped when the recording is
//! abandoned.

use std::collections::HashMap;

use ash::vk;

use crate::barrier::Transition;
use crate::error::{HarnessError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageState {
    pub layout: vk::ImageLayout,
    pub access: vk::AccessFlags,
}

impl Default for ImageState {
    fn default() -> Self {
        Self {
            layout: vk::ImageLayout::UNDEFINED,
            access: vk::AccessFlags::empty(),
        }
    }
}

#[derive(Debug, Default)]
pub struct LayoutTracker {
    states: HashMap<vk::Image, ImageState>,
    staged: HashMap<vk::Image, ImageState>,
}

impl LayoutTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `image` including staged changes; images never seen are UNDEFINED.
    pub fn state(&self, image: vk::Image) -> ImageState {
        self.staged
            .get(&image)
            .or_else(|| self.states.get(&image))
            .copied()
            .unwrap_or_default()
    }

    /// State of `image` as of the last submission.
    pub fn committed(&self, image: vk::Image) -> ImageState {
        self.states.get(&image).copied().unwrap_or_default()
    }

    /// Check that `transition` starts from the layout `image` is in.
    /// A transition from UNDEFINED is always valid since it discards contents.
    pub fn check(&self, image: vk::Image, transition: &Transition) -> Result<()> {
        check_transition(image, self.state(image).layout, transition)
    }

    /// Check that `image` is in one of `allowed`.
    pub fn expect(&self, image: vk::Image, allowed: &[vk::ImageLayout]) -> Result<()> {
        let current = self.state(image).layout;
        if allowed.contains(&current) {
            return Ok(());
        }
        Err(HarnessError::LayoutMismatch {
            image,
            expected: allowed.first().copied().unwrap_or(vk::ImageLayout::UNDEFINED),
            actual: current,
        })
    }

    pub fn apply(&mut self, image: vk::Image, transition: &Transition) {
        self.set(image, transition.new_layout, transition.dst_access);
    }

    /// Stage the transitions of one pipeline barrier in order, so a later
    /// entry for the same image starts from the layout an earlier one left.
    /// With `strict` every entry is checked first; on a mismatch nothing
    /// from the batch is staged.
    pub fn apply_batch(&mut self, batch: &[(vk::Image, Transition)], strict: bool) -> Result<()> {
        let mut scratch: HashMap<vk::Image, ImageState> = HashMap::new();
        for (image, transition) in batch {
            if strict {
                let current = scratch.get(image).copied().unwrap_or_else(|| self.state(*image));
                check_transition(*image, current.layout, transition)?;
            }
            scratch.insert(
                *image,
                ImageState {
                    layout: transition.new_layout,
                    access: transition.dst_access,
                },
            );
        }
        self.staged.extend(scratch);
        Ok(())
    }

    pub fn set(&mut self, image: vk::Image, layout: vk::ImageLayout, access: vk::AccessFlags) {
        self.staged.insert(image, ImageState { layout, access });
    }

    /// Make the staged changes the committed state.
    pub fn commit(&mut self) {
        self.states.extend(self.staged.drain());
    }

    /// Discard the staged changes.
    pub fn rollback(&mut self) {
        self.staged.clear();
    }

    pub fn has_staged(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Drop the record for a destroyed image so a recycled handle starts fresh.
    pub fn forget(&mut self, image: vk::Image) {
        self.states.remove(&image);
        self.staged.remove(&image);
    }

    /// Number of images with a committed state.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

fn check_transition(image: vk::Image, current: vk::ImageLayout, transition: &Transition) -> Result<()> {
    if transition.old_layout == vk::ImageLayout::UNDEFINED || current == transition.old_layout {
        return Ok(());
    }
    Err(HarnessError::LayoutMismatch {
        image,
        expected: transition.old_layout,
        actual: current,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn image(raw: u64) -> vk::Image {
        vk::Image::from_raw(raw)
    }

    #[test]
    fn unseen_images_are_undefined() {
        let tracker = LayoutTracker::new();
        assert_eq!(tracker.state(image(1)), ImageState::default());
        assert!(tracker.is_empty());
    }

    #[test]
    fn texture_sequence_is_accepted() {
        let mut tracker = LayoutTracker::new();
        let tex = image(7);
        for t in [Transition::TRANSFER_DST, Transition::SHADER_READ, Transition::SAMPLED_HOST_READ] {
            tracker.check(tex, &t).unwrap();
            tracker.apply(tex, &t);
        }
        tracker.commit();
        let state = tracker.state(tex);
        assert_eq!(state.layout, vk::ImageLayout::GENERAL);
        assert_eq!(state.access, vk::AccessFlags::HOST_READ);
    }

    #[test]
    fn skipped_transition_is_rejected() {
        let tracker = LayoutTracker::new();
        // shader read expects TRANSFER_DST_OPTIMAL, image is still UNDEFINED
        let err = tracker.check(image(3), &Transition::SHADER_READ).unwrap_err();
        match err {
            HarnessError::LayoutMismatch { expected, actual, .. } => {
                assert_eq!(expected, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
                assert_eq!(actual, vk::ImageLayout::UNDEFINED);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn undefined_source_always_allowed() {
        let mut tracker = LayoutTracker::new();
        let rt = image(9);
        tracker.set(rt, vk::ImageLayout::GENERAL, vk::AccessFlags::HOST_READ);
        assert!(tracker.check(rt, &Transition::ATTACHMENT_WRITE).is_ok());
    }

    #[test]
    fn expect_lists_allowed_layouts() {
        let mut tracker = LayoutTracker::new();
        let rt = image(4);
        tracker.apply(rt, &Transition::TRANSFER_DST);
        assert!(tracker
            .expect(rt, &[vk::ImageLayout::GENERAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL])
            .is_ok());
        assert!(tracker.expect(rt, &[vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL]).is_err());
    }

    #[test]
    fn forget_resets_state() {
        let mut tracker = LayoutTracker::new();
        let rt = image(5);
        tracker.apply(rt, &Transition::ATTACHMENT_WRITE);
        tracker.commit();
        assert_eq!(tracker.len(), 1);
        tracker.forget(rt);
        assert_eq!(tracker.state(rt).layout, vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn rollback_discards_staged_layouts() {
        let mut tracker = LayoutTracker::new();
        let tex = image(11);
        tracker.apply(tex, &Transition::TRANSFER_DST);
        tracker.commit();

        tracker.apply(tex, &Transition::SHADER_READ);
        assert_eq!(tracker.state(tex).layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(tracker.committed(tex).layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

        tracker.rollback();
        assert!(!tracker.has_staged());
        assert_eq!(tracker.state(tex).layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        // the abandoned transition can be recorded again
        tracker.check(tex, &Transition::SHADER_READ).unwrap();
    }

    #[test]
    fn batch_entries_chain_in_order() {
        let mut tracker = LayoutTracker::new();
        let tex = image(12);
        let batch = [(tex, Transition::TRANSFER_DST), (tex, Transition::SHADER_READ)];
        tracker.apply_batch(&batch, true).unwrap();
        assert_eq!(tracker.state(tex).layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn failed_batch_stages_nothing() {
        let mut tracker = LayoutTracker::new();
        let (rt, tex) = (image(13), image(14));
        let batch = [(rt, Transition::ATTACHMENT_WRITE), (tex, Transition::SHADER_READ)];
        assert!(matches!(
            tracker.apply_batch(&batch, true),
            Err(HarnessError::LayoutMismatch { .. })
        ));
        assert!(!tracker.has_staged());

        // without strict checking the same batch is simply recorded
        tracker.apply_batch(&batch, false).unwrap();
        assert_eq!(tracker.state(tex).layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }
}

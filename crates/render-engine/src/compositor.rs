//! Frame compositor: merges the screen frame with the camera overlay.
//!
//! Layout decisions are computed by [`plan_composition`] without touching
//! pixels, then [`compose`] carries them out.

use image::imageops::{self, FilterType};
use tarantino_frame_model::{FrameBuffer, OverlayRect, OverlayState, Resolution, SourceTag};

/// Filter used when scaling the camera overlay.
const OVERLAY_FILTER: FilterType = FilterType::Triangle;

/// What the compositor does for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionPlan {
    /// Base frame as captured.
    BaseOnly,
    /// Overlay stretched over the full output.
    OverlayFill,
    /// Overlay pasted into `rect` on top of the base.
    Overlay { rect: OverlayRect },
    /// Overlay would leave the base frame; base returned unmodified.
    OverlaySkipped { rect: OverlayRect },
}

/// Decide how to compose a frame of size `base` given the layout and whether
/// an overlay frame is available.
pub fn plan_composition(
    base: Resolution,
    overlay_available: bool,
    layout: &OverlayState,
) -> CompositionPlan {
    if !overlay_available {
        return CompositionPlan::BaseOnly;
    }
    if layout.fills_frame {
        return CompositionPlan::OverlayFill;
    }
    if !layout.enabled {
        return CompositionPlan::BaseOnly;
    }
    let rect = layout.rect();
    if rect.fits_within(base) {
        CompositionPlan::Overlay { rect }
    } else {
        CompositionPlan::OverlaySkipped { rect }
    }
}

/// Merge `base` and an optional `overlay` according to `layout`.
///
/// The result always has the base resolution and timestamp, tagged
/// [`SourceTag::Composite`].
pub fn compose(
    base: FrameBuffer,
    overlay: Option<FrameBuffer>,
    layout: &OverlayState,
) -> FrameBuffer {
    let target = base.resolution();
    let timestamp_ns = base.timestamp_ns;
    let plan = plan_composition(target, overlay.is_some(), layout);

    match (plan, overlay) {
        (CompositionPlan::OverlayFill, Some(overlay)) => overlay
            .resized(target, OVERLAY_FILTER)
            .with_timestamp(timestamp_ns)
            .with_source(SourceTag::Composite),
        (CompositionPlan::Overlay { rect }, Some(overlay)) => {
            let scaled = overlay.resized(Resolution::new(rect.width, rect.height), OVERLAY_FILTER);
            let mut out = base;
            imageops::replace(&mut out.image, &scaled.image, rect.x as i64, rect.y as i64);
            out.with_source(SourceTag::Composite)
        }
        (CompositionPlan::OverlaySkipped { rect }, _) => {
            tracing::trace!(
                x = rect.x,
                y = rect.y,
                width = rect.width,
                height = rect.height,
                "Overlay out of bounds, skipped"
            );
            base.with_source(SourceTag::Composite)
        }
        _ => base.with_source(SourceTag::Composite),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> FrameBuffer {
        FrameBuffer::filled(Resolution::new(64, 48), [10, 10, 10], 5, SourceTag::Screen)
    }

    fn camera() -> FrameBuffer {
        FrameBuffer::filled(Resolution::new(32, 24), [200, 50, 50], 9, SourceTag::Camera)
    }

    fn layout(x: i32, y: i32, scale: f32) -> OverlayState {
        OverlayState {
            x,
            y,
            scale,
            nominal: Resolution::new(16, 12),
            enabled: true,
            fills_frame: false,
        }
    }

    #[test]
    fn no_overlay_returns_base_as_composite() {
        let out = compose(base(), None, &layout(0, 0, 1.0));
        assert_eq!(out.image, base().image);
        assert_eq!(out.source, SourceTag::Composite);
        assert_eq!(out.timestamp_ns, 5);
    }

    #[test]
    fn overlay_lands_at_position_with_scaled_size() {
        let out = compose(base(), Some(camera()), &layout(8, 4, 1.5));
        // 16x12 * 1.5 = 24x18 at (8, 4)
        assert_eq!(out.image.get_pixel(8, 4).0, [200, 50, 50]);
        assert_eq!(out.image.get_pixel(31, 21).0, [200, 50, 50]);
        assert_eq!(out.image.get_pixel(32, 21).0, [10, 10, 10]);
        assert_eq!(out.image.get_pixel(31, 22).0, [10, 10, 10]);
        assert_eq!(out.image.get_pixel(7, 4).0, [10, 10, 10]);
    }

    #[test]
    fn out_of_bounds_overlay_is_skipped() {
        for (x, y) in [(-1, 0), (0, -1), (49, 0), (0, 37)] {
            let out = compose(base(), Some(camera()), &layout(x, y, 1.0));
            assert_eq!(out.image, base().image, "overlay at ({x}, {y}) should be skipped");
        }
    }

    #[test]
    fn disabled_overlay_is_ignored() {
        let mut state = layout(0, 0, 1.0);
        state.enabled = false;
        let out = compose(base(), Some(camera()), &state);
        assert_eq!(out.image, base().image);
    }

    #[test]
    fn fills_frame_stretches_overlay_to_output() {
        let mut state = layout(0, 0, 1.0);
        state.fills_frame = true;
        let out = compose(base(), Some(camera()), &state);
        assert_eq!(out.resolution(), Resolution::new(64, 48));
        assert!(out.image.pixels().all(|p| p.0 == [200, 50, 50]));
        assert_eq!(out.timestamp_ns, 5);
    }

    #[test]
    fn fills_frame_without_overlay_falls_back_to_base() {
        let mut state = layout(0, 0, 1.0);
        state.fills_frame = true;
        assert_eq!(
            plan_composition(Resolution::new(64, 48), false, &state),
            CompositionPlan::BaseOnly
        );
        let out = compose(base(), None, &state);
        assert_eq!(out.image, base().image);
    }
}

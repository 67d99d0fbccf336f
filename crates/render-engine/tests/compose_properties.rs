use proptest::prelude::*;
use tarantino_frame_model::{FrameBuffer, OverlayState, Resolution, SourceTag};
use tarantino_render_engine::{compose, plan_composition, CompositionPlan};

const BASE: Resolution = Resolution::new(96, 64);
const BASE_RGB: [u8; 3] = [20, 30, 40];
const CAMERA_RGB: [u8; 3] = [240, 120, 0];

fn base() -> FrameBuffer {
    FrameBuffer::filled(BASE, BASE_RGB, 0, SourceTag::Screen)
}

fn camera() -> FrameBuffer {
    FrameBuffer::filled(Resolution::new(40, 30), CAMERA_RGB, 0, SourceTag::Camera)
}

fn layout(x: i32, y: i32, scale: f32) -> OverlayState {
    OverlayState {
        x,
        y,
        scale,
        nominal: Resolution::new(16, 16),
        enabled: true,
        fills_frame: false,
    }
}

proptest! {
    #[test]
    fn fitting_overlay_lands_exactly_at_position(
        x in -20i32..120,
        y in -20i32..90,
        scale in 0.25f32..3.0,
    ) {
        let state = layout(x, y, scale);
        let rect = state.rect();
        let out = compose(base(), Some(camera()), &state);
        prop_assert_eq!(out.resolution(), BASE);

        match plan_composition(BASE, true, &state) {
            CompositionPlan::Overlay { rect: placed } => {
                prop_assert!(rect.fits_within(BASE));
                prop_assert_eq!(placed, rect);
                let (x, y) = (rect.x as u32, rect.y as u32);
                // Corners of the pasted rectangle come from the camera.
                prop_assert_eq!(out.image.get_pixel(x, y).0, CAMERA_RGB);
                prop_assert_eq!(
                    out.image.get_pixel(x + rect.width - 1, y + rect.height - 1).0,
                    CAMERA_RGB
                );
                // Just outside it comes from the base.
                if x > 0 {
                    prop_assert_eq!(out.image.get_pixel(x - 1, y).0, BASE_RGB);
                }
                if x + rect.width < BASE.width {
                    prop_assert_eq!(out.image.get_pixel(x + rect.width, y).0, BASE_RGB);
                }
            }
            CompositionPlan::OverlaySkipped { .. } => {
                prop_assert!(!rect.fits_within(BASE));
                prop_assert_eq!(out.image, base().image);
            }
            other => prop_assert!(false, "unexpected plan {:?}", other),
        }
    }
}

use crate::random::RandomSource;
use serde::{Deserialize, Serialize};

const TEXT_WIDTH_MIN: u32 = 150;
const TEXT_WIDTH_SPAN: u32 = 200;
const TEXT_HEIGHT_MIN: u32 = 80;
const TEXT_HEIGHT_SPAN: u32 = 120;
const IMAGE_SCALE: f64 = 0.75;
const IMAGE_PAD_WIDTH: u32 = 20;
const IMAGE_PAD_HEIGHT: u32 = 40;

/// Usable area of the primary display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkArea {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for WorkArea {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupGeometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Size and place a popup. `image_size` is the native size of the attached
/// image, when there is one.
pub fn popup_geometry(
    work_area: WorkArea,
    image_size: Option<(u32, u32)>,
    rng: &mut dyn RandomSource,
) -> PopupGeometry {
    let mut width = rng.below(TEXT_WIDTH_SPAN) + TEXT_WIDTH_MIN;
    let mut height = rng.below(TEXT_HEIGHT_SPAN) + TEXT_HEIGHT_MIN;

    if let Some((native_width, native_height)) = image_size
        && native_width > 0
        && native_height > 0
    {
        width = scale(native_width) + IMAGE_PAD_WIDTH;
        height = scale(native_height) + IMAGE_PAD_HEIGHT;
    }

    let x = work_area.x.saturating_add(offset_within(work_area.width, width, rng));
    let y = work_area.y.saturating_add(offset_within(work_area.height, height, rng));

    PopupGeometry {
        x,
        y,
        width,
        height,
    }
}

fn scale(native: u32) -> u32 {
    (f64::from(native) * IMAGE_SCALE).floor() as u32
}

fn offset_within(available: u32, size: u32, rng: &mut dyn RandomSource) -> i32 {
    let slack = available.saturating_sub(size);
    i32::try_from(rng.below(slack)).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::{PopupGeometry, WorkArea, popup_geometry};
    use crate::random::{ScriptedRandom, StdRandom};

    #[test]
    fn text_popups_stay_within_size_bounds_and_work_area() {
        let area = WorkArea {
            x: 100,
            y: 50,
            width: 800,
            height: 600,
        };
        let mut rng = StdRandom::seeded(11);
        for _ in 0..2_000 {
            let g = popup_geometry(area, None, &mut rng);
            assert!((150..350).contains(&g.width));
            assert!((80..200).contains(&g.height));
            assert!(g.x >= 100 && g.x + g.width as i32 <= 900);
            assert!(g.y >= 50 && g.y + g.height as i32 <= 650);
        }
    }

    #[test]
    fn image_popups_scale_native_size() {
        let mut rng = ScriptedRandom::constant(0.0);
        let g = popup_geometry(WorkArea::default(), Some((400, 300)), &mut rng);
        assert_eq!(
            g,
            PopupGeometry {
                x: 0,
                y: 0,
                width: 320,
                height: 265,
            }
        );
    }

    #[test]
    fn zero_sized_image_keeps_random_size() {
        let mut rng = ScriptedRandom::constant(0.5);
        let g = popup_geometry(WorkArea::default(), Some((0, 0)), &mut rng);
        assert_eq!(g.width, 250);
        assert_eq!(g.height, 140);
    }

    #[test]
    fn oversized_popup_is_pinned_to_origin() {
        let area = WorkArea {
            x: 10,
            y: 20,
            width: 100,
            height: 100,
        };
        let mut rng = ScriptedRandom::constant(0.9);
        let g = popup_geometry(area, Some((1000, 1000)), &mut rng);
        assert_eq!((g.x, g.y), (10, 20));
    }

    #[test]
    fn far_offset_work_area_saturates_instead_of_overflowing() {
        let area = WorkArea {
            x: i32::MAX - 10,
            y: i32::MAX - 10,
            width: 1920,
            height: 1080,
        };
        let mut rng = ScriptedRandom::constant(0.9);
        let g = popup_geometry(area, None, &mut rng);
        assert_eq!((g.x, g.y), (i32::MAX, i32::MAX));
    }
}

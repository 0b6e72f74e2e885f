use image::{GrayImage, Luma, Rgb, RgbImage};
use mediaminer::models::{Rect, Region};
use mediaminer::pipeline::{Detector, ScanArea, scan_roi};
use proptest::prelude::*;

/// Reports boxes at fixed offsets from the scanned area, some spilling past it
struct Spill {
    boxes: Vec<(u32, u32, u32, u32)>,
}

impl Detector for Spill {
    fn scan(&mut self, _area: ScanArea<'_>) -> anyhow::Result<Vec<Region>> {
        Ok(self
            .boxes
            .iter()
            .filter_map(|&(x1, y1, x2, y2)| Rect::new(x1, y1, x2, y2))
            .map(|r| Region::labelled(r, "hit"))
            .collect())
    }
}

fn frame(width: u32, height: u32) -> (RgbImage, GrayImage) {
    (
        RgbImage::from_pixel(width, height, Rgb([1, 2, 3])),
        GrayImage::from_pixel(width, height, Luma([2])),
    )
}

proptest! {
    #[test]
    fn rescans_stay_inside_image_and_roi(
        width in 1u32..200,
        height in 1u32..200,
        x1 in 0u32..250,
        y1 in 0u32..250,
        w in 1u32..120,
        h in 1u32..120,
        boxes in proptest::collection::vec((0u32..150, 0u32..150, 0u32..150, 0u32..150), 0..6),
    ) {
        let (image, gray) = frame(width, height);
        let roi = Rect::new(x1, y1, x1 + w, y1 + h).unwrap();
        let mut detector = Spill { boxes };

        let regions = scan_roi(&mut detector, &image, &gray, roi).unwrap();
        let bounds = Rect::full(width, height).unwrap();
        for region in regions {
            prop_assert!(bounds.contains(&region.rect));
            prop_assert!(roi.contains(&region.rect));
            prop_assert!(region.rect.x1 >= roi.x1 && region.rect.y1 >= roi.y1);
        }
    }
}

use crate::models::Contour;
use image::{GrayImage, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};
use std::collections::HashMap;

/// Find contours in binary edge image using connected components.
///
/// Results are ordered top-to-bottom, then left-to-right, so the same image
/// always yields the same sequence.
pub fn find_contours(edges: &GrayImage, min_area: u32) -> Vec<Contour> {
    // Label connected components (white pixels = edges)
    let labeled = connected_components(edges, Connectivity::Eight, Luma([0]));

    let mut regions: HashMap<u32, (u32, u32, u32, u32, u32)> = HashMap::new();

    for (x, y, label) in labeled.enumerate_pixels() {
        let label_val = label[0];
        if label_val == 0 {
            continue; // Skip background
        }

        regions
            .entry(label_val)
            .and_modify(|(min_x, min_y, max_x, max_y, count)| {
                *min_x = (*min_x).min(x);
                *min_y = (*min_y).min(y);
                *max_x = (*max_x).max(x);
                *max_y = (*max_y).max(y);
                *count += 1;
            })
            .or_insert((x, y, x, y, 1));
    }

    let mut contours: Vec<Contour> = regions
        .into_iter()
        .map(|(label, (min_x, min_y, max_x, max_y, count))| Contour {
            label,
            min_x,
            min_y,
            max_x,
            max_y,
            pixel_count: count,
        })
        .filter(|c| c.pixel_count >= min_area)
        .collect();

    contours.sort_by_key(|c| (c.min_y, c.min_x, c.max_y, c.max_x, c.label));
    contours
}

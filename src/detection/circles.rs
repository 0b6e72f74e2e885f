use crate::models::Contour;

/// Filter contours to find circular shapes
pub fn filter_circles(
    contours: Vec<Contour>,
    min_radius: f32,
    max_radius: f32,
    circularity_threshold: f32,
) -> Vec<Contour> {
    contours
        .into_iter()
        .filter(|c| {
            let aspect = c.aspect_ratio();
            c.is_circular(circularity_threshold)
                && c.is_reasonable_size(min_radius, max_radius)
                && (0.7..=1.4).contains(&aspect) // Roughly square bounding box
        })
        .collect()
}

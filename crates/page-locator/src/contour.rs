//! Geometric page detection: the largest convex quadrilateral contour
//!
//! 1. Convert to luma and blur to suppress sensor noise
//! 2. Canny edge detection, then a one-pixel dilation to close small gaps
//! 3. Trace contours and simplify each with Douglas-Peucker
//! 4. Keep 4-vertex convex candidates covering at least `min_area_fraction`
//!    of the frame and pick the largest
//! 5. Order the corners and warp the quad into a flat rectangle

use image::{Rgb, RgbImage};
use imageproc::contours::find_contours;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::morphology::dilate;
use tracing::debug;
use video_page_common::{to_luma, AcceptedFrame, LocateMethod, PageImage};

use crate::geometry::{
    approximate_closed, destination_size, is_convex, order_corners, perimeter, polygon_area,
    Point, Quad,
};
use crate::{LocateStrategy, LocatorConfig};

/// Contour-based locator with perspective rectification
#[derive(Debug, Clone)]
pub struct ContourStrategy {
    config: LocatorConfig,
}

impl ContourStrategy {
    #[must_use]
    pub fn new(config: LocatorConfig) -> Self {
        Self { config }
    }

    /// Find the page quadrilateral in a frame, corners in canonical order
    #[must_use]
    pub fn find_quad(&self, image: &RgbImage) -> Option<Quad> {
        let (width, height) = image.dimensions();
        if width < 3 || height < 3 {
            return None;
        }
        let frame_area = width as f32 * height as f32;
        let min_area = frame_area * self.config.min_area_fraction;

        let luma = to_luma(image);
        let blurred = if self.config.blur_sigma > 0.0 {
            gaussian_blur_f32(&luma, self.config.blur_sigma)
        } else {
            luma
        };
        let edges = canny(&blurred, self.config.canny_low, self.config.canny_high);
        let edges = dilate(&edges, Norm::LInf, 1);

        let mut best: Option<([Point; 4], f32)> = None;
        for contour in find_contours::<i32>(&edges) {
            if contour.points.len() < 4 {
                continue;
            }
            let points: Vec<Point> = contour.points.iter().map(|&p| Point::from(p)).collect();
            let epsilon = self.config.approx_epsilon * perimeter(&points);
            let polygon = approximate_closed(&points, epsilon);
            if polygon.len() != 4 || !is_convex(&polygon) {
                continue;
            }
            let area = polygon_area(&polygon);
            if area < min_area {
                continue;
            }
            if best.as_ref().map_or(true, |(_, best_area)| area > *best_area) {
                best = Some(([polygon[0], polygon[1], polygon[2], polygon[3]], area));
            }
        }

        best.map(|(corners, area)| {
            debug!(
                "Page quad covers {:.1}% of the frame",
                100.0 * area / frame_area
            );
            order_corners(&corners)
        })
    }

    /// Warp the quad into an axis-aligned rectangle, then trim the border bleed
    #[must_use]
    pub fn rectify(&self, image: &RgbImage, quad: &Quad) -> Option<RgbImage> {
        let (out_w, out_h) = destination_size(quad, self.config.target_aspect);
        let src = quad.map(|p| (p.x, p.y));
        let dst = [
            (0.0, 0.0),
            (out_w as f32, 0.0),
            (out_w as f32, out_h as f32),
            (0.0, out_h as f32),
        ];

        let Some(projection) = Projection::from_control_points(src, dst) else {
            debug!("Degenerate quad, no projective transform");
            return None;
        };

        let mut warped = RgbImage::new(out_w, out_h);
        warp_into(
            image,
            &projection,
            Interpolation::Bilinear,
            Rgb([255, 255, 255]),
            &mut warped,
        );

        Some(trim_edges(warped, self.config.edge_trim))
    }
}

/// Remove a uniform fraction from each side, never below one pixel
#[must_use]
pub fn trim_edges(image: RgbImage, fraction: f32) -> RgbImage {
    if !(fraction > 0.0 && fraction < 0.5) {
        return image;
    }
    let (w, h) = image.dimensions();
    let dx = (w as f32 * fraction).round() as u32;
    let dy = (h as f32 * fraction).round() as u32;
    if dx == 0 && dy == 0 {
        return image;
    }
    let tw = w.saturating_sub(2 * dx).max(1);
    let th = h.saturating_sub(2 * dy).max(1);
    image::imageops::crop_imm(&image, dx.min(w - 1), dy.min(h - 1), tw, th).to_image()
}

impl LocateStrategy for ContourStrategy {
    fn name(&self) -> &'static str {
        "contour"
    }

    fn try_locate(&self, frame: &AcceptedFrame) -> Option<PageImage> {
        let quad = self.find_quad(frame.image())?;
        let page = self.rectify(frame.image(), &quad)?;
        Some(PageImage::new(frame.index(), page, LocateMethod::Contour))
    }
}

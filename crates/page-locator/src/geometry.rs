//! Polygon helpers for quadrilateral page detection

use imageproc::point::Point as ContourPoint;

/// A 2D point in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    #[inline]
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<ContourPoint<i32>> for Point {
    fn from(p: ContourPoint<i32>) -> Self {
        Self::new(p.x as f32, p.y as f32)
    }
}

/// Corners in canonical order: top-left, top-right, bottom-right, bottom-left
pub type Quad = [Point; 4];

/// Length of a closed polygon's boundary
#[must_use]
pub fn perimeter(points: &[Point]) -> f32 {
    if points.len() < 2 {
        return 0.0;
    }
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.distance(b))
        .sum()
}

/// Unsigned polygon area (shoelace formula)
#[must_use]
pub fn polygon_area(points: &[Point]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: f32 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x * b.y - b.x * a.y)
        .sum();
    twice.abs() / 2.0
}

/// True if every turn of the closed polygon has the same orientation
#[must_use]
pub fn is_convex(points: &[Point]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0f32;
    for i in 0..n {
        let o = points[i];
        let a = points[(i + 1) % n];
        let b = points[(i + 2) % n];
        let cross = (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x);
        if cross.abs() < f32::EPSILON {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    sign != 0.0
}

fn point_to_line_distance(point: &Point, start: &Point, end: &Point) -> f32 {
    let a = end.y - start.y;
    let b = start.x - end.x;
    let c = end.x * start.y - start.x * end.y;
    let denominator = (a * a + b * b).sqrt();
    if denominator == 0.0 {
        return point.distance(start);
    }
    (a * point.x + b * point.y + c).abs() / denominator
}

/// Douglas-Peucker simplification of an open polyline (endpoints always kept)
fn simplify_open(points: &[Point], epsilon: f32) -> Vec<Point> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;

    let mut stack = vec![(0usize, points.len() - 1)];
    while let Some((start, end)) = stack.pop() {
        if end - start <= 1 {
            continue;
        }
        let mut max_dist = 0.0;
        let mut max_index = start;
        for i in (start + 1)..end {
            let dist = point_to_line_distance(&points[i], &points[start], &points[end]);
            if dist > max_dist {
                max_dist = dist;
                max_index = i;
            }
        }
        if max_dist > epsilon {
            keep[max_index] = true;
            stack.push((start, max_index));
            stack.push((max_index, end));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

/// Douglas-Peucker simplification of a closed contour
///
/// The contour is split at the point farthest from its first point and each
/// half is simplified separately, so the result does not depend on where the
/// tracer happened to start beyond that anchor.
#[must_use]
pub fn approximate_closed(points: &[Point], epsilon: f32) -> Vec<Point> {
    if points.len() <= 3 {
        return points.to_vec();
    }

    let first = points[0];
    let (split, _) = points
        .iter()
        .enumerate()
        .map(|(i, p)| (i, first.distance(p)))
        .fold((0, 0.0f32), |best, cur| if cur.1 > best.1 { cur } else { best });
    if split == 0 {
        return vec![first];
    }

    let mut first_half = simplify_open(&points[..=split], epsilon);
    let mut second: Vec<Point> = points[split..].to_vec();
    second.push(first);
    let second_half = simplify_open(&second, epsilon);

    // Both halves share the split point and the closing point
    first_half.pop();
    first_half.extend_from_slice(&second_half[..second_half.len() - 1]);
    first_half
}

/// Order four corners as top-left, top-right, bottom-right, bottom-left
///
/// Top-left has the smallest x+y and bottom-right the largest. Of the
/// remaining diagonal, top-right has the smallest y-x and bottom-left the
/// largest.
#[must_use]
pub fn order_corners(points: &[Point; 4]) -> Quad {
    let by = |key: &dyn Fn(&Point) -> f32, max: bool| -> Point {
        let mut best = points[0];
        for p in &points[1..] {
            let better = if max { key(p) > key(&best) } else { key(p) < key(&best) };
            if better {
                best = *p;
            }
        }
        best
    };

    let sum = |p: &Point| p.x + p.y;
    let diff = |p: &Point| p.y - p.x;

    [
        by(&sum, false),
        by(&diff, false),
        by(&sum, true),
        by(&diff, true),
    ]
}

/// Output rectangle size for a rectified quad, each side at least one pixel
///
/// Width is the longer of the top and bottom edges. Height is the longer of
/// the side edges, or `width * aspect` when a target aspect ratio is given.
#[must_use]
pub fn destination_size(quad: &Quad, target_aspect: Option<f32>) -> (u32, u32) {
    let [tl, tr, br, bl] = quad;
    let width = tl.distance(tr).max(bl.distance(br));
    let height = match target_aspect {
        Some(aspect) if aspect.is_finite() && aspect > 0.0 => width * aspect,
        _ => tl.distance(bl).max(tr.distance(br)),
    };
    let clamp = |v: f32| -> u32 {
        if v.is_finite() {
            (v.round() as u32).max(1)
        } else {
            1
        }
    };
    (clamp(width), clamp(height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<Point> {
        vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ]
    }

    #[test]
    fn test_area_and_perimeter() {
        let r = rect(0.0, 0.0, 10.0, 5.0);
        assert!((polygon_area(&r) - 50.0).abs() < 1e-4);
        assert!((perimeter(&r) - 30.0).abs() < 1e-4);
    }

    #[test]
    fn test_order_corners_from_shuffled_input() {
        let shuffled = [
            Point::new(90.0, 85.0),
            Point::new(12.0, 10.0),
            Point::new(8.0, 80.0),
            Point::new(95.0, 5.0),
        ];
        let [tl, tr, br, bl] = order_corners(&shuffled);
        assert_eq!(tl, Point::new(12.0, 10.0));
        assert_eq!(tr, Point::new(95.0, 5.0));
        assert_eq!(br, Point::new(90.0, 85.0));
        assert_eq!(bl, Point::new(8.0, 80.0));
    }

    #[test]
    fn test_destination_size() {
        let quad = [
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(110.0, 50.0),
            Point::new(0.0, 40.0),
        ];
        let (w, h) = destination_size(&quad, None);
        assert_eq!(w, 110);
        assert_eq!(h, 51);
        assert_eq!(destination_size(&quad, Some(1.414)), (110, 156));
    }

    #[test]
    fn test_degenerate_quad_is_clamped() {
        let p = Point::new(5.0, 5.0);
        assert_eq!(destination_size(&[p, p, p, p], None), (1, 1));
    }

    #[test]
    fn test_approximate_closed_rectangle_outline() {
        // Dense outline of a 40x20 rectangle, traced clockwise from the top-left corner
        let mut outline = Vec::new();
        for x in 0..40 {
            outline.push(Point::new(x as f32, 0.0));
        }
        for y in 0..20 {
            outline.push(Point::new(40.0, y as f32));
        }
        for x in (1..=40).rev() {
            outline.push(Point::new(x as f32, 20.0));
        }
        for y in (1..=20).rev() {
            outline.push(Point::new(0.0, y as f32));
        }

        let epsilon = 0.02 * perimeter(&outline);
        let simplified = approximate_closed(&outline, epsilon);
        assert_eq!(simplified.len(), 4, "got {simplified:?}");
        assert!(is_convex(&simplified));
        assert!((polygon_area(&simplified) - 800.0).abs() < 1.0);
    }

    #[test]
    fn test_convexity() {
        assert!(is_convex(&rect(0.0, 0.0, 4.0, 4.0)));
        let bowtie = vec![
            Point::new(0.0, 0.0),
            Point::new(4.0, 4.0),
            Point::new(4.0, 0.0),
            Point::new(0.0, 4.0),
        ];
        assert!(!is_convex(&bowtie));
    }
}

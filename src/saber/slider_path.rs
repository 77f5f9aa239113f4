use crate::parser::osu_types::{CurveType, Position, Slider};
use std::f64::consts::PI;

const BEZIER_STEPS: usize = 32;
const ARC_STEPS: usize = 32;

/// Polyline approximation of a slider curve, clipped to its pixel length.
#[derive(Debug, Clone, PartialEq)]
pub struct SliderPath {
    points: Vec<Position>,
    /// Distance from the head to each point
    distances: Vec<f64>,
    repeats: u32,
}

impl SliderPath {
    /// `None` when the curve has no usable control point.
    pub fn new(slider: &Slider) -> Option<Self> {
        if slider.path.is_empty()
            || slider.repeats == 0
            || !slider.path.iter().all(Position::is_finite)
            || !slider.pixel_length.is_finite()
        {
            return None;
        }
        let mut points = approximate(slider.curve, &slider.path);
        points.dedup();

        let mut distances = Vec::with_capacity(points.len());
        let mut travelled = 0.0;
        for (i, point) in points.iter().enumerate() {
            if i > 0 {
                travelled += points[i - 1].distance(point);
            }
            distances.push(travelled);
        }

        // the declared length wins over the drawn curve
        if slider.pixel_length > 0.0 && slider.pixel_length < travelled {
            let cut = distances.partition_point(|d| *d < slider.pixel_length);
            let end = position_on(&points, &distances, slider.pixel_length);
            points.truncate(cut);
            distances.truncate(cut);
            points.push(end);
            distances.push(slider.pixel_length);
        }
        Some(SliderPath {
            points,
            distances,
            repeats: slider.repeats,
        })
    }

    pub fn length(&self) -> f64 {
        self.distances.last().copied().unwrap_or_default()
    }

    /// Position after `progress` (0 to 1) of the whole slider, repeats included
    pub fn position_at(&self, progress: f64) -> Position {
        let spans = f64::from(self.repeats);
        let travelled = progress.clamp(0.0, 1.0) * spans;
        let span = travelled.floor().min(spans - 1.0);
        let mut fraction = travelled - span;
        // odd spans run backward
        if span as u32 % 2 == 1 {
            fraction = 1.0 - fraction;
        }
        position_on(&self.points, &self.distances, fraction * self.length())
    }
}

fn position_on(points: &[Position], distances: &[f64], distance: f64) -> Position {
    let index = distances.partition_point(|d| *d < distance);
    if index == 0 {
        return points[0];
    }
    if index >= points.len() {
        return points[points.len() - 1];
    }
    let (start, end) = (distances[index - 1], distances[index]);
    let t = if end > start {
        (distance - start) / (end - start)
    } else {
        0.0
    };
    points[index - 1].lerp(&points[index], t)
}

fn approximate(curve: CurveType, control: &[Position]) -> Vec<Position> {
    match curve {
        // catmull curves pass through every control point
        CurveType::Linear | CurveType::Catmull => control.to_vec(),
        CurveType::Perfect => match control {
            [a, b, c] => circular_arc(*a, *b, *c).unwrap_or_else(|| bezier(control)),
            _ => bezier(control),
        },
        CurveType::Bezier => bezier(control),
    }
}

/// Piecewise bezier, a repeated control point starts a new segment.
fn bezier(control: &[Position]) -> Vec<Position> {
    let mut points = Vec::new();
    let mut start = 0;
    for end in 1..=control.len() {
        let boundary = end == control.len() || control[end] == control[end - 1];
        if !boundary {
            continue;
        }
        let segment = &control[start..end];
        match segment.len() {
            0 => (),
            1 | 2 => points.extend_from_slice(segment),
            _ => points.extend((0..=BEZIER_STEPS).map(|step| {
                de_casteljau(segment, step as f64 / BEZIER_STEPS as f64)
            })),
        }
        start = end;
    }
    points
}

fn de_casteljau(control: &[Position], t: f64) -> Position {
    let mut work = control.to_vec();
    for level in 1..work.len() {
        for i in 0..work.len() - level {
            work[i] = work[i].lerp(&work[i + 1], t);
        }
    }
    work[0]
}

/// Arc from `a` to `c` through `b`, `None` when the points are collinear
fn circular_arc(a: Position, b: Position, c: Position) -> Option<Vec<Position>> {
    let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
    if d.abs() < 1e-6 {
        return None;
    }
    let a_sq = a.x * a.x + a.y * a.y;
    let b_sq = b.x * b.x + b.y * b.y;
    let c_sq = c.x * c.x + c.y * c.y;
    let center = Position::new(
        (a_sq * (b.y - c.y) + b_sq * (c.y - a.y) + c_sq * (a.y - b.y)) / d,
        (a_sq * (c.x - b.x) + b_sq * (a.x - c.x) + c_sq * (b.x - a.x)) / d,
    );
    let radius = center.distance(&a);

    let theta_start = (a.y - center.y).atan2(a.x - center.x);
    let mut theta_end = (c.y - center.y).atan2(c.x - center.x);
    while theta_end < theta_start {
        theta_end += 2.0 * PI;
    }
    let mut direction = 1.0;
    let mut theta_range = theta_end - theta_start;
    // b on the other side of ac means going the long way round
    let ortho = Position::new(c.y - a.y, -(c.x - a.x));
    if ortho.x * (b.x - a.x) + ortho.y * (b.y - a.y) < 0.0 {
        direction = -1.0;
        theta_range = 2.0 * PI - theta_range;
    }

    Some(
        (0..=ARC_STEPS)
            .map(|step| {
                let theta =
                    theta_start + direction * theta_range * step as f64 / ARC_STEPS as f64;
                Position::new(
                    center.x + radius * theta.cos(),
                    center.y + radius * theta.sin(),
                )
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slider(curve: CurveType, path: Vec<Position>, repeats: u32, pixel_length: f64) -> Slider {
        Slider {
            end_time: 0.0,
            curve,
            path,
            repeats,
            pixel_length,
        }
    }

    fn assert_close(actual: Position, expected: Position) {
        assert!(
            actual.distance(&expected) < 0.5,
            "{actual:?} is not close to {expected:?}"
        );
    }

    #[test]
    fn test_linear_clipped_to_pixel_length() {
        let path = SliderPath::new(&slider(
            CurveType::Linear,
            vec![Position::new(0.0, 0.0), Position::new(200.0, 0.0)],
            1,
            100.0,
        ))
        .unwrap();
        assert_eq!(path.length(), 100.0);
        assert_close(path.position_at(0.5), Position::new(50.0, 0.0));
        assert_close(path.position_at(1.0), Position::new(100.0, 0.0));
    }

    #[test]
    fn test_repeats_go_back_and_forth() {
        let path = SliderPath::new(&slider(
            CurveType::Linear,
            vec![Position::new(0.0, 0.0), Position::new(100.0, 0.0)],
            2,
            100.0,
        ))
        .unwrap();
        assert_close(path.position_at(0.25), Position::new(50.0, 0.0));
        assert_close(path.position_at(0.5), Position::new(100.0, 0.0));
        assert_close(path.position_at(0.75), Position::new(50.0, 0.0));
        assert_close(path.position_at(1.0), Position::new(0.0, 0.0));
    }

    #[test]
    fn test_perfect_circle_passes_through_middle_point() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(100.0, 100.0);
        let c = Position::new(200.0, 0.0);
        let path = SliderPath::new(&slider(CurveType::Perfect, vec![a, b, c], 1, 0.0)).unwrap();
        assert!((path.length() - 100.0 * PI).abs() < 1.0);
        assert_close(path.position_at(0.5), b);
        assert_close(path.position_at(1.0), c);
    }

    #[test]
    fn test_collinear_perfect_falls_back() {
        let path = SliderPath::new(&slider(
            CurveType::Perfect,
            vec![
                Position::new(0.0, 0.0),
                Position::new(50.0, 0.0),
                Position::new(100.0, 0.0),
            ],
            1,
            0.0,
        ))
        .unwrap();
        assert!((path.length() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_bezier_splits_on_red_anchor() {
        // the repeated point makes two straight segments
        let path = SliderPath::new(&slider(
            CurveType::Bezier,
            vec![
                Position::new(0.0, 0.0),
                Position::new(100.0, 0.0),
                Position::new(100.0, 0.0),
                Position::new(100.0, 100.0),
            ],
            1,
            0.0,
        ))
        .unwrap();
        assert!((path.length() - 200.0).abs() < 1e-6);
        assert_close(path.position_at(0.5), Position::new(100.0, 0.0));
    }

    #[test]
    fn test_quadratic_bezier_midpoint() {
        let path = SliderPath::new(&slider(
            CurveType::Bezier,
            vec![
                Position::new(0.0, 0.0),
                Position::new(100.0, 100.0),
                Position::new(200.0, 0.0),
            ],
            1,
            0.0,
        ))
        .unwrap();
        assert_close(path.position_at(0.0), Position::new(0.0, 0.0));
        assert_close(path.position_at(0.5), Position::new(100.0, 50.0));
    }

    #[test]
    fn test_single_point_path_stays_put() {
        let path = SliderPath::new(&slider(
            CurveType::Linear,
            vec![Position::new(64.0, 192.0)],
            1,
            0.0,
        ))
        .unwrap();
        assert_eq!(path.length(), 0.0);
        assert_eq!(path.position_at(0.7), Position::new(64.0, 192.0));
    }

    #[test]
    fn test_invalid_sliders() {
        assert_eq!(SliderPath::new(&slider(CurveType::Linear, vec![], 1, 10.0)), None);
        let head = vec![Position::new(0.0, 0.0)];
        assert_eq!(SliderPath::new(&slider(CurveType::Linear, head.clone(), 0, 10.0)), None);
        assert_eq!(
            SliderPath::new(&slider(CurveType::Linear, head, 1, f64::NAN)),
            None
        );
    }
}

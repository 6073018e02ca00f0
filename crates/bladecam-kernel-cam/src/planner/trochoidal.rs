//! Trochoidal motion for full-width slotting.
//!
//! Trochoidal milling uses circular loops to keep engagement low where a
//! straight slot would bury the tool. Paths are generated in a flat
//! `(chord mm, lateral mm)` frame and mapped back onto the passage by the
//! caller.

use bladecam_kernel_math::{Point2, Vec2};

use crate::operation::TrochoidalParams;

/// Generate a trochoidal path from `start` to `end` with loops of
/// `loop_radius`.
pub fn generate_trochoidal(
    start: Point2,
    end: Point2,
    loop_radius: f64,
    params: &TrochoidalParams,
) -> Vec<Point2> {
    let delta = end - start;
    let distance = delta.norm();
    if distance < 1e-6 {
        return vec![start, end];
    }

    let dir = delta / distance;
    let perp = Vec2::new(-dir.y, dir.x);

    let n_loops = (distance / params.stepover).ceil() as usize;
    let advance = distance / n_loops as f64;

    let mut points = Vec::with_capacity(n_loops * params.points_per_loop + 2);
    points.push(start);
    for i in 0..n_loops {
        let center = start + dir * ((i as f64 + 0.5) * advance);
        for j in 0..params.points_per_loop {
            let angle = j as f64 * std::f64::consts::TAU / params.points_per_loop as f64;
            // Forward creep during the loop.
            let forward = angle / std::f64::consts::TAU * advance;
            points.push(
                center + dir * forward + perp * (loop_radius * angle.cos())
                    - dir * (loop_radius * angle.sin()),
            );
        }
    }
    points.push(end);

    simplify_path(&points, 0.01)
}

/// Drop points that are nearly collinear with their neighbours.
fn simplify_path(points: &[Point2], tolerance: f64) -> Vec<Point2> {
    let (first, last) = match (points.first(), points.last()) {
        (Some(f), Some(l)) if points.len() > 2 => (*f, *l),
        _ => return points.to_vec(),
    };

    let mut result = Vec::with_capacity(points.len());
    result.push(first);
    for i in 1..points.len() - 1 {
        let prev = result.last().copied().unwrap_or(first);
        let curr = points[i];
        let next = points[i + 1];

        let d = next - prev;
        let len = d.norm();
        if len < 1e-10 {
            result.push(curr);
            continue;
        }
        let t = (curr - prev).dot(&d) / (len * len);
        let closest = prev + d * t;
        if (curr - closest).norm() > tolerance {
            result.push(curr);
        }
    }
    result.push(last);
    result
}

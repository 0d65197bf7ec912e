//! Per-drawable geodetic correction.
//!
//! Instead of pushing every vertex through the CRS library, the corrected
//! positions of the drawable's eight bounding-box corners define a local
//! affine fit (least squares via SVD) that is then applied to all vertices.
//! The fit absorbs the curvature of the geographic transform over the
//! drawable's extent; when the corners are too degenerate for a reliable
//! fit, every vertex is reprojected directly.

use glam::{DMat4, DVec3, DVec4};
use nalgebra::DMatrix;

use crate::geo::{ForwardEval, GeoTransform};

const RANK_EPS: f64 = 1e-10;
const RESIDUAL_LIMIT: f64 = 1e-6;

/// Correct `positions` in place, mapping them from source coordinates into
/// the dataset's ENU frame.
pub fn correct_positions(
    geo: &GeoTransform,
    eval: &ForwardEval,
    positions: &mut [[f32; 3]],
) {
    if positions.is_empty() {
        return;
    }

    let mut min = DVec3::splat(f64::MAX);
    let mut max = DVec3::splat(f64::MIN);
    for p in positions.iter() {
        let v = DVec3::new(p[0] as f64, p[1] as f64, p[2] as f64);
        min = min.min(v);
        max = max.max(v);
    }

    let corners = [
        DVec3::new(min.x, min.y, min.z),
        DVec3::new(max.x, min.y, min.z),
        DVec3::new(min.x, max.y, min.z),
        DVec3::new(min.x, min.y, max.z),
        DVec3::new(max.x, max.y, min.z),
        DVec3::new(min.x, max.y, max.z),
        DVec3::new(max.x, min.y, max.z),
        DVec3::new(max.x, max.y, max.z),
    ];

    match fit_affine(geo, eval, &corners) {
        Some(transform) => {
            for p in positions.iter_mut() {
                let v = transform
                    * DVec4::new(p[0] as f64, p[1] as f64, p[2] as f64, 1.0);
                *p = [v.x as f32, v.y as f32, v.z as f32];
            }
        }
        None => {
            // Degenerate corner configuration: reproject each vertex.
            for p in positions.iter_mut() {
                let v = geo.correct_point(
                    eval,
                    DVec3::new(p[0] as f64, p[1] as f64, p[2] as f64),
                );
                *p = [v.x as f32, v.y as f32, v.z as f32];
            }
        }
    }
}

/// Solve the homogeneous 8×4 system `A·X = B` with a thin SVD and return the
/// affine transform, or `None` when the rank or residual check fails.
fn fit_affine(geo: &GeoTransform, eval: &ForwardEval, corners: &[DVec3; 8]) -> Option<DMat4> {
    let a = DMatrix::from_fn(8, 4, |r, c| match c {
        0 => corners[r].x,
        1 => corners[r].y,
        2 => corners[r].z,
        _ => 1.0,
    });
    let b = DMatrix::from_fn(8, 4, |r, c| {
        let corrected = geo.correct_point(eval, corners[r]);
        match c {
            0 => corrected.x,
            1 => corrected.y,
            2 => corrected.z,
            _ => 1.0,
        }
    });

    let svd = a.clone().svd(true, true);
    if svd.rank(RANK_EPS) < 4 {
        return None;
    }
    let x = svd.solve(&b, RANK_EPS).ok()?;

    let residual = (&a * &x - &b).norm();
    let scale = b.norm().max(1.0);
    if residual / scale > RESIDUAL_LIMIT {
        return None;
    }

    // Row-vector convention: b = aᵀ·X, so the column-vector matrix is Xᵀ;
    // glam column j therefore takes X's row j.
    Some(DMat4::from_cols(
        DVec4::new(x[(0, 0)], x[(0, 1)], x[(0, 2)], x[(0, 3)]),
        DVec4::new(x[(1, 0)], x[(1, 1)], x[(1, 2)], x[(1, 3)]),
        DVec4::new(x[(2, 0)], x[(2, 1)], x[(2, 2)], x[(2, 3)]),
        DVec4::new(x[(3, 0)], x[(3, 1)], x[(3, 2)], x[(3, 3)]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enu_zero_offset_correction_is_identity() {
        let geo = GeoTransform::from_enu(120.34445, 36.09953, DVec3::ZERO).unwrap();
        let eval = geo.evaluator().unwrap();
        let mut positions = vec![
            [0.0, 0.0, 0.0],
            [10.0, 0.0, 0.0],
            [0.0, 10.0, 0.0],
            [3.0, 4.0, 5.0],
        ];
        let original = positions.clone();
        correct_positions(&geo, &eval, &mut positions);
        for (p, q) in positions.iter().zip(original.iter()) {
            for i in 0..3 {
                assert!((p[i] - q[i]).abs() < 1e-3, "{p:?} vs {q:?}");
            }
        }
    }

    #[test]
    fn test_enu_offset_shifts_vertices() {
        let offset = DVec3::new(100.0, -50.0, 25.0);
        let geo = GeoTransform::from_enu(-71.06, 42.36, offset).unwrap();
        let eval = geo.evaluator().unwrap();
        let mut positions = vec![[0.0, 0.0, 0.0], [1.0, 2.0, 3.0], [5.0, 5.0, 5.0]];
        correct_positions(&geo, &eval, &mut positions);
        assert!((positions[0][0] - 100.0).abs() < 1e-2);
        assert!((positions[0][1] + 50.0).abs() < 1e-2);
        assert!((positions[0][2] - 25.0).abs() < 1e-2);
    }

    #[test]
    fn test_planar_drawable_still_corrects() {
        // All points in the z = 0 plane produce duplicate corners; the fit
        // falls back to per-vertex reprojection rather than garbage.
        let geo = GeoTransform::from_enu(0.0, 0.0, DVec3::new(1.0, 2.0, 3.0)).unwrap();
        let eval = geo.evaluator().unwrap();
        let mut positions = vec![[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [0.0, 10.0, 0.0]];
        correct_positions(&geo, &eval, &mut positions);
        assert!((positions[0][0] - 1.0).abs() < 1e-2);
        assert!((positions[0][1] - 2.0).abs() < 1e-2);
        assert!((positions[0][2] - 3.0).abs() < 1e-2);
    }
}

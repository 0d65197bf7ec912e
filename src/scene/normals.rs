//! Smooth-normal synthesis for drawables that carry none.

use glam::Vec3;

use crate::mesh::triangulate;
use crate::scene::node::PrimitiveSet;

/// Compute per-vertex smooth normals by accumulating facet normals over all
/// surface primitive sets. Facet normals are area-weighted (the unnormalized
/// cross product); vertices touched by no triangle point up.
pub fn smooth_normals(positions: &[[f32; 3]], primitive_sets: &[PrimitiveSet]) -> Vec<[f32; 3]> {
    let mut accum = vec![Vec3::ZERO; positions.len()];

    for set in primitive_sets {
        let Ok(triangles) = triangulate(set) else {
            continue;
        };
        for tri in triangles.chunks_exact(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            if a >= positions.len() || b >= positions.len() || c >= positions.len() {
                continue;
            }
            let pa = Vec3::from(positions[a]);
            let pb = Vec3::from(positions[b]);
            let pc = Vec3::from(positions[c]);
            let facet = (pb - pa).cross(pc - pa);
            accum[a] += facet;
            accum[b] += facet;
            accum[c] += facet;
        }
    }

    accum
        .into_iter()
        .map(|n| {
            if n.length_squared() > 0.0 {
                n.normalize().to_array()
            } else {
                [0.0, 0.0, 1.0]
            }
        })
        .collect()
}

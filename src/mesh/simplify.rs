//! Mesh optimization and simplification.
//!
//! The dedup/remap stages are concrete; the reorder and simplify stages call
//! into an external mesh-optimizer library through the [`MeshOptimizer`]
//! seam. A failed or absent optimizer degrades to the original mesh, never
//! to a pipeline error.

use std::collections::HashMap;

use super::vertex::PackedVertex;

/// Simplification settings for one pass.
#[derive(Debug, Clone, Copy)]
pub struct SimplifyParams {
    /// Simplification error budget (0.01 = 1%).
    pub target_error: f32,
    /// Target triangle ratio (0.5 keeps half the indices).
    pub target_ratio: f32,
    pub enable_simplification: bool,
    pub preserve_texture_coords: bool,
    pub preserve_normals: bool,
}

impl Default for SimplifyParams {
    fn default() -> Self {
        SimplifyParams {
            target_error: 0.01,
            target_ratio: 0.5,
            enable_simplification: false,
            preserve_texture_coords: true,
            preserve_normals: true,
        }
    }
}

/// Seam to the external mesh-optimizer library. Implementations reorder
/// indices/vertices in place and return simplified index buffers; the
/// default [`NoopOptimizer`] leaves everything untouched.
pub trait MeshOptimizer: Send + Sync {
    /// Reorder indices for post-transform vertex-cache locality.
    fn optimize_vertex_cache(&self, indices: &mut [u32], vertex_count: usize);

    /// Reorder indices to reduce overdraw; `threshold` bounds the allowed
    /// cache-efficiency regression.
    fn optimize_overdraw(&self, indices: &mut [u32], vertices: &[PackedVertex], threshold: f32);

    /// Reorder the vertex buffer for pre-transform fetch locality, updating
    /// indices to match.
    fn optimize_vertex_fetch(&self, indices: &mut [u32], vertices: &mut Vec<PackedVertex>);

    /// Position-only simplification toward `target_index_count`.
    fn simplify(
        &self,
        indices: &[u32],
        vertices: &[PackedVertex],
        target_index_count: usize,
        target_error: f32,
    ) -> Vec<u32>;

    /// Attribute-aware simplification weighting each normal component.
    fn simplify_with_attributes(
        &self,
        indices: &[u32],
        vertices: &[PackedVertex],
        normal_weights: [f32; 3],
        target_index_count: usize,
        target_error: f32,
    ) -> Vec<u32>;
}

/// Identity optimizer: reorders nothing and refuses to drop triangles.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOptimizer;

impl MeshOptimizer for NoopOptimizer {
    fn optimize_vertex_cache(&self, _indices: &mut [u32], _vertex_count: usize) {}

    fn optimize_overdraw(&self, _indices: &mut [u32], _vertices: &[PackedVertex], _threshold: f32) {
    }

    fn optimize_vertex_fetch(&self, _indices: &mut [u32], _vertices: &mut Vec<PackedVertex>) {}

    fn simplify(
        &self,
        indices: &[u32],
        _vertices: &[PackedVertex],
        _target_index_count: usize,
        _target_error: f32,
    ) -> Vec<u32> {
        indices.to_vec()
    }

    fn simplify_with_attributes(
        &self,
        indices: &[u32],
        _vertices: &[PackedVertex],
        _normal_weights: [f32; 3],
        _target_index_count: usize,
        _target_error: f32,
    ) -> Vec<u32> {
        indices.to_vec()
    }
}

/// Deduplicate bitwise-equal vertex records. Returns the remap table (old
/// index → new index) and the unique vertex count.
pub fn generate_vertex_remap(vertices: &[PackedVertex]) -> (Vec<u32>, usize) {
    let mut remap = Vec::with_capacity(vertices.len());
    let mut seen: HashMap<[u8; 32], u32> = HashMap::with_capacity(vertices.len());
    let mut unique = 0u32;
    for v in vertices {
        let key: [u8; 32] = bytemuck::cast(*v);
        let idx = *seen.entry(key).or_insert_with(|| {
            let idx = unique;
            unique += 1;
            idx
        });
        remap.push(idx);
    }
    (remap, unique as usize)
}

/// The full optimize-and-simplify pass over one triangle mesh:
/// dedup → remap → shrink → cache → overdraw → fetch → simplify.
pub fn optimize_and_simplify(
    vertices: &[PackedVertex],
    indices: &[u32],
    params: &SimplifyParams,
    optimizer: &dyn MeshOptimizer,
) -> (Vec<PackedVertex>, Vec<u32>) {
    if !params.enable_simplification || indices.is_empty() || vertices.is_empty() {
        return (vertices.to_vec(), indices.to_vec());
    }

    // 1..3: dedup, remap indices, shrink the vertex buffer.
    let (remap, unique_count) = generate_vertex_remap(vertices);
    let mut indices: Vec<u32> = indices.iter().map(|&i| remap[i as usize]).collect();
    let mut unique = vec![PackedVertex::new([0.0; 3], [0.0; 3], [0.0; 2]); unique_count];
    for (old, &new) in remap.iter().enumerate() {
        unique[new as usize] = vertices[old];
    }

    // 4..6: reorder for cache, overdraw, fetch.
    optimizer.optimize_vertex_cache(&mut indices, unique.len());
    optimizer.optimize_overdraw(&mut indices, &unique, 1.05);
    optimizer.optimize_vertex_fetch(&mut indices, &mut unique);

    // 7: simplify, attribute-aware when any normal is present.
    let target_index_count = (indices.len() as f64 * params.target_ratio as f64) as usize;
    let has_normals = params.preserve_normals && unique.iter().any(|v| v.has_normal());
    let simplified = if has_normals {
        optimizer.simplify_with_attributes(
            &indices,
            &unique,
            [0.5, 0.5, 0.5],
            target_index_count,
            params.target_error,
        )
    } else {
        optimizer.simplify(&indices, &unique, target_index_count, params.target_error)
    };

    (unique, simplified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::vertex::pack_vertices;

    fn quad_with_duplicates() -> (Vec<PackedVertex>, Vec<u32>) {
        // Two triangles sharing an edge, written with duplicated vertices.
        let positions = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        let vertices = pack_vertices(&positions, &[], &[]);
        (vertices, vec![0, 1, 2, 3, 4, 5])
    }

    #[test]
    fn test_remap_dedups_bitwise_equal_vertices() {
        let (vertices, _) = quad_with_duplicates();
        let (remap, unique) = generate_vertex_remap(&vertices);
        assert_eq!(unique, 4);
        assert_eq!(remap[1], remap[3]);
        assert_eq!(remap[2], remap[5]);
    }

    #[test]
    fn test_optimize_preserves_geometry_with_noop_optimizer() {
        let (vertices, indices) = quad_with_duplicates();
        let params = SimplifyParams {
            enable_simplification: true,
            ..SimplifyParams::default()
        };
        let (out_vertices, out_indices) =
            optimize_and_simplify(&vertices, &indices, &params, &NoopOptimizer);

        assert_eq!(out_vertices.len(), 4);
        assert_eq!(out_indices.len(), indices.len());
        for &i in &out_indices {
            assert!((i as usize) < out_vertices.len());
        }
        // Same triangles, re-indexed.
        assert_eq!(out_vertices[out_indices[1] as usize].position(), [1.0, 0.0, 0.0]);
        assert_eq!(out_vertices[out_indices[3] as usize].position(), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_disabled_simplification_is_identity() {
        let (vertices, indices) = quad_with_duplicates();
        let params = SimplifyParams::default();
        let (out_vertices, out_indices) =
            optimize_and_simplify(&vertices, &indices, &params, &NoopOptimizer);
        assert_eq!(out_vertices.len(), vertices.len());
        assert_eq!(out_indices, indices);
    }
}

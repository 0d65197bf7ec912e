//! Mesh processing: packed vertices, triangulation, simplification, Draco.

pub mod draco;
pub mod simplify;
pub mod triangulate;
pub mod vertex;

pub use draco::{DracoAttributeIds, DracoBlob, DracoEncoder, DracoMeshSpec, DracoParams};
pub use simplify::{MeshOptimizer, NoopOptimizer, SimplifyParams};
pub use triangulate::triangulate;
pub use vertex::{pack_vertices, unpack_vertices, PackedVertex};

/// Settings for one generated LOD level.
#[derive(Debug, Clone)]
pub struct LodLevelSettings {
    /// Simplification ratio of this level (1.0 = full precision).
    pub target_ratio: f32,
    pub target_error: f32,
    pub enable_simplification: bool,
    pub enable_draco: bool,
    pub simplify: SimplifyParams,
    pub draco: DracoParams,
}

/// Derive per-level settings from a ratio ladder. The first level stays
/// uncompressed unless `draco_for_lod0` is set, so the coarse entry tile
/// loads without a decoder round-trip.
pub fn build_lod_levels(
    ratios: &[f32],
    base_error: f32,
    simplify_template: &SimplifyParams,
    draco_template: &DracoParams,
    draco_for_lod0: bool,
) -> Vec<LodLevelSettings> {
    let mut levels = Vec::with_capacity(ratios.len());
    for (i, &ratio) in ratios.iter().enumerate() {
        let mut simplify = *simplify_template;
        simplify.target_ratio = ratio;
        simplify.target_error = base_error;

        let mut enable_draco = draco_template.enable_compression;
        if i == 0 && !draco_for_lod0 {
            enable_draco = false;
        }

        levels.push(LodLevelSettings {
            target_ratio: ratio,
            target_error: base_error,
            enable_simplification: simplify_template.enable_simplification,
            enable_draco,
            simplify,
            draco: *draco_template,
        });
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_lod_levels_skips_draco_for_lod0() {
        let simplify = SimplifyParams {
            enable_simplification: true,
            ..SimplifyParams::default()
        };
        let draco = DracoParams {
            enable_compression: true,
            ..DracoParams::default()
        };
        let levels = build_lod_levels(&[1.0, 0.7, 0.5, 0.3], 0.01, &simplify, &draco, false);

        assert_eq!(levels.len(), 4);
        assert!(!levels[0].enable_draco);
        assert!(levels[1].enable_draco);
        assert_eq!(levels[2].simplify.target_ratio, 0.5);
        assert!(levels[3].enable_simplification);
    }

    #[test]
    fn test_build_lod_levels_draco_for_lod0_opt_in() {
        let draco = DracoParams {
            enable_compression: true,
            ..DracoParams::default()
        };
        let levels =
            build_lod_levels(&[1.0, 0.5], 0.01, &SimplifyParams::default(), &draco, true);
        assert!(levels[0].enable_draco);
    }
}

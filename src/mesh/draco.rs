//! Draco compression orchestration.
//!
//! The encoder itself is an external library behind the [`DracoEncoder`]
//! seam; this module assembles the attribute streams, clamps quantization
//! settings, and hands back the compressed blob plus the attribute IDs the
//! glTF extension mapping needs.

use crate::error::{Result, TilerError};

/// Quantization settings for the Draco encoder.
#[derive(Debug, Clone, Copy)]
pub struct DracoParams {
    /// Position quantization bits, valid 10..=16.
    pub position_bits: u32,
    /// Normal quantization bits, valid 8..=16.
    pub normal_bits: u32,
    /// Texture-coordinate quantization bits, valid 8..=16.
    pub texcoord_bits: u32,
    /// Generic-attribute quantization bits, valid 8..=16.
    pub generic_bits: u32,
    pub enable_compression: bool,
}

impl Default for DracoParams {
    fn default() -> Self {
        DracoParams {
            position_bits: 11,
            normal_bits: 10,
            texcoord_bits: 12,
            generic_bits: 8,
            enable_compression: false,
        }
    }
}

impl DracoParams {
    /// Clamp every bit count into its valid range.
    pub fn clamped(&self) -> Self {
        DracoParams {
            position_bits: self.position_bits.clamp(10, 16),
            normal_bits: self.normal_bits.clamp(8, 16),
            texcoord_bits: self.texcoord_bits.clamp(8, 16),
            generic_bits: self.generic_bits.clamp(8, 16),
            enable_compression: self.enable_compression,
        }
    }
}

/// One mesh as presented to the Draco encoder: attribute streams plus a
/// triangle list (`faces.len() % 3 == 0`; non-triangle primitive sets are
/// triangulated before reaching this point).
pub struct DracoMeshSpec<'a> {
    pub positions: &'a [[f32; 3]],
    pub normals: Option<&'a [[f32; 3]]>,
    pub uvs: Option<&'a [[f32; 2]]>,
    pub batch_ids: Option<&'a [u32]>,
    pub faces: &'a [u32],
    pub params: DracoParams,
}

/// Draco attribute IDs as assigned by the encoder, needed for the
/// `KHR_draco_mesh_compression` attribute map.
#[derive(Debug, Clone, Copy, Default)]
pub struct DracoAttributeIds {
    pub position: u32,
    pub normal: Option<u32>,
    pub texcoord: Option<u32>,
    pub batch_id: Option<u32>,
}

/// Encoder output: the compressed byte blob and the attribute-ID map.
pub struct DracoBlob {
    pub data: Vec<u8>,
    pub attributes: DracoAttributeIds,
}

/// Seam to the external Draco encoder library.
pub trait DracoEncoder: Send + Sync {
    fn encode(&self, mesh: &DracoMeshSpec<'_>) -> Result<DracoBlob>;
}

/// Compress one geometry. Normal and UV streams are only included when
/// their length matches the vertex count; quantization bits are clamped.
pub fn compress_geometry(
    encoder: &dyn DracoEncoder,
    positions: &[[f32; 3]],
    normals: &[[f32; 3]],
    uvs: &[[f32; 2]],
    batch_ids: Option<&[u32]>,
    faces: &[u32],
    params: &DracoParams,
) -> Result<DracoBlob> {
    if positions.is_empty() {
        return Err(TilerError::codec("draco: empty position array"));
    }
    if faces.len() % 3 != 0 {
        return Err(TilerError::codec(format!(
            "draco: face index count {} is not a multiple of 3",
            faces.len()
        )));
    }

    let vertex_count = positions.len();
    let spec = DracoMeshSpec {
        positions,
        normals: (normals.len() == vertex_count).then_some(normals),
        uvs: (uvs.len() == vertex_count).then_some(uvs),
        batch_ids: batch_ids.filter(|b| b.len() == vertex_count),
        faces,
        params: params.clamped(),
    };
    encoder.encode(&spec)
}

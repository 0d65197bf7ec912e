//! Packed vertex layout handed to the mesh optimizer and Draco.

use bytemuck::{Pod, Zeroable};

/// 32-byte interleaved vertex record: position, normal, UV.
///
/// Deduplication compares these bitwise, so the layout must stay tightly
/// packed with no padding.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PackedVertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub nx: f32,
    pub ny: f32,
    pub nz: f32,
    pub u: f32,
    pub v: f32,
}

impl PackedVertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        PackedVertex {
            x: position[0],
            y: position[1],
            z: position[2],
            nx: normal[0],
            ny: normal[1],
            nz: normal[2],
            u: uv[0],
            v: uv[1],
        }
    }

    pub fn position(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn normal(&self) -> [f32; 3] {
        [self.nx, self.ny, self.nz]
    }

    pub fn uv(&self) -> [f32; 2] {
        [self.u, self.v]
    }

    pub fn has_normal(&self) -> bool {
        self.nx != 0.0 || self.ny != 0.0 || self.nz != 0.0
    }
}

/// Interleave parallel attribute arrays into packed records. Normals and UVs
/// shorter than the position array read as zero.
pub fn pack_vertices(
    positions: &[[f32; 3]],
    normals: &[[f32; 3]],
    uvs: &[[f32; 2]],
) -> Vec<PackedVertex> {
    positions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let n = normals.get(i).copied().unwrap_or([0.0; 3]);
            let t = uvs.get(i).copied().unwrap_or([0.0; 2]);
            PackedVertex::new(*p, n, t)
        })
        .collect()
}

/// Split packed records back into parallel attribute arrays.
pub fn unpack_vertices(
    vertices: &[PackedVertex],
) -> (Vec<[f32; 3]>, Vec<[f32; 3]>, Vec<[f32; 2]>) {
    let mut positions = Vec::with_capacity(vertices.len());
    let mut normals = Vec::with_capacity(vertices.len());
    let mut uvs = Vec::with_capacity(vertices.len());
    for v in vertices {
        positions.push(v.position());
        normals.push(v.normal());
        uvs.push(v.uv());
    }
    (positions, normals, uvs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_vertex_is_32_bytes() {
        assert_eq!(std::mem::size_of::<PackedVertex>(), 32);
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        let positions = vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let normals = vec![[0.0, 0.0, 1.0], [0.0, 1.0, 0.0]];
        let uvs = vec![[0.25, 0.75], [0.5, 0.5]];

        let packed = pack_vertices(&positions, &normals, &uvs);
        let (p, n, t) = unpack_vertices(&packed);
        assert_eq!(p, positions);
        assert_eq!(n, normals);
        assert_eq!(t, uvs);
    }

    #[test]
    fn test_short_attribute_arrays_read_as_zero() {
        let positions = vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let packed = pack_vertices(&positions, &[], &[]);
        assert_eq!(packed[1].normal(), [0.0; 3]);
        assert_eq!(packed[1].uv(), [0.0; 2]);
    }
}

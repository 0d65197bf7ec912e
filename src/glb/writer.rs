//! GLB assembly: pack flattened geometry, textures, and materials into one
//! buffer plus the glTF document, then serialize the binary container.
//!
//! The writer keeps a build state (buffer, model, active draw range, global
//! bbox) threaded through every primitive emission. Within one geometry,
//! attribute accessors are shared across primitive sets unless a draw range
//! is active, which always gets fresh range-limited accessors.

use glam::Vec3;
use log::warn;
use serde_json::{json, Map, Value};

use crate::error::{Result, TilerError};
use crate::mesh::draco::compress_geometry;
use crate::mesh::simplify::optimize_and_simplify;
use crate::mesh::{
    pack_vertices, triangulate, unpack_vertices, DracoEncoder, DracoParams, MeshOptimizer,
    SimplifyParams,
};
use crate::scene::extract::{texture_table, GeometryData};
use crate::scene::node::{IndexArray, PrimitiveMode, PrimitiveSet};
use crate::texture::{process_texture, TextureCompressor};

use super::model::*;

/// Feature toggles for one GLB build.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlbOptions {
    pub ktx2: bool,
    pub meshopt: bool,
    pub draco: bool,
}

/// Borrowed codec seams for one build. Absent seams disable their feature.
#[derive(Clone, Copy, Default)]
pub struct CodecSeams<'a> {
    pub optimizer: Option<&'a dyn MeshOptimizer>,
    pub draco: Option<&'a dyn DracoEncoder>,
    pub texture: Option<&'a dyn TextureCompressor>,
}

/// Axis-aligned extent of everything the build emitted, in mesh space.
#[derive(Debug, Clone, Copy)]
pub struct MeshExtents {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl MeshExtents {
    pub fn is_valid(&self) -> bool {
        (0..3).all(|i| self.min[i] <= self.max[i])
    }
}

struct BuildState {
    model: Gltf,
    buffer: Vec<u8>,
    point_min: Vec3,
    point_max: Vec3,
    draw_first: Option<usize>,
    draw_count: usize,
}

/// Accessor ids already emitted for the current geometry, reused by
/// subsequent primitive sets when no draw range is active.
#[derive(Default)]
struct PrimitiveState {
    position: Option<usize>,
    normal: Option<usize>,
    texcoord: Option<usize>,
}

fn align4(buffer: &mut Vec<u8>) {
    while buffer.len() % 4 != 0 {
        buffer.push(0);
    }
}

fn gltf_mode(mode: PrimitiveMode) -> u32 {
    match mode {
        PrimitiveMode::Points => MODE_POINTS,
        PrimitiveMode::Lines => MODE_LINES,
        PrimitiveMode::LineLoop => MODE_LINE_LOOP,
        PrimitiveMode::LineStrip => MODE_LINE_STRIP,
        PrimitiveMode::Triangles | PrimitiveMode::Quads | PrimitiveMode::QuadStrip => {
            MODE_TRIANGLES
        }
        PrimitiveMode::TriangleStrip => MODE_TRIANGLE_STRIP,
        PrimitiveMode::TriangleFan | PrimitiveMode::Polygon => MODE_TRIANGLE_FAN,
    }
}

/// Index storage width by maximum value. 65 535 is the u16 restart sentinel,
/// so it bumps to 32-bit storage.
fn index_component_type(max_value: u32) -> u32 {
    if max_value <= u8::MAX as u32 {
        COMPONENT_UNSIGNED_BYTE
    } else if max_value < u16::MAX as u32 {
        COMPONENT_UNSIGNED_SHORT
    } else {
        COMPONENT_UNSIGNED_INT
    }
}

impl BuildState {
    fn active_range(&self, len: usize) -> (usize, usize) {
        match self.draw_first {
            Some(first) => (first.min(len), (first + self.draw_count).min(len)),
            None => (0, len),
        }
    }

    fn push_vec3_accessor(&mut self, data: &[[f32; 3]], track_bbox: bool) -> usize {
        let (start, end) = self.active_range(data.len());
        let byte_offset = self.buffer.len();
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for v in &data[start..end] {
            for c in v {
                self.buffer.extend_from_slice(&c.to_le_bytes());
            }
            min = min.min(Vec3::from(*v));
            max = max.max(Vec3::from(*v));
        }
        let byte_length = self.buffer.len() - byte_offset;
        align4(&mut self.buffer);

        if track_bbox && min.x <= max.x && min.y <= max.y && min.z <= max.z {
            self.point_min = self.point_min.min(min);
            self.point_max = self.point_max.max(max);
        }

        self.model.buffer_views.push(BufferView {
            buffer: 0,
            byte_offset,
            byte_length,
            target: Some(TARGET_ARRAY_BUFFER),
        });
        self.model.accessors.push(Accessor {
            buffer_view: Some(self.model.buffer_views.len() - 1),
            byte_offset: 0,
            component_type: COMPONENT_FLOAT,
            count: end - start,
            type_: "VEC3",
            min: Some(vec![min.x as f64, min.y as f64, min.z as f64]),
            max: Some(vec![max.x as f64, max.y as f64, max.z as f64]),
        });
        self.model.accessors.len() - 1
    }

    fn push_vec2_accessor(&mut self, data: &[[f32; 2]]) -> usize {
        let (start, end) = self.active_range(data.len());
        let byte_offset = self.buffer.len();
        let mut min = [f32::MAX; 2];
        let mut max = [f32::MIN; 2];
        for v in &data[start..end] {
            for (i, c) in v.iter().enumerate() {
                self.buffer.extend_from_slice(&c.to_le_bytes());
                min[i] = min[i].min(*c);
                max[i] = max[i].max(*c);
            }
        }
        let byte_length = self.buffer.len() - byte_offset;
        align4(&mut self.buffer);

        self.model.buffer_views.push(BufferView {
            buffer: 0,
            byte_offset,
            byte_length,
            target: Some(TARGET_ARRAY_BUFFER),
        });
        self.model.accessors.push(Accessor {
            buffer_view: Some(self.model.buffer_views.len() - 1),
            byte_offset: 0,
            component_type: COMPONENT_FLOAT,
            count: end - start,
            type_: "VEC2",
            min: Some(vec![min[0] as f64, min[1] as f64]),
            max: Some(vec![max[0] as f64, max[1] as f64]),
        });
        self.model.accessors.len() - 1
    }

    fn push_index_accessor(&mut self, indices: &[u32]) -> usize {
        let max_value = indices.iter().copied().max().unwrap_or(0);
        let min_value = indices.iter().copied().min().unwrap_or(0);
        let component_type = index_component_type(max_value);

        let byte_offset = self.buffer.len();
        match component_type {
            COMPONENT_UNSIGNED_BYTE => {
                for &i in indices {
                    self.buffer.push(i as u8);
                }
            }
            COMPONENT_UNSIGNED_SHORT => {
                for &i in indices {
                    self.buffer.extend_from_slice(&(i as u16).to_le_bytes());
                }
            }
            _ => {
                for &i in indices {
                    self.buffer.extend_from_slice(&i.to_le_bytes());
                }
            }
        }
        let byte_length = self.buffer.len() - byte_offset;
        align4(&mut self.buffer);

        self.model.buffer_views.push(BufferView {
            buffer: 0,
            byte_offset,
            byte_length,
            target: Some(TARGET_ELEMENT_ARRAY_BUFFER),
        });
        self.model.accessors.push(Accessor {
            buffer_view: Some(self.model.buffer_views.len() - 1),
            byte_offset: 0,
            component_type,
            count: indices.len(),
            type_: "SCALAR",
            min: Some(vec![min_value as f64]),
            max: Some(vec![max_value as f64]),
        });
        self.model.accessors.len() - 1
    }

    /// Accessor without a backing buffer view, for Draco primitives.
    fn push_unbacked_accessor(
        &mut self,
        component_type: u32,
        count: usize,
        type_: &'static str,
        min: Option<Vec<f64>>,
        max: Option<Vec<f64>>,
    ) -> usize {
        self.model.accessors.push(Accessor {
            buffer_view: None,
            byte_offset: 0,
            component_type,
            count,
            type_,
            min,
            max,
        });
        self.model.accessors.len() - 1
    }
}

/// Build the in-memory model and buffer for one flattened scene.
pub fn build_model(
    geometries: &[GeometryData],
    options: &GlbOptions,
    seams: &CodecSeams<'_>,
    generator: &str,
) -> Result<(Gltf, Vec<u8>, MeshExtents)> {
    let (textures, texture_slots) = texture_table(geometries);

    let mut state = BuildState {
        model: Gltf {
            asset: Asset {
                version: "2.0".into(),
                generator: Some(generator.to_string()),
            },
            meshes: vec![Mesh::default()],
            ..Gltf::default()
        },
        buffer: Vec::new(),
        point_min: Vec3::splat(f32::MAX),
        point_max: Vec3::splat(f32::MIN),
        draw_first: None,
        draw_count: 0,
    };

    let mut draco_used = false;
    for (gi, geometry) in geometries.iter().enumerate() {
        if geometry.positions.is_empty() {
            continue;
        }
        let material = texture_slots[gi];

        let simplified;
        let geometry = if options.meshopt {
            simplified = simplify_geometry(geometry, seams.optimizer);
            simplified.as_ref().unwrap_or(geometry)
        } else {
            geometry
        };

        if options.draco {
            if let Some(encoder) = seams.draco {
                match emit_draco_primitive(&mut state, geometry, encoder, material) {
                    Ok(()) => {
                        draco_used = true;
                        continue;
                    }
                    Err(e) => warn!("draco compression failed, emitting uncompressed: {e}"),
                }
            }
        }

        emit_plain_primitives(&mut state, geometry, material)?;
    }

    if state.model.meshes[0].primitives.is_empty() {
        return Err(TilerError::parse("scene contains no emittable primitives"));
    }

    let extents = MeshExtents {
        min: [
            state.point_min.x as f64,
            state.point_min.y as f64,
            state.point_min.z as f64,
        ],
        max: [
            state.point_max.x as f64,
            state.point_max.y as f64,
            state.point_max.z as f64,
        ],
    };

    // Images and their buffer views.
    let mut ktx2_used = false;
    let mut image_is_ktx2 = Vec::with_capacity(textures.len());
    for tex in &textures {
        let encoded = process_texture(Some(tex), seams.texture, options.ktx2);
        ktx2_used |= encoded.is_ktx2();
        image_is_ktx2.push(encoded.is_ktx2());

        let byte_offset = state.buffer.len();
        state.buffer.extend_from_slice(&encoded.data);
        let byte_length = state.buffer.len() - byte_offset;
        align4(&mut state.buffer);

        state.model.buffer_views.push(BufferView {
            buffer: 0,
            byte_offset,
            byte_length,
            target: None,
        });
        state.model.images.push(Image {
            mime_type: Some(encoded.mime_type.to_string()),
            buffer_view: Some(state.model.buffer_views.len() - 1),
            uri: None,
        });
    }

    // One texture per image, sharing a single sampler.
    for (i, &is_ktx2) in image_is_ktx2.iter().enumerate() {
        let mut texture = Texture {
            sampler: Some(0),
            source: None,
            extensions: None,
        };
        if is_ktx2 {
            let mut ext = Map::new();
            ext.insert(EXT_TEXTURE_BASISU.to_string(), json!({ "source": i }));
            texture.extensions = Some(ext);
        } else {
            texture.source = Some(i);
        }
        state.model.textures.push(texture);
    }

    // Default white unlit material per texture.
    for i in 0..textures.len() {
        let mut ext = Map::new();
        ext.insert(EXT_UNLIT.to_string(), Value::Object(Map::new()));
        state.model.materials.push(GltfMaterial {
            name: "default".into(),
            pbr_metallic_roughness: PbrMetallicRoughness {
                base_color_factor: [1.0, 1.0, 1.0, 1.0],
                metallic_factor: 0.0,
                roughness_factor: 1.0,
                base_color_texture: Some(TextureInfo { index: i }),
            },
            extensions: Some(ext),
        });
    }

    state.model.samplers = vec![Sampler::default()];
    state.model.nodes = vec![Node { mesh: Some(0) }];
    state.model.scenes = vec![Scene { nodes: vec![0] }];
    state.model.scene = Some(0);

    let mut extensions = vec![EXT_UNLIT.to_string()];
    if ktx2_used {
        extensions.push(EXT_TEXTURE_BASISU.to_string());
    }
    if draco_used {
        extensions.push(EXT_DRACO.to_string());
    }
    state.model.extensions_used = extensions.clone();
    state.model.extensions_required = extensions;

    state.model.buffers = vec![Buffer {
        byte_length: state.buffer.len(),
        uri: None,
    }];

    Ok((state.model, state.buffer, extents))
}

/// Run the optimize/simplify pass over a geometry, collapsing its surface
/// primitive sets into one triangle list. Returns `None` when there is
/// nothing to simplify.
fn simplify_geometry(
    geometry: &GeometryData,
    optimizer: Option<&dyn MeshOptimizer>,
) -> Option<GeometryData> {
    let optimizer = optimizer?;
    let mut faces = Vec::new();
    for set in &geometry.primitive_sets {
        match triangulate(set) {
            Ok(tris) => faces.extend(tris),
            Err(e) => {
                warn!("skipping simplification: {e}");
                return None;
            }
        }
    }
    if faces.is_empty() {
        return None;
    }

    let packed = pack_vertices(&geometry.positions, &geometry.normals, &geometry.uvs);
    let params = SimplifyParams {
        enable_simplification: true,
        ..SimplifyParams::default()
    };
    let (vertices, indices) = optimize_and_simplify(&packed, &faces, &params, optimizer);
    let (positions, normals, uvs) = unpack_vertices(&vertices);

    Some(GeometryData {
        positions,
        normals,
        uvs,
        primitive_sets: vec![PrimitiveSet::DrawElements {
            mode: PrimitiveMode::Triangles,
            indices: IndexArray::U32(indices),
        }],
        texture: geometry.texture.clone(),
        material: geometry.material.clone(),
    })
}

/// Emit one Draco-compressed primitive for the whole geometry.
fn emit_draco_primitive(
    state: &mut BuildState,
    geometry: &GeometryData,
    encoder: &dyn DracoEncoder,
    material: Option<usize>,
) -> Result<()> {
    let mut faces = Vec::new();
    for set in &geometry.primitive_sets {
        faces.extend(triangulate(set)?);
    }
    if faces.is_empty() {
        return Err(TilerError::codec("geometry has no surface triangles"));
    }

    let blob = compress_geometry(
        encoder,
        &geometry.positions,
        &geometry.normals,
        &geometry.uvs,
        None,
        &faces,
        &DracoParams {
            enable_compression: true,
            ..DracoParams::default()
        },
    )?;

    align4(&mut state.buffer);
    let byte_offset = state.buffer.len();
    state.buffer.extend_from_slice(&blob.data);
    let byte_length = state.buffer.len() - byte_offset;
    align4(&mut state.buffer);
    state.model.buffer_views.push(BufferView {
        buffer: 0,
        byte_offset,
        byte_length,
        target: None,
    });
    let draco_view = state.model.buffer_views.len() - 1;

    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for p in &geometry.positions {
        min = min.min(Vec3::from(*p));
        max = max.max(Vec3::from(*p));
    }
    state.point_min = state.point_min.min(min);
    state.point_max = state.point_max.max(max);

    let max_face = faces.iter().copied().max().unwrap_or(0);
    let min_face = faces.iter().copied().min().unwrap_or(0);
    let indices_accessor = state.push_unbacked_accessor(
        index_component_type(max_face),
        faces.len(),
        "SCALAR",
        Some(vec![min_face as f64]),
        Some(vec![max_face as f64]),
    );

    let mut primitive = Primitive::with_mode(MODE_TRIANGLES);
    primitive.indices = Some(indices_accessor);
    primitive.material = material;

    let position_accessor = state.push_unbacked_accessor(
        COMPONENT_FLOAT,
        geometry.positions.len(),
        "VEC3",
        Some(vec![min.x as f64, min.y as f64, min.z as f64]),
        Some(vec![max.x as f64, max.y as f64, max.z as f64]),
    );
    primitive
        .attributes
        .insert("POSITION".into(), position_accessor);

    let mut draco_attributes = Map::new();
    draco_attributes.insert("POSITION".into(), json!(blob.attributes.position));

    if let Some(id) = blob.attributes.normal {
        let accessor = state.push_unbacked_accessor(
            COMPONENT_FLOAT,
            geometry.normals.len(),
            "VEC3",
            None,
            None,
        );
        primitive.attributes.insert("NORMAL".into(), accessor);
        draco_attributes.insert("NORMAL".into(), json!(id));
    }
    if let Some(id) = blob.attributes.texcoord {
        let accessor =
            state.push_unbacked_accessor(COMPONENT_FLOAT, geometry.uvs.len(), "VEC2", None, None);
        primitive.attributes.insert("TEXCOORD_0".into(), accessor);
        draco_attributes.insert("TEXCOORD_0".into(), json!(id));
    }
    if let Some(id) = blob.attributes.batch_id {
        draco_attributes.insert("_BATCHID".into(), json!(id));
    }

    let mut ext = Map::new();
    ext.insert(
        EXT_DRACO.to_string(),
        json!({ "bufferView": draco_view, "attributes": Value::Object(draco_attributes) }),
    );
    primitive.extensions = Some(ext);

    state.model.meshes[0].primitives.push(primitive);
    Ok(())
}

/// Emit uncompressed primitives for every primitive set of a geometry.
fn emit_plain_primitives(
    state: &mut BuildState,
    geometry: &GeometryData,
    material: Option<usize>,
) -> Result<()> {
    let mut pstate = PrimitiveState::default();
    for set in &geometry.primitive_sets {
        match set {
            PrimitiveSet::DrawElements { mode, indices } => {
                state.draw_first = None;
                let emitted: Vec<u32> = match mode {
                    PrimitiveMode::Quads | PrimitiveMode::QuadStrip => triangulate(set)?,
                    _ => indices.to_u32_vec(),
                };
                if emitted.is_empty() {
                    continue;
                }
                let indices_accessor = state.push_index_accessor(&emitted);
                let mut primitive = Primitive::with_mode(gltf_mode(*mode));
                primitive.indices = Some(indices_accessor);
                primitive.material = material;
                emit_attributes(state, &mut pstate, geometry, &mut primitive);
                state.model.meshes[0].primitives.push(primitive);
            }
            PrimitiveSet::DrawArrays { mode, first, count } => {
                emit_draw_range(state, &mut pstate, geometry, material, *mode, *first, *count)?;
            }
            PrimitiveSet::DrawArrayLengths {
                mode,
                first,
                lengths,
            } => {
                let mut base = *first;
                for &len in lengths {
                    emit_draw_range(state, &mut pstate, geometry, material, *mode, base, len)?;
                    base += len;
                }
            }
        }
    }
    state.draw_first = None;
    Ok(())
}

/// Emit one `[first, first + count)` range primitive. Quad modes generate
/// range-relative indices; everything else renders the range directly.
fn emit_draw_range(
    state: &mut BuildState,
    pstate: &mut PrimitiveState,
    geometry: &GeometryData,
    material: Option<usize>,
    mode: PrimitiveMode,
    first: usize,
    count: usize,
) -> Result<()> {
    if count == 0 {
        return Ok(());
    }
    state.draw_first = Some(first);
    state.draw_count = count;

    let mut primitive = Primitive::with_mode(gltf_mode(mode));
    primitive.material = material;

    if matches!(mode, PrimitiveMode::Quads | PrimitiveMode::QuadStrip) {
        // Indices are relative to the emitted range.
        let relative = PrimitiveSet::DrawArrays {
            mode,
            first: 0,
            count,
        };
        let emitted = triangulate(&relative)?;
        if emitted.is_empty() {
            state.draw_first = None;
            return Ok(());
        }
        primitive.indices = Some(state.push_index_accessor(&emitted));
    }

    emit_attributes(state, pstate, geometry, &mut primitive);
    state.model.meshes[0].primitives.push(primitive);
    state.draw_first = None;
    Ok(())
}

/// Attach POSITION / NORMAL / TEXCOORD_0, reusing per-geometry accessors
/// when no draw range is active.
fn emit_attributes(
    state: &mut BuildState,
    pstate: &mut PrimitiveState,
    geometry: &GeometryData,
    primitive: &mut Primitive,
) {
    let shared = state.draw_first.is_none();

    let position = match (shared, pstate.position) {
        (true, Some(accessor)) => accessor,
        _ => {
            let accessor = state.push_vec3_accessor(&geometry.positions, true);
            if shared {
                pstate.position = Some(accessor);
            }
            accessor
        }
    };
    primitive.attributes.insert("POSITION".into(), position);

    if !geometry.normals.is_empty() {
        let normal = match (shared, pstate.normal) {
            (true, Some(accessor)) => accessor,
            _ => {
                let accessor = state.push_vec3_accessor(&geometry.normals, false);
                if shared {
                    pstate.normal = Some(accessor);
                }
                accessor
            }
        };
        primitive.attributes.insert("NORMAL".into(), normal);
    }

    if !geometry.uvs.is_empty() {
        let texcoord = match (shared, pstate.texcoord) {
            (true, Some(accessor)) => accessor,
            _ => {
                let accessor = state.push_vec2_accessor(&geometry.uvs);
                if shared {
                    pstate.texcoord = Some(accessor);
                }
                accessor
            }
        };
        primitive.attributes.insert("TEXCOORD_0".into(), texcoord);
    }
}

const GLB_MAGIC: u32 = 0x46546C67; // "glTF"
const CHUNK_JSON: u32 = 0x4E4F534A; // "JSON"
const CHUNK_BIN: u32 = 0x004E4942; // "BIN\0"

/// Serialize a model and its buffer. `binary` yields the GLB container;
/// otherwise a text glTF with the buffer embedded as a base64 data URI.
pub fn serialize(model: &Gltf, buffer: &[u8], binary: bool) -> Result<Vec<u8>> {
    if binary {
        to_glb_bytes(model, buffer)
    } else {
        to_gltf_text(model, buffer)
    }
}

/// Serialize to the binary GLB container: 12-byte header, space-padded JSON
/// chunk, zero-padded BIN chunk.
pub fn to_glb_bytes(model: &Gltf, buffer: &[u8]) -> Result<Vec<u8>> {
    let mut json = serde_json::to_vec(model)?;
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let mut bin = buffer.to_vec();
    align4(&mut bin);

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&json);
    out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
    out.extend_from_slice(&bin);
    Ok(out)
}

/// Serialize to text glTF with the buffer as a data URI.
fn to_gltf_text(model: &Gltf, buffer: &[u8]) -> Result<Vec<u8>> {
    use base64::Engine as _;

    let mut model = model.clone();
    if let Some(b) = model.buffers.first_mut() {
        b.uri = Some(format!(
            "data:application/octet-stream;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(buffer)
        ));
    }
    Ok(serde_json::to_vec_pretty(&model)?)
}

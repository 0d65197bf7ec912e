//! The scene-graph node tree handed over by the external loader.
//!
//! Decoding the binary scene-graph format is not this crate's job; a
//! [`SceneLoader`](super::SceneLoader) produces this tree and the pipeline
//! consumes it. The shapes mirror what paged-LOD photogrammetry files carry:
//! groups, matrix transforms, paged-LOD nodes referencing child files by
//! relative path, and drawables with vertex/normal/UV arrays plus a state
//! set.

use std::sync::Arc;

use glam::DMat4;

/// A node in the loaded scene graph.
#[derive(Debug, Clone)]
pub enum SceneNode {
    Group(Group),
    Transform(MatrixTransform),
    PagedLod(PagedLod),
    Geometry(Box<Drawable>),
}

/// Plain grouping node.
#[derive(Debug, Clone, Default)]
pub struct Group {
    pub children: Vec<SceneNode>,
}

/// Transform node; the matrix multiplies into the accumulated model
/// transform for everything below it.
#[derive(Debug, Clone)]
pub struct MatrixTransform {
    pub matrix: DMat4,
    pub children: Vec<SceneNode>,
}

/// Paged level-of-detail node.
///
/// `file_names[0]` names the in-memory coarse representation already present
/// under `children`; entries `1..` are relative paths of external child
/// files, resolved against `database_path`.
#[derive(Debug, Clone, Default)]
pub struct PagedLod {
    pub database_path: String,
    pub file_names: Vec<String>,
    pub children: Vec<SceneNode>,
}

/// How a drawable's normal array binds to its vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalBinding {
    PerVertex,
    Overall,
    PerPrimitiveSet,
}

/// Leaf geometry: vertex arrays plus rendering recipes and state.
#[derive(Debug, Clone)]
pub struct Drawable {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub normal_binding: NormalBinding,
    pub uvs: Vec<[f32; 2]>,
    pub primitive_sets: Vec<PrimitiveSet>,
    pub state: Option<StateSet>,
}

impl Default for Drawable {
    fn default() -> Self {
        Drawable {
            positions: Vec::new(),
            normals: Vec::new(),
            normal_binding: NormalBinding::PerVertex,
            uvs: Vec::new(),
            primitive_sets: Vec::new(),
            state: None,
        }
    }
}

/// Rendering attributes attached to a drawable. Only texture unit 0 and the
/// material attribute survive extraction.
#[derive(Debug, Clone, Default)]
pub struct StateSet {
    pub texture: Option<Arc<TextureImage>>,
    pub material: Option<Material>,
}

/// Classic fixed-function material colors.
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub emission: [f32; 4],
    pub shininess: f32,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            name: String::new(),
            ambient: [0.2, 0.2, 0.2, 1.0],
            diffuse: [0.8, 0.8, 0.8, 1.0],
            specular: [0.0, 0.0, 0.0, 1.0],
            emission: [0.0, 0.0, 0.0, 1.0],
            shininess: 0.0,
        }
    }
}

/// Pixel layout of a texture image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Luminance,
    LuminanceAlpha,
    Rgb,
    Rgba,
    Bgra,
}

impl PixelFormat {
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Luminance => 1,
            PixelFormat::LuminanceAlpha => 2,
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba | PixelFormat::Bgra => 4,
        }
    }
}

/// Block compression applied to the payload, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureCompression {
    None,
    Dxt1,
    Dxt3,
    Dxt5,
}

/// A texture image as delivered by the loader. `row_step != row_size` means
/// rows are padded; every consumer must honor the step.
#[derive(Debug, Clone)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub row_step: usize,
    pub row_size: usize,
    pub compression: TextureCompression,
    pub data: Vec<u8>,
}

impl TextureImage {
    /// Tightly-packed image with no row padding.
    pub fn packed(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        let row_size = width as usize * format.channels();
        TextureImage {
            width,
            height,
            format,
            row_step: row_size,
            row_size,
            compression: TextureCompression::None,
            data,
        }
    }

    pub fn has_row_padding(&self) -> bool {
        self.row_step != self.row_size
    }
}

/// GL-style primitive assembly mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
    Quads,
    QuadStrip,
    Polygon,
}

impl PrimitiveMode {
    /// Whether the mode produces surface triangles once assembled.
    pub fn is_surface(&self) -> bool {
        matches!(
            self,
            PrimitiveMode::Triangles
                | PrimitiveMode::TriangleStrip
                | PrimitiveMode::TriangleFan
                | PrimitiveMode::Quads
                | PrimitiveMode::QuadStrip
                | PrimitiveMode::Polygon
        )
    }
}

/// Element indices at their source width.
#[derive(Debug, Clone)]
pub enum IndexArray {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexArray {
    pub fn len(&self) -> usize {
        match self {
            IndexArray::U8(v) => v.len(),
            IndexArray::U16(v) => v.len(),
            IndexArray::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> u32 {
        match self {
            IndexArray::U8(v) => v[i] as u32,
            IndexArray::U16(v) => v[i] as u32,
            IndexArray::U32(v) => v[i],
        }
    }

    /// The primitive-restart sentinel for this index width.
    pub fn restart_value(&self) -> u32 {
        match self {
            IndexArray::U8(_) => u8::MAX as u32,
            IndexArray::U16(_) => u16::MAX as u32,
            IndexArray::U32(_) => u32::MAX,
        }
    }

    pub fn to_u32_vec(&self) -> Vec<u32> {
        match self {
            IndexArray::U8(v) => v.iter().map(|&i| i as u32).collect(),
            IndexArray::U16(v) => v.iter().map(|&i| i as u32).collect(),
            IndexArray::U32(v) => v.clone(),
        }
    }
}

/// A rendering recipe over a drawable's vertex arrays.
#[derive(Debug, Clone)]
pub enum PrimitiveSet {
    /// Explicit element indices.
    DrawElements {
        mode: PrimitiveMode,
        indices: IndexArray,
    },
    /// A contiguous `[first, first + count)` vertex range.
    DrawArrays {
        mode: PrimitiveMode,
        first: usize,
        count: usize,
    },
    /// Consecutive sub-ranges starting at `first`; each length is an
    /// independent strip/fan/quad run.
    DrawArrayLengths {
        mode: PrimitiveMode,
        first: usize,
        lengths: Vec<usize>,
    },
}

impl PrimitiveSet {
    pub fn mode(&self) -> PrimitiveMode {
        match self {
            PrimitiveSet::DrawElements { mode, .. }
            | PrimitiveSet::DrawArrays { mode, .. }
            | PrimitiveSet::DrawArrayLengths { mode, .. } => *mode,
        }
    }
}

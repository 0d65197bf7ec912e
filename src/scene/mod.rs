//! Scene-graph interface and flattening.
//!
//! [`node`] defines the tree the external decoder hands over, [`loader`] the
//! seam to that decoder, and [`extract`] the walk that flattens one file
//! into geometry buckets, textures, and paged child references.

pub mod correction;
pub mod extract;
pub mod loader;
pub mod node;
pub mod normals;

pub use extract::{
    extract_scene, texture_table, ExtractedScene, GeometryData, NodeSelect,
    MAX_VERTICES_PER_DRAWABLE,
};
pub use loader::SceneLoader;
pub use node::{
    Drawable, Group, IndexArray, Material, MatrixTransform, NormalBinding, PagedLod, PixelFormat,
    PrimitiveMode, PrimitiveSet, SceneNode, StateSet, TextureCompression, TextureImage,
};

//! glTF model assembly and GLB serialization.

pub mod model;
pub mod writer;

pub use model::Gltf;
pub use writer::{
    build_model, serialize, to_glb_bytes, CodecSeams, GlbOptions, MeshExtents,
};

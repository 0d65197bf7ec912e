//! tileforge: convert paged-LOD photogrammetry scene datasets into 3D Tiles.
//!
//! The pipeline walks hierarchical scene-graph files (root tiles referencing
//! LOD children by relative path), flattens each file's drawables into a
//! canonical mesh, packs meshes and textures into binary glTF, wraps the
//! result in B3DM frames, and assembles the tileset.json manifest tree with
//! bounding volumes, geometric errors, and the dataset's ECEF root
//! transform.
//!
//! The scene-graph decoder, the Draco and Basis Universal encoders, and the
//! mesh optimizer are external collaborators; the crate defines their trait
//! seams ([`scene::SceneLoader`], [`mesh::DracoEncoder`],
//! [`texture::TextureCompressor`], [`mesh::MeshOptimizer`]) and works with
//! whatever implementations the deployment supplies. Missing codecs degrade
//! to the uncompressed paths; a missing loader is the one seam every
//! conversion needs.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use tileforge::{ConvertOptions, Converter, SceneLoader};
//!
//! fn run(loader: Arc<dyn SceneLoader>) -> tileforge::Result<()> {
//!     let mut converter = Converter::new(loader);
//!     converter.convert_batch(
//!         Path::new("in"),
//!         Path::new("out"),
//!         0.0,
//!         0.0,
//!         100,
//!         &ConvertOptions::default(),
//!     )
//! }
//! ```

pub mod convert;
pub mod error;
pub mod geo;
pub mod glb;
pub mod mesh;
pub mod metadata;
pub mod scene;
pub mod texture;
pub mod tiles;

pub use convert::{Codecs, ConvertOptions, Converter, TileConversion};
pub use error::{Result, TilerError};
pub use geo::GeoTransform;
pub use mesh::{DracoEncoder, MeshOptimizer};
pub use metadata::{parse_metadata_xml, DatasetMetadata, SrsKind};
pub use scene::{NodeSelect, SceneLoader};
pub use texture::TextureCompressor;
pub use tiles::{LodNode, NodeKind, TileBox};

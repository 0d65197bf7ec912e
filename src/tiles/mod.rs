//! 3D Tiles output: LOD trees, B3DM framing, tileset manifests, discovery.

pub mod b3dm;
pub mod bounds;
pub mod tileset;
pub mod tree;
pub mod walker;

pub use b3dm::{decode_b3dm, encode_b3dm, B3dmFrame, B3dmHeader};
pub use bounds::TileBox;
pub use tileset::{
    tile_json_from_tree, wrap_tileset, BoundingVolume, TileContent, TileJson, TilesetAsset,
    TilesetJson,
};
pub use tree::{lod_level, LodNode, NodeKind};
pub use walker::{find_root_file, read, scan_osgb_files, scan_osgb_folders, scan_tile_directories};

//! Tileset manifest (tileset.json) data model and assembly.

use serde::Serialize;

use super::bounds::TileBox;
use super::tree::LodNode;

/// Asset block of a tileset manifest.
#[derive(Debug, Clone, Serialize)]
pub struct TilesetAsset {
    pub version: &'static str,
    #[serde(rename = "gltfUpAxis")]
    pub gltf_up_axis: &'static str,
}

impl Default for TilesetAsset {
    fn default() -> Self {
        TilesetAsset {
            version: "1.0",
            gltf_up_axis: "Z",
        }
    }
}

/// Bounding volume of a tile; this writer emits boxes and regions.
#[derive(Debug, Clone, Serialize)]
pub enum BoundingVolume {
    #[serde(rename = "box")]
    Box([f64; 12]),
    #[serde(rename = "region")]
    Region([f64; 6]),
}

#[derive(Debug, Clone, Serialize)]
pub struct TileContent {
    pub uri: String,
}

/// One node of the manifest tree.
#[derive(Debug, Clone, Serialize)]
pub struct TileJson {
    #[serde(rename = "geometricError")]
    pub geometric_error: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<[f64; 16]>,
    #[serde(rename = "boundingVolume")]
    pub bounding_volume: BoundingVolume,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<TileContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refine: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TileJson>,
}

impl TileJson {
    pub fn new(geometric_error: f64, bounding_volume: BoundingVolume) -> Self {
        TileJson {
            geometric_error,
            transform: None,
            bounding_volume,
            content: None,
            refine: None,
            children: Vec::new(),
        }
    }
}

/// Root manifest document.
#[derive(Debug, Clone, Serialize)]
pub struct TilesetJson {
    pub asset: TilesetAsset,
    #[serde(rename = "geometricError")]
    pub geometric_error: f64,
    pub root: TileJson,
}

/// Wrap a tile tree in a complete manifest.
pub fn wrap_tileset(root: TileJson, geometric_error: f64) -> TilesetJson {
    TilesetJson {
        asset: TilesetAsset::default(),
        geometric_error,
        root,
    }
}

/// Convert one LOD tree into its manifest subtree. Nodes with an empty bbox
/// produce nothing, matching the converter's skip-on-failure policy.
pub fn tile_json_from_tree(node: &LodNode) -> Option<TileJson> {
    let volume = BoundingVolume::Box(node.bbox.to_box_volume()?);
    let mut tile = TileJson::new(node.geometric_error, volume);

    if let Some(file_name) = node.content_file_name() {
        tile.content = Some(TileContent {
            uri: format!("./{file_name}"),
        });
    }

    for child in &node.children {
        if let Some(child_json) = tile_json_from_tree(child) {
            tile.children.push(child_json);
        }
    }
    if !tile.children.is_empty() {
        tile.refine = Some("REPLACE");
    }

    Some(tile)
}

/// Box volume helper for merged dataset boxes.
pub fn volume_from_box(bbox: &TileBox) -> Option<BoundingVolume> {
    bbox.to_box_volume().map(BoundingVolume::Box)
}

//! Shared fixtures: an in-memory scene loader and scene builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tileforge::error::{Result, TilerError};
use tileforge::scene::{
    Drawable, Group, IndexArray, PagedLod, PixelFormat, PrimitiveMode, PrimitiveSet, SceneLoader,
    SceneNode, StateSet, TextureImage,
};

/// Loader that serves scenes from a path-keyed map.
pub struct MapLoader {
    scenes: Mutex<HashMap<PathBuf, SceneNode>>,
}

impl MapLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(MapLoader {
            scenes: Mutex::new(HashMap::new()),
        })
    }

    pub fn insert(&self, path: impl Into<PathBuf>, scene: SceneNode) {
        if let Ok(mut scenes) = self.scenes.lock() {
            scenes.insert(path.into(), scene);
        }
    }
}

impl SceneLoader for MapLoader {
    fn load(&self, path: &Path) -> Result<SceneNode> {
        let scenes = self
            .scenes
            .lock()
            .map_err(|_| TilerError::parse("loader poisoned"))?;
        scenes
            .get(path)
            .cloned()
            .ok_or_else(|| TilerError::parse(format!("no scene registered for {}", path.display())))
    }
}

/// A triangle drawable at `offset` with neither normals nor texture.
pub fn triangle_at(offset: [f32; 3]) -> Drawable {
    let [x, y, z] = offset;
    Drawable {
        positions: vec![[x, y, z], [x + 1.0, y, z], [x, y + 1.0, z]],
        primitive_sets: vec![PrimitiveSet::DrawElements {
            mode: PrimitiveMode::Triangles,
            indices: IndexArray::U8(vec![0, 1, 2]),
        }],
        ..Drawable::default()
    }
}

/// The canonical unit triangle at the origin.
pub fn triangle() -> Drawable {
    triangle_at([0.0, 0.0, 0.0])
}

/// A textured triangle with UVs and a 2×2 RGB checker texture.
pub fn textured_triangle() -> Drawable {
    let texture = Arc::new(TextureImage::packed(
        2,
        2,
        PixelFormat::Rgb,
        vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255],
    ));
    let mut drawable = triangle();
    drawable.uvs = vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
    drawable.state = Some(StateSet {
        texture: Some(texture),
        material: None,
    });
    drawable
}

/// Wrap a drawable in a paged-LOD node referencing `children` files
/// relative to `dir`.
pub fn paged_node(dir: &Path, children: &[&str], drawable: Drawable) -> SceneNode {
    let mut file_names = vec![String::new()];
    file_names.extend(children.iter().map(|c| c.to_string()));
    SceneNode::PagedLod(PagedLod {
        database_path: dir.to_string_lossy().into_owned(),
        file_names,
        children: vec![SceneNode::Geometry(Box::new(drawable))],
    })
}

/// A group of arbitrary nodes.
pub fn group(children: Vec<SceneNode>) -> SceneNode {
    SceneNode::Group(Group { children })
}

/// Split the JSON chunk out of a GLB byte stream.
pub fn glb_json(glb: &[u8]) -> serde_json::Value {
    assert_eq!(&glb[0..4], b"glTF", "not a GLB");
    let json_len = u32::from_le_bytes([glb[12], glb[13], glb[14], glb[15]]) as usize;
    let chunk_type = u32::from_le_bytes([glb[16], glb[17], glb[18], glb[19]]);
    assert_eq!(chunk_type, 0x4E4F534A, "first chunk must be JSON");
    serde_json::from_slice(&glb[20..20 + json_len]).expect("GLB JSON chunk parses")
}

/// Split the BIN chunk out of a GLB byte stream.
pub fn glb_bin(glb: &[u8]) -> Vec<u8> {
    let json_len = u32::from_le_bytes([glb[12], glb[13], glb[14], glb[15]]) as usize;
    let bin_header = 20 + json_len;
    let bin_len = u32::from_le_bytes([
        glb[bin_header],
        glb[bin_header + 1],
        glb[bin_header + 2],
        glb[bin_header + 3],
    ]) as usize;
    let chunk_type = u32::from_le_bytes([
        glb[bin_header + 4],
        glb[bin_header + 5],
        glb[bin_header + 6],
        glb[bin_header + 7],
    ]);
    assert_eq!(chunk_type, 0x004E4942, "second chunk must be BIN");
    glb[bin_header + 8..bin_header + 8 + bin_len].to_vec()
}

//! Dataset layout discovery and LOD-tree construction.
//!
//! Directory scans find root tiles; `read` recursively follows paged-LOD
//! file references to build the [`LodNode`] tree. A file that fails to load
//! logs and yields an empty node; its parent continues with the remaining
//! siblings.

use std::fs;
use std::path::{Path, PathBuf};

use log::error;

use super::tree::{LodNode, NodeKind};
use crate::scene::extract::extract_scene;
use crate::scene::loader::SceneLoader;

/// Scene-graph file extension.
const OSGB_EXT: &str = "osgb";

fn is_osgb(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case(OSGB_EXT))
        .unwrap_or(false)
}

fn subdirectories(dir: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
    }
    dirs.sort();
    dirs
}

/// Find the root scene-graph file of a tile dataset: search the first-level
/// subdirectories of `dir`, then of `dir/Data`, for the first `.osgb` whose
/// name does not carry an `_L` level marker.
pub fn find_root_file(dir: &Path) -> Option<PathBuf> {
    fn search(dir: &Path) -> Option<PathBuf> {
        for sub in subdirectories(dir) {
            for file in scan_osgb_files(&sub, false) {
                let name = file.file_name()?.to_string_lossy().into_owned();
                if !name.contains("_L") {
                    return Some(file);
                }
            }
        }
        None
    }

    search(dir).or_else(|| {
        let data = dir.join("Data");
        data.is_dir().then(|| search(&data)).flatten()
    })
}

/// Immediate `Tile_*` subdirectories that contain their namesake
/// `<name>.osgb`, returned as directory names.
pub fn scan_tile_directories(dir: &Path) -> Vec<String> {
    let mut tiles = Vec::new();
    for sub in subdirectories(dir) {
        let Some(name) = sub.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if !name.starts_with("Tile_") {
            continue;
        }
        if sub.join(format!("{name}.{OSGB_EXT}")).is_file() {
            tiles.push(name);
        }
    }
    tiles
}

/// Immediate subdirectories containing at least one `.osgb`, returned as
/// directory names.
pub fn scan_osgb_folders(dir: &Path) -> Vec<String> {
    let mut folders = Vec::new();
    for sub in subdirectories(dir) {
        if !scan_osgb_files(&sub, false).is_empty() {
            if let Some(name) = sub.file_name() {
                folders.push(name.to_string_lossy().into_owned());
            }
        }
    }
    folders
}

/// `.osgb` files in `dir`, optionally recursing into subdirectories.
pub fn scan_osgb_files(dir: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && is_osgb(&path) {
                files.push(path);
            } else if recursive && path.is_dir() {
                files.extend(scan_osgb_files(&path, true));
            }
        }
    }
    files.sort();
    files
}

/// Recursively read one root tile into an LOD tree.
///
/// Children whose subtree is a bare structural root (a split product with no
/// content of its own) are inlined into their parent. A file carrying both
/// paged and non-paged drawables splits into a structural root with the
/// paged subtree and a `LeafOther` sibling for the leftovers.
pub fn read(loader: &dyn SceneLoader, path: &Path) -> LodNode {
    let scene_root = match loader.load(path) {
        Ok(root) => root,
        Err(e) => {
            error!("read scene-graph file [{}] failed: {e}", path.display());
            return LodNode::empty();
        }
    };
    let scene = match extract_scene(&scene_root, false, None) {
        Ok(scene) => scene,
        Err(e) => {
            error!("extract [{}] failed: {e}", path.display());
            return LodNode::empty();
        }
    };

    let mut node = LodNode::new(path.to_path_buf(), NodeKind::Paged);
    for child_ref in &scene.child_refs {
        let child = read(loader, child_ref);
        if child.is_empty() {
            continue;
        }
        if child.kind == NodeKind::Root {
            node.children.extend(child.children);
        } else {
            node.children.push(child);
        }
    }

    if scene.has_paged() && scene.has_other() {
        let mut split = LodNode::new(path.to_path_buf(), NodeKind::Root);
        let other = LodNode::new(path.to_path_buf(), NodeKind::LeafOther);
        split.children.push(node);
        split.children.push(other);
        return split;
    }

    node
}

//! The LOD tree produced by walking one root tile.

use std::path::{Path, PathBuf};

use log::error;

use super::bounds::TileBox;

/// Threshold below which a child's geometric error counts as zero.
const ERROR_EPS: f64 = 1e-12;

/// Divisor applied to the largest bbox extent when no child carries a
/// non-zero error.
const EXTENT_ERROR_DIVISOR: f64 = 20.0;

/// What a tree node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Structural node with no content of its own.
    Root,
    /// Paged-LOD content; emits `<stem>.b3dm`.
    Paged,
    /// Non-paged leftovers of a split file; emits `<stem>o.b3dm`.
    LeafOther,
}

/// One node of the LOD tree.
#[derive(Debug, Clone)]
pub struct LodNode {
    pub path: PathBuf,
    pub kind: NodeKind,
    pub bbox: TileBox,
    pub geometric_error: f64,
    pub children: Vec<LodNode>,
}

impl LodNode {
    pub fn new(path: PathBuf, kind: NodeKind) -> Self {
        LodNode {
            path,
            kind,
            bbox: TileBox::default(),
            geometric_error: 0.0,
            children: Vec::new(),
        }
    }

    /// Placeholder for a file that failed to load.
    pub fn empty() -> Self {
        LodNode::new(PathBuf::new(), NodeKind::Paged)
    }

    pub fn is_empty(&self) -> bool {
        self.path.as_os_str().is_empty()
    }

    /// Whether this node emits a B3DM payload.
    pub fn has_content(&self) -> bool {
        self.kind != NodeKind::Root
    }

    /// Output file name for this node's payload.
    pub fn content_file_name(&self) -> Option<String> {
        if !self.has_content() {
            return None;
        }
        let name = self.path.file_name()?.to_string_lossy();
        let suffix = match self.kind {
            NodeKind::LeafOther => "o.b3dm",
            _ => ".b3dm",
        };
        Some(match name.rfind(".osgb") {
            Some(dot) => format!("{}{}", &name[..dot], suffix),
            None => format!("{name}{suffix}"),
        })
    }

    /// Post-order union of every subtree bbox into its parent. Returns the
    /// merged box of this subtree.
    pub fn extend_bbox(&mut self) -> TileBox {
        let mut merged = self.bbox;
        for child in &mut self.children {
            let sub = child.extend_bbox();
            merged.union(&sub);
        }
        self.bbox = merged;
        merged
    }

    /// Post-order geometric-error propagation: leaves get zero; a parent
    /// doubles any child's non-zero error (last one seen), or falls back to
    /// the bbox-extent heuristic when every child reports zero.
    pub fn calc_geometric_error(&mut self) {
        for child in &mut self.children {
            child.calc_geometric_error();
        }

        if self.children.is_empty() {
            self.geometric_error = 0.0;
            return;
        }

        let mut inherited = None;
        for child in &self.children {
            if child.geometric_error.abs() > ERROR_EPS {
                inherited = Some(child.geometric_error);
            }
        }

        self.geometric_error = match inherited {
            Some(e) => e * 2.0,
            None => match self.bbox.max_extent() {
                Some(extent) => extent / EXTENT_ERROR_DIVISOR,
                None => {
                    error!("empty bbox at {}", self.path.display());
                    0.0
                }
            },
        };
    }

}

/// Extract the `_L<digits>` LOD level from a file name; -1 when absent.
pub fn lod_level(path: &Path) -> i32 {
    let Some(stem) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return -1;
    };
    let Some(pos) = stem.find("_L") else {
        return -1;
    };
    let digits: String = stem[pos + 2..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn content_node(path: &str, min: f64, max: f64) -> LodNode {
        let mut node = LodNode::new(PathBuf::from(path), NodeKind::Paged);
        node.bbox = TileBox::from_min_max(DVec3::splat(min), DVec3::splat(max));
        node
    }

    #[test]
    fn test_lod_level_extraction() {
        assert_eq!(lod_level(Path::new("Tile_+005_+006.osgb")), -1);
        assert_eq!(lod_level(Path::new("Tile_+005_+006_L14_0.osgb")), 14);
        assert_eq!(lod_level(Path::new("a/b/Tile_L17.osgb")), 17);
        assert_eq!(lod_level(Path::new("Tile_Lx_0.osgb")), -1);
        assert_eq!(lod_level(Path::new("")), -1);
    }

    #[test]
    fn test_content_file_name_suffixes() {
        let paged = LodNode::new(PathBuf::from("/d/Tile_1.osgb"), NodeKind::Paged);
        assert_eq!(paged.content_file_name().unwrap(), "Tile_1.b3dm");

        let other = LodNode::new(PathBuf::from("/d/Tile_1.osgb"), NodeKind::LeafOther);
        assert_eq!(other.content_file_name().unwrap(), "Tile_1o.b3dm");

        let root = LodNode::new(PathBuf::from("/d/Tile_1.osgb"), NodeKind::Root);
        assert!(root.content_file_name().is_none());
    }

    #[test]
    fn test_extend_bbox_unions_upward() {
        let mut root = LodNode::new(PathBuf::from("root.osgb"), NodeKind::Root);
        root.children.push(content_node("a.osgb", 0.0, 1.0));
        root.children.push(content_node("b.osgb", -2.0, 0.5));

        root.extend_bbox();
        assert_eq!(root.bbox.min().unwrap(), DVec3::splat(-2.0));
        assert_eq!(root.bbox.max().unwrap(), DVec3::splat(1.0));
    }

    #[test]
    fn test_geometric_error_leaf_is_zero() {
        let mut leaf = content_node("a.osgb", 0.0, 10.0);
        leaf.calc_geometric_error();
        assert_eq!(leaf.geometric_error, 0.0);
    }

    #[test]
    fn test_geometric_error_extent_heuristic() {
        let mut root = content_node("root.osgb", 0.0, 40.0);
        root.children.push(content_node("a.osgb", 0.0, 40.0));
        root.extend_bbox();
        root.calc_geometric_error();
        // Child error is zero, so the parent uses max extent / 20.
        assert!((root.geometric_error - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_geometric_error_doubles_child_error() {
        let mut grandchild = content_node("c.osgb", 0.0, 40.0);
        grandchild.bbox = TileBox::from_min_max(DVec3::ZERO, DVec3::splat(40.0));
        let mut child = content_node("b.osgb", 0.0, 40.0);
        child.children.push(grandchild);
        let mut root = content_node("a.osgb", 0.0, 40.0);
        root.children.push(child);

        root.extend_bbox();
        root.calc_geometric_error();
        // child = 40/20 = 2, root = 2 * 2.
        assert!((root.children[0].geometric_error - 2.0).abs() < 1e-12);
        assert!((root.geometric_error - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_geometric_error_is_idempotent() {
        let mut root = content_node("a.osgb", 0.0, 40.0);
        root.children.push(content_node("b.osgb", 0.0, 40.0));
        root.extend_bbox();
        root.calc_geometric_error();
        let first = root.geometric_error;
        root.calc_geometric_error();
        assert_eq!(root.geometric_error, first);
    }
}

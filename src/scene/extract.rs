//! Scene flattening: walk a loaded node tree and collect geometry buckets,
//! textures, materials, and paged child references.
//!
//! The walk keeps explicit state instead of node-type callbacks: a transform
//! stack for matrix nodes, a paged-LOD flag that partitions drawables into
//! the `paged` and `other` buckets, and the geodetic corrector when the
//! pipeline has an active geo-transform.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::{DMat4, DVec4};
use log::warn;

use crate::geo::{ForwardEval, GeoTransform};
use crate::scene::correction::correct_positions;
use crate::scene::node::{
    Drawable, Material, NormalBinding, PrimitiveSet, SceneNode, TextureImage,
};
use crate::scene::normals::smooth_normals;

/// Vertex-count ceiling per drawable; anything above it is dropped.
pub const MAX_VERTICES_PER_DRAWABLE: usize = 10_000_000;

/// Which drawable bucket a conversion consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSelect {
    /// Every drawable, ignoring the paged partition.
    All,
    /// Drawables under paged-LOD nodes.
    Paged,
    /// Drawables outside paged-LOD subtrees.
    LeafOther,
}

/// One flattened drawable: canonical per-vertex attributes plus its source
/// primitive sets and resolved state.
#[derive(Debug, Clone)]
pub struct GeometryData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub primitive_sets: Vec<PrimitiveSet>,
    pub texture: Option<Arc<TextureImage>>,
    pub material: Option<Material>,
}

/// Everything the walk produced, both buckets included.
#[derive(Debug, Default)]
pub struct ExtractedScene {
    pub paged: Vec<GeometryData>,
    pub other: Vec<GeometryData>,
    pub child_refs: Vec<PathBuf>,
}

impl ExtractedScene {
    pub fn has_paged(&self) -> bool {
        !self.paged.is_empty()
    }

    pub fn has_other(&self) -> bool {
        !self.other.is_empty()
    }

    /// Resolve the bucket for `select`. `Paged` falls back to the other
    /// bucket when no paged drawables exist, so plain (non-LOD) files still
    /// convert.
    pub fn select(self, select: NodeSelect) -> Vec<GeometryData> {
        match select {
            NodeSelect::All | NodeSelect::Paged => {
                if self.paged.is_empty() {
                    self.other
                } else {
                    self.paged
                }
            }
            NodeSelect::LeafOther => self.other,
        }
    }
}

/// Deduplicated texture table for one flattened scene: slot per distinct
/// image (Arc identity), in first-encounter order.
pub fn texture_table(geometries: &[GeometryData]) -> (Vec<Arc<TextureImage>>, Vec<Option<usize>>) {
    let mut table: Vec<Arc<TextureImage>> = Vec::new();
    let mut slots = Vec::with_capacity(geometries.len());
    for g in geometries {
        let slot = g.texture.as_ref().map(|tex| {
            match table.iter().position(|t| Arc::ptr_eq(t, tex)) {
                Some(i) => i,
                None => {
                    table.push(tex.clone());
                    table.len() - 1
                }
            }
        });
        slots.push(slot);
    }
    (table, slots)
}

/// Flatten one loaded scene.
///
/// `load_all` disables the paged partition (everything lands in the paged
/// bucket), which is what stand-alone GLB conversion wants. When `geo` is
/// set, drawable positions are corrected into the dataset ENU frame.
pub fn extract_scene(
    root: &SceneNode,
    load_all: bool,
    geo: Option<&GeoTransform>,
) -> crate::error::Result<ExtractedScene> {
    let eval = match geo {
        Some(g) => Some(g.evaluator()?),
        None => None,
    };
    let mut walk = Walk {
        load_all,
        is_paged: load_all,
        transforms: Vec::new(),
        geo,
        eval,
        out: ExtractedScene::default(),
    };
    walk.visit(root);
    Ok(walk.out)
}

struct Walk<'a> {
    load_all: bool,
    is_paged: bool,
    transforms: Vec<DMat4>,
    geo: Option<&'a GeoTransform>,
    eval: Option<ForwardEval>,
    out: ExtractedScene,
}

impl Walk<'_> {
    fn visit(&mut self, node: &SceneNode) {
        match node {
            SceneNode::Group(group) => {
                for child in &group.children {
                    self.visit(child);
                }
            }
            SceneNode::Transform(xf) => {
                let combined = self
                    .transforms
                    .last()
                    .map(|top| *top * xf.matrix)
                    .unwrap_or(xf.matrix);
                self.transforms.push(combined);
                for child in &xf.children {
                    self.visit(child);
                }
                self.transforms.pop();
            }
            SceneNode::PagedLod(lod) => {
                // file_names[0] is the in-memory coarse child; the rest are
                // external pages for the walker to follow.
                for name in lod.file_names.iter().skip(1) {
                    self.out
                        .child_refs
                        .push(Path::new(&lod.database_path).join(name));
                }
                let was_paged = self.is_paged;
                if !self.load_all {
                    self.is_paged = true;
                }
                for child in &lod.children {
                    self.visit(child);
                }
                if !self.load_all {
                    self.is_paged = was_paged;
                }
            }
            SceneNode::Geometry(drawable) => self.apply_drawable(drawable),
        }
    }

    fn apply_drawable(&mut self, drawable: &Drawable) {
        if drawable.positions.is_empty() || drawable.primitive_sets.is_empty() {
            return;
        }
        let vertex_count = drawable.positions.len();
        if vertex_count > MAX_VERTICES_PER_DRAWABLE {
            warn!(
                "dropping drawable with {vertex_count} vertices (limit {MAX_VERTICES_PER_DRAWABLE})"
            );
            return;
        }

        let mut positions = drawable.positions.clone();
        if let Some(model) = self.transforms.last() {
            for p in positions.iter_mut() {
                let v = *model * DVec4::new(p[0] as f64, p[1] as f64, p[2] as f64, 1.0);
                *p = [v.x as f32, v.y as f32, v.z as f32];
            }
        }
        if let (Some(geo), Some(eval)) = (self.geo, self.eval.as_ref()) {
            correct_positions(geo, eval, &mut positions);
        }

        let normals = canonical_normals(drawable, vertex_count);
        let uvs = canonical_uvs(drawable, vertex_count);

        let (texture, material) = match &drawable.state {
            Some(state) => (state.texture.clone(), state.material.clone()),
            None => (None, None),
        };

        let geometry = GeometryData {
            positions,
            normals,
            uvs,
            primitive_sets: drawable.primitive_sets.clone(),
            texture,
            material,
        };
        if self.is_paged {
            self.out.paged.push(geometry);
        } else {
            self.out.other.push(geometry);
        }
    }
}

/// Canonicalize the normal array to per-vertex length.
fn canonical_normals(drawable: &Drawable, vertex_count: usize) -> Vec<[f32; 3]> {
    if drawable.normals.is_empty() {
        return smooth_normals(&drawable.positions, &drawable.primitive_sets);
    }
    match drawable.normal_binding {
        NormalBinding::PerVertex => {
            let mut normals = drawable.normals.clone();
            // Undersized arrays pad by repeating their last entry.
            if let Some(&last) = normals.last() {
                normals.resize(vertex_count, last);
            }
            normals.truncate(vertex_count);
            normals
        }
        // Overall and per-primitive-set bindings collapse to the first
        // normal for every vertex.
        NormalBinding::Overall | NormalBinding::PerPrimitiveSet => {
            vec![drawable.normals[0]; vertex_count]
        }
    }
}

/// Truncate or pad UV set 0 to the vertex count; (0, 0) when absent.
fn canonical_uvs(drawable: &Drawable, vertex_count: usize) -> Vec<[f32; 2]> {
    let mut uvs = drawable.uvs.clone();
    uvs.resize(vertex_count, [0.0, 0.0]);
    uvs.truncate(vertex_count);
    uvs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::node::{
        Group, IndexArray, MatrixTransform, PagedLod, PrimitiveMode, StateSet,
    };
    use glam::DVec3;

    fn triangle_drawable() -> Drawable {
        Drawable {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            primitive_sets: vec![PrimitiveSet::DrawElements {
                mode: PrimitiveMode::Triangles,
                indices: IndexArray::U8(vec![0, 1, 2]),
            }],
            ..Drawable::default()
        }
    }

    #[test]
    fn test_paged_partition() {
        let root = SceneNode::Group(Group {
            children: vec![
                SceneNode::PagedLod(PagedLod {
                    database_path: "/data".into(),
                    file_names: vec!["coarse".into(), "Tile_L18_0.osgb".into()],
                    children: vec![SceneNode::Geometry(Box::new(triangle_drawable()))],
                }),
                SceneNode::Geometry(Box::new(triangle_drawable())),
            ],
        });

        let scene = extract_scene(&root, false, None).unwrap();
        assert_eq!(scene.paged.len(), 1);
        assert_eq!(scene.other.len(), 1);
        assert_eq!(scene.child_refs, vec![PathBuf::from("/data/Tile_L18_0.osgb")]);
    }

    #[test]
    fn test_load_all_ignores_partition() {
        let root = SceneNode::Group(Group {
            children: vec![SceneNode::Geometry(Box::new(triangle_drawable()))],
        });
        let scene = extract_scene(&root, true, None).unwrap();
        assert_eq!(scene.paged.len(), 1);
        assert!(scene.other.is_empty());
    }

    #[test]
    fn test_transform_stack_applies_to_positions() {
        let root = SceneNode::Transform(MatrixTransform {
            matrix: DMat4::from_translation(DVec3::new(10.0, 0.0, 0.0)),
            children: vec![SceneNode::Transform(MatrixTransform {
                matrix: DMat4::from_translation(DVec3::new(0.0, 5.0, 0.0)),
                children: vec![SceneNode::Geometry(Box::new(triangle_drawable()))],
            })],
        });
        let scene = extract_scene(&root, true, None).unwrap();
        assert_eq!(scene.paged[0].positions[0], [10.0, 5.0, 0.0]);
    }

    #[test]
    fn test_missing_normals_are_synthesized() {
        let root = SceneNode::Geometry(Box::new(triangle_drawable()));
        let scene = extract_scene(&root, true, None).unwrap();
        assert_eq!(scene.paged[0].normals, vec![[0.0, 0.0, 1.0]; 3]);
    }

    #[test]
    fn test_overall_normal_expands() {
        let mut drawable = triangle_drawable();
        drawable.normals = vec![[0.0, 1.0, 0.0]];
        drawable.normal_binding = NormalBinding::Overall;
        let scene = extract_scene(&SceneNode::Geometry(Box::new(drawable)), true, None).unwrap();
        assert_eq!(scene.paged[0].normals, vec![[0.0, 1.0, 0.0]; 3]);
    }

    #[test]
    fn test_uvs_pad_and_truncate() {
        let mut drawable = triangle_drawable();
        drawable.uvs = vec![[0.5, 0.5]];
        let scene = extract_scene(&SceneNode::Geometry(Box::new(drawable)), true, None).unwrap();
        assert_eq!(
            scene.paged[0].uvs,
            vec![[0.5, 0.5], [0.0, 0.0], [0.0, 0.0]]
        );
    }

    #[test]
    fn test_empty_drawable_skipped() {
        let drawable = Drawable::default();
        let scene = extract_scene(&SceneNode::Geometry(Box::new(drawable)), true, None).unwrap();
        assert!(scene.paged.is_empty());
        assert!(scene.other.is_empty());
    }

    #[test]
    fn test_texture_table_dedups_by_identity() {
        let tex = Arc::new(TextureImage::packed(
            1,
            1,
            crate::scene::node::PixelFormat::Rgb,
            vec![255, 255, 255],
        ));
        let mut a = triangle_drawable();
        a.state = Some(StateSet {
            texture: Some(tex.clone()),
            material: None,
        });
        let mut b = triangle_drawable();
        b.state = Some(StateSet {
            texture: Some(tex.clone()),
            material: None,
        });

        let root = SceneNode::Group(Group {
            children: vec![
                SceneNode::Geometry(Box::new(a)),
                SceneNode::Geometry(Box::new(b)),
            ],
        });
        let scene = extract_scene(&root, true, None).unwrap();
        let (table, slots) = texture_table(&scene.paged);
        assert_eq!(table.len(), 1);
        assert_eq!(slots, vec![Some(0), Some(0)]);
    }
}

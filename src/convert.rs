//! The conversion pipeline: single-tile, batch, and stand-alone GLB entry
//! points.
//!
//! A `Converter` owns the scene-loader seam, the optional codec seams, and
//! the dataset geo-transform. Batch conversion runs one task per root tile
//! on the rayon pool; results join before the dataset-root manifest is
//! written.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::DVec3;
use log::{error, info, warn};
use rayon::prelude::*;

use crate::error::{Result, TilerError};
use crate::geo::{wgs84, GeoTransform};
use crate::glb::{build_model, serialize, CodecSeams, GlbOptions, MeshExtents};
use crate::mesh::{DracoEncoder, MeshOptimizer};
use crate::metadata::{parse_metadata_xml, DatasetMetadata, SrsKind};
use crate::scene::{extract_scene, NodeSelect, SceneLoader};
use crate::texture::TextureCompressor;
use crate::tiles::tileset::{volume_from_box, TileContent, TileJson};
use crate::tiles::{
    encode_b3dm, find_root_file, lod_level, read, scan_osgb_files, scan_osgb_folders,
    scan_tile_directories, tile_json_from_tree, wrap_tileset, LodNode, NodeKind, TileBox,
};

/// Generator string stamped into emitted glTF assets.
const GENERATOR: &str = "tileforge";

/// Geometric error of a per-tile root.
const TILE_ROOT_ERROR: f64 = 1000.0;

/// Geometric error of the dataset root.
const DATASET_ROOT_ERROR: f64 = 2000.0;

/// Ratio by which a converted tile's bbox is grown before merging.
const BBOX_EXTEND_RATIO: f64 = 0.2;

/// Feature toggles for a conversion run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertOptions {
    /// Compress textures to KTX2 (falls back to JPEG without a compressor).
    pub ktx2: bool,
    /// Run the mesh optimize/simplify pass.
    pub meshopt: bool,
    /// Draco-compress primitives (disabled without an encoder).
    pub draco: bool,
}

impl ConvertOptions {
    fn glb(&self) -> GlbOptions {
        GlbOptions {
            ktx2: self.ktx2,
            meshopt: self.meshopt,
            draco: self.draco,
        }
    }
}

/// External codec implementations. Every seam is optional; absent seams
/// disable their feature rather than failing the run.
#[derive(Clone, Default)]
pub struct Codecs {
    pub optimizer: Option<Arc<dyn MeshOptimizer>>,
    pub draco: Option<Arc<dyn DracoEncoder>>,
    pub texture: Option<Arc<dyn TextureCompressor>>,
}

/// Result of a single root-tile conversion.
#[derive(Debug, Clone)]
pub struct TileConversion {
    /// The tile's manifest subtree as a JSON string.
    pub tileset_json: String,
    /// Extended bounding box as `[max_x, max_y, max_z, min_x, min_y, min_z]`.
    pub bbox: [f64; 6],
}

/// The conversion pipeline.
pub struct Converter {
    loader: Arc<dyn SceneLoader>,
    codecs: Codecs,
    geo: Option<GeoTransform>,
    last_error: Option<String>,
}

struct TileTask {
    name: String,
    osgb_path: PathBuf,
    out_dir: PathBuf,
}

impl Converter {
    pub fn new(loader: Arc<dyn SceneLoader>) -> Self {
        Converter::with_codecs(loader, Codecs::default())
    }

    pub fn with_codecs(loader: Arc<dyn SceneLoader>, codecs: Codecs) -> Self {
        Converter {
            loader,
            codecs,
            geo: None,
            last_error: None,
        }
    }

    /// The most recent error message, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether a geo-transform is active.
    pub fn is_geo_initialized(&self) -> bool {
        self.geo.is_some()
    }

    pub fn geo_transform(&self) -> Option<&GeoTransform> {
        self.geo.as_ref()
    }

    /// Anchor the pipeline in the local ENU frame of (`lon`, `lat`) with an
    /// ENU-meter origin offset.
    pub fn init_geo_enu(&mut self, lon: f64, lat: f64, origin: DVec3) -> Result<()> {
        let geo = self.record(GeoTransform::from_enu(lon, lat, origin))?;
        self.geo = Some(geo);
        Ok(())
    }

    /// Anchor the pipeline on a projected CRS by EPSG code.
    pub fn init_geo_epsg(&mut self, epsg_code: i32, origin: DVec3) -> Result<()> {
        let geo = self.record(GeoTransform::from_epsg(epsg_code, origin))?;
        self.geo = Some(geo);
        Ok(())
    }

    /// Anchor the pipeline on a projected CRS described by WKT.
    pub fn init_geo_wkt(&mut self, wkt: &str, origin: DVec3) -> Result<()> {
        let geo = self.record(GeoTransform::from_wkt(wkt, origin))?;
        self.geo = Some(geo);
        Ok(())
    }

    /// Release the geo-transform. Idempotent.
    pub fn clear_geo(&mut self) {
        self.geo = None;
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.last_error = Some(e.to_string());
        }
        result
    }

    fn seams(&self) -> CodecSeams<'_> {
        CodecSeams {
            optimizer: self.codecs.optimizer.as_deref(),
            draco: self.codecs.draco.as_deref(),
            texture: self.codecs.texture.as_deref(),
        }
    }

    /// Convert one root tile to B3DM files plus a per-tile tileset.json.
    ///
    /// `in_path` may be the root scene-graph file or a dataset directory.
    /// The center arguments exist for call parity with the batch driver;
    /// per-tile manifests carry no transform.
    pub fn convert_b3dm_single(
        &mut self,
        in_path: &Path,
        out_dir: &Path,
        _center_x: f64,
        _center_y: f64,
        max_level: i32,
        options: &ConvertOptions,
    ) -> Result<TileConversion> {
        let result = self.convert_tile(in_path, out_dir, max_level, options);
        self.record(result)
    }

    fn convert_tile(
        &self,
        in_path: &Path,
        out_dir: &Path,
        max_level: i32,
        options: &ConvertOptions,
    ) -> Result<TileConversion> {
        let root_path = if in_path.is_dir() {
            info!("input is a directory, searching for a root scene-graph file");
            find_root_file(in_path).ok_or_else(|| {
                TilerError::parse(format!(
                    "no root scene-graph file found in [{}]",
                    in_path.display()
                ))
            })?
        } else {
            in_path.to_path_buf()
        };

        fs::create_dir_all(out_dir)?;

        let mut tree = read(self.loader.as_ref(), &root_path);
        if tree.is_empty() {
            return Err(TilerError::parse(format!(
                "failed to open scene-graph file [{}]",
                root_path.display()
            )));
        }

        self.tile_job(&mut tree, out_dir, max_level, options);

        tree.extend_bbox();
        if tree.bbox.is_empty() {
            return Err(TilerError::parse(format!(
                "[{}] produced an empty bounding box",
                root_path.display()
            )));
        }

        tree.calc_geometric_error();
        tree.geometric_error = TILE_ROOT_ERROR;

        let tile_json = tile_json_from_tree(&tree).ok_or_else(|| {
            TilerError::parse(format!(
                "[{}] produced no tileset tree",
                root_path.display()
            ))
        })?;
        let tileset_json = serde_json::to_string(&tile_json)?;

        let wrapped = wrap_tileset(tile_json, TILE_ROOT_ERROR);
        fs::write(
            out_dir.join("tileset.json"),
            serde_json::to_string(&wrapped)?,
        )?;

        let mut bbox = tree.bbox;
        bbox.extend(BBOX_EXTEND_RATIO);
        let (min, max) = match (bbox.min(), bbox.max()) {
            (Some(min), Some(max)) => (min, max),
            _ => (DVec3::ZERO, DVec3::ZERO),
        };

        Ok(TileConversion {
            tileset_json,
            bbox: [max.x, max.y, max.z, min.x, min.y, min.z],
        })
    }

    /// Write B3DM payloads for every content node of the tree, depth-first.
    /// Nodes above `max_level` are skipped, subtree included; a failed node
    /// is logged and its siblings continue.
    fn tile_job(&self, node: &mut LodNode, out_dir: &Path, max_level: i32, options: &ConvertOptions) {
        if node.is_empty() {
            return;
        }
        if lod_level(&node.path) > max_level {
            return;
        }

        if node.has_content() {
            match self.b3dm_buffer(&node.path, node.kind, options) {
                Ok((b3dm, bbox)) => {
                    node.bbox = bbox;
                    if let Some(file_name) = node.content_file_name() {
                        if let Err(e) = fs::write(out_dir.join(&file_name), &b3dm) {
                            error!("write [{file_name}] failed: {e}");
                        }
                    }
                }
                Err(e) => {
                    error!("convert [{}] failed: {e}", node.path.display());
                }
            }
        }

        for child in &mut node.children {
            self.tile_job(child, out_dir, max_level, options);
        }
    }

    fn b3dm_buffer(
        &self,
        path: &Path,
        kind: NodeKind,
        options: &ConvertOptions,
    ) -> Result<(Vec<u8>, TileBox)> {
        let select = match kind {
            NodeKind::LeafOther => NodeSelect::LeafOther,
            _ => NodeSelect::Paged,
        };
        let (glb, extents) = self.glb_buffer(path, select, options, true)?;
        let bbox = tile_box_from_extents(&extents);
        Ok((encode_b3dm(&glb, 1), bbox))
    }

    fn glb_buffer(
        &self,
        path: &Path,
        select: NodeSelect,
        options: &ConvertOptions,
        binary: bool,
    ) -> Result<(Vec<u8>, MeshExtents)> {
        let load_all = select == NodeSelect::All;
        let scene_root = self.loader.load(path)?;
        let scene = extract_scene(&scene_root, load_all, self.geo.as_ref())?;
        let geometries = scene.select(select);
        if geometries.is_empty() {
            return Err(TilerError::parse(format!(
                "[{}] contains no drawable geometry",
                path.display()
            )));
        }

        let (model, buffer, extents) =
            build_model(&geometries, &options.glb(), &self.seams(), GENERATOR)?;
        let bytes = serialize(&model, &buffer, binary)?;
        Ok((bytes, extents))
    }

    /// Convert one scene-graph file to a stand-alone glTF on disk. `binary`
    /// selects the GLB container; otherwise a text glTF with an embedded
    /// buffer is written.
    pub fn convert_glb(
        &mut self,
        in_path: &Path,
        out_path: &Path,
        binary: bool,
        options: &ConvertOptions,
    ) -> Result<()> {
        let result = (|| {
            let root_path = if in_path.is_dir() {
                find_root_file(in_path).ok_or_else(|| {
                    TilerError::parse(format!(
                        "no root scene-graph file found in [{}]",
                        in_path.display()
                    ))
                })?
            } else {
                in_path.to_path_buf()
            };
            let (bytes, _) = self.glb_buffer(&root_path, NodeSelect::All, options, binary)?;
            fs::write(out_path, bytes)?;
            Ok(())
        })();
        self.record(result)
    }

    /// Convert one scene-graph file to an in-memory GLB, selecting which
    /// drawable bucket to emit.
    pub fn convert_glb_buffer(
        &mut self,
        in_path: &Path,
        select: NodeSelect,
        options: &ConvertOptions,
    ) -> Result<Vec<u8>> {
        let result = self
            .glb_buffer(in_path, select, options, true)
            .map(|(bytes, _)| bytes);
        self.record(result)
    }

    /// Convert a whole dataset. Reads `metadata.xml` when present to anchor
    /// the geo-transform and dataset center, fans root tiles out over the
    /// worker pool, and writes the dataset-root tileset.json last. Succeeds
    /// when at least one root tile converted.
    pub fn convert_batch(
        &mut self,
        in_dir: &Path,
        out_dir: &Path,
        center_x: f64,
        center_y: f64,
        max_level: i32,
        options: &ConvertOptions,
    ) -> Result<()> {
        let result = self.convert_batch_inner(in_dir, out_dir, center_x, center_y, max_level, options);
        // The geo-transform is scoped to one dataset; release it on every
        // exit path.
        self.clear_geo();
        self.record(result)
    }

    fn convert_batch_inner(
        &mut self,
        in_dir: &Path,
        out_dir: &Path,
        mut center_x: f64,
        mut center_y: f64,
        max_level: i32,
        options: &ConvertOptions,
    ) -> Result<()> {
        let root_dir = if in_dir.ends_with("Data") {
            in_dir.parent().unwrap_or(in_dir).to_path_buf()
        } else {
            in_dir.to_path_buf()
        };

        let metadata = match parse_metadata_xml(&root_dir.join("metadata.xml")) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(
                    "metadata.xml not found or parsing failed ({e}), \
                     using provided center ({center_x:.6}, {center_y:.6})"
                );
                None
            }
        };

        let mut enu_offset = None;
        if let Some(meta) = &metadata {
            match &meta.srs {
                SrsKind::Enu { lat, lon } => {
                    info!("using ENU coordinate system, origin lat={lat:.6} lon={lon:.6}");
                    let geo = GeoTransform::from_enu(*lon, *lat, meta.origin)?;
                    center_x = *lon;
                    center_y = *lat;
                    enu_offset = Some(meta.origin);
                    self.geo = Some(geo);
                }
                SrsKind::Epsg(code) => {
                    info!("using EPSG:{code} coordinate system");
                    let geo = GeoTransform::from_epsg(*code, meta.origin)?;
                    let origin = geo.geographic_origin();
                    info!(
                        "origin converted to lon={:.6} lat={:.6} h={:.3}",
                        origin.x, origin.y, origin.z
                    );
                    center_x = origin.x;
                    center_y = origin.y;
                    self.geo = Some(geo);
                }
                SrsKind::Wkt(wkt) => {
                    info!("using WKT projection");
                    let geo = GeoTransform::from_wkt(wkt, meta.origin)?;
                    let origin = geo.geographic_origin();
                    center_x = origin.x;
                    center_y = origin.y;
                    self.geo = Some(geo);
                }
            }
        }

        let tasks = collect_tile_tasks(in_dir, out_dir, metadata.as_ref())?;
        info!("found {} root tiles to process", tasks.len());

        fs::create_dir_all(out_dir)?;
        for task in &tasks {
            fs::create_dir_all(&task.out_dir)?;
        }

        // One conversion task per root tile; the pool steals work as tiles
        // finish at different rates.
        let this: &Converter = self;
        let results: Vec<(usize, Result<TileConversion>)> = tasks
            .par_iter()
            .enumerate()
            .map(|(i, task)| {
                info!("processing tile {}/{}: {}", i + 1, tasks.len(), task.name);
                (
                    i,
                    this.convert_tile(&task.osgb_path, &task.out_dir, max_level, options),
                )
            })
            .collect();

        let mut global_bbox = TileBox::default();
        let mut children = Vec::new();
        for (i, result) in results {
            let task = &tasks[i];
            match result {
                Ok(conversion) => {
                    let bbox = TileBox::from_min_max(
                        DVec3::new(conversion.bbox[3], conversion.bbox[4], conversion.bbox[5]),
                        DVec3::new(conversion.bbox[0], conversion.bbox[1], conversion.bbox[2]),
                    );
                    global_bbox.union(&bbox);

                    let Some(volume) = volume_from_box(&bbox) else {
                        continue;
                    };
                    let mut child = TileJson::new(TILE_ROOT_ERROR, volume);
                    let uri = if metadata.is_some() {
                        format!("./Data/{}/tileset.json", task.name)
                    } else {
                        format!("./{}/tileset.json", task.name)
                    };
                    child.content = Some(TileContent { uri });
                    children.push(child);
                }
                Err(e) => {
                    error!("tile {} failed: {e}", task.name);
                }
            }
        }

        if children.is_empty() {
            return Err(TilerError::parse("no root tile converted successfully"));
        }

        let height_min = global_bbox.min().map(|m| m.z).unwrap_or(0.0);
        let mut transform = wgs84::enu_to_ecef_matrix(center_x, center_y, height_min);
        if let Some(offset) = enu_offset {
            // The metadata origin offset is expressed in the local ENU
            // frame; rotate it into ECEF and shift the translation.
            let shift = wgs84::enu_offset_to_ecef(center_x, center_y, offset);
            let translation = transform.col(3).truncate() + shift;
            transform.col_mut(3).x = translation.x;
            transform.col_mut(3).y = translation.y;
            transform.col_mut(3).z = translation.z;
        }

        let volume = volume_from_box(&global_bbox)
            .ok_or_else(|| TilerError::parse("merged dataset bounding box is empty"))?;
        let mut root = TileJson::new(DATASET_ROOT_ERROR, volume);
        root.transform = Some(transform.to_cols_array());
        root.refine = Some("REPLACE");
        root.children = children;

        let tileset = wrap_tileset(root, DATASET_ROOT_ERROR);
        fs::write(
            out_dir.join("tileset.json"),
            serde_json::to_string(&tileset)?,
        )?;
        info!("batch complete: dataset root references {} tiles", tasks.len());

        Ok(())
    }
}

fn tile_box_from_extents(extents: &MeshExtents) -> TileBox {
    if !extents.is_valid() {
        return TileBox::default();
    }
    TileBox::from_min_max(DVec3::from(extents.min), DVec3::from(extents.max))
}

/// Discover root tiles per the dataset layout: `Data/Tile_*` directories
/// when metadata is present, otherwise the flat-directory fallbacks.
fn collect_tile_tasks(
    in_dir: &Path,
    out_dir: &Path,
    metadata: Option<&DatasetMetadata>,
) -> Result<Vec<TileTask>> {
    let data_dir = if in_dir.ends_with("Data") {
        in_dir.to_path_buf()
    } else {
        in_dir.join("Data")
    };
    let is_oblique = data_dir.is_dir() && metadata.is_some();

    let mut tasks = Vec::new();
    if is_oblique {
        info!("oblique dataset mode, scanning {}", data_dir.display());
        let tile_names = scan_tile_directories(&data_dir);
        if tile_names.is_empty() {
            return Err(TilerError::parse(format!(
                "no Tile_* directories under [{}]",
                data_dir.display()
            )));
        }
        let out_data = out_dir.join("Data");
        for name in tile_names {
            tasks.push(TileTask {
                osgb_path: data_dir.join(&name).join(format!("{name}.osgb")),
                out_dir: out_data.join(&name),
                name,
            });
        }
        return Ok(tasks);
    }

    // Flat mode: the input directory itself, or its subdirectories, carry
    // scene-graph files.
    let flat_dir = in_dir;
    let files_in_root = scan_osgb_files(flat_dir, false);
    if !files_in_root.is_empty() {
        info!("input directory contains {} scene-graph files", files_in_root.len());
        let root_osgb = find_root_file(flat_dir).unwrap_or_else(|| files_in_root[0].clone());
        let name = flat_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "output".into());
        tasks.push(TileTask {
            osgb_path: root_osgb,
            out_dir: out_dir.join(&name),
            name,
        });
        return Ok(tasks);
    }

    for folder in scan_osgb_folders(flat_dir) {
        let folder_path = flat_dir.join(&folder);
        let root_osgb = match find_root_file(&folder_path) {
            Some(path) => path,
            None => match scan_osgb_files(&folder_path, false).into_iter().next() {
                Some(path) => {
                    info!("no root file in {folder}, using first scene-graph file");
                    path
                }
                None => {
                    warn!("no scene-graph files in {folder}, skipping");
                    continue;
                }
            },
        };
        tasks.push(TileTask {
            osgb_path: root_osgb,
            out_dir: out_dir.join(&folder),
            name: folder,
        });
    }

    if tasks.is_empty() {
        return Err(TilerError::parse(format!(
            "no scene-graph data found under [{}]",
            in_dir.display()
        )));
    }
    Ok(tasks)
}

//! The seam to the external scene-graph decoder.

use std::path::Path;

use crate::error::Result;

use super::node::SceneNode;

/// Decodes one binary scene-graph file into a node tree.
///
/// Implementations wrap whatever decoder the deployment links against; the
/// pipeline only sees the resulting [`SceneNode`] tree. Loaders are shared
/// across the batch worker pool and must be thread-safe. Paths are UTF-8;
/// converting to a non-UTF-8 platform codepage, where required, is the
/// loader's concern.
pub trait SceneLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<SceneNode>;
}

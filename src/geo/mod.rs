//! Geographic utilities: WGS84 math and the dataset geo-transform.

pub mod transform;
pub mod wgs84;

pub use transform::{ForwardEval, GeoTransform};

/// Check whether the proj feature is compiled in.
pub fn proj_available() -> bool {
    cfg!(feature = "proj")
}

//! Dataset geo-referencing: one forward SRS→geodetic transform plus the
//! ECEF↔ENU frames centered on the dataset origin.
//!
//! EPSG and WKT sources go through the PROJ library behind the `proj` cargo
//! feature; ENU datasets need no CRS database and always work. The transform
//! is an explicit per-pipeline value (the `Converter` owns one), not process
//! state, and is read-only once initialized.

use glam::{DMat4, DVec3, DVec4};

use super::wgs84;
use crate::error::{Result, TilerError};

/// How drawable coordinates reach geodetic (lon, lat, height).
#[derive(Debug, Clone)]
enum ForwardSpec {
    /// Source coordinates are already in the dataset's local ENU frame.
    Identity,
    /// Forward transform from a projected CRS to EPSG:4326, rebuilt per
    /// worker from the stored definition (PROJ objects are not shareable
    /// across threads).
    CrsToWgs84 { source: String },
}

/// Forward SRS transform plus the ENU frame of the dataset origin.
#[derive(Debug, Clone)]
pub struct GeoTransform {
    spec: ForwardSpec,
    origin: DVec3,
    geo_origin: DVec3,
    is_enu: bool,
    ecef_to_enu: DMat4,
}

impl GeoTransform {
    /// Build a transform from `EPSG:<code>` to EPSG:4326, normalized for
    /// visualization (longitude first), and anchor it at `origin` expressed
    /// in the source projected coordinates.
    pub fn from_epsg(epsg_code: i32, origin: DVec3) -> Result<Self> {
        Self::from_crs_definition(format!("EPSG:{epsg_code}"), origin)
    }

    /// Build a transform from a WKT CRS definition to EPSG:4326.
    pub fn from_wkt(wkt: &str, origin: DVec3) -> Result<Self> {
        if wkt.trim().is_empty() {
            return Err(TilerError::crs("empty WKT definition"));
        }
        Self::from_crs_definition(wkt.to_string(), origin)
    }

    /// Identity forward transform for a dataset already in the local ENU
    /// frame of (`lon_deg`, `lat_deg`). `origin` is an ENU offset in meters.
    pub fn from_enu(lon_deg: f64, lat_deg: f64, origin: DVec3) -> Result<Self> {
        if !origin.is_finite() {
            return Err(TilerError::crs("ENU origin offset is not finite"));
        }
        let geo_origin = DVec3::new(lon_deg, lat_deg, 0.0);
        let enu_to_ecef = wgs84::enu_to_ecef_matrix(lon_deg, lat_deg, 0.0);
        Ok(GeoTransform {
            spec: ForwardSpec::Identity,
            origin,
            geo_origin,
            is_enu: true,
            ecef_to_enu: enu_to_ecef.inverse(),
        })
    }

    #[cfg(feature = "proj")]
    fn from_crs_definition(source: String, origin: DVec3) -> Result<Self> {
        if !origin.is_finite() {
            return Err(TilerError::crs("SRS origin is not finite"));
        }
        // Probe the CRS database up front so a bad definition fails at init,
        // not per tile. Proj::new_known_crs also normalizes axis order to
        // longitude-first.
        let transform = proj::Proj::new_known_crs(&source, "EPSG:4326", None).map_err(|e| {
            TilerError::crs(format!(
                "Failed to create transformation from {source} to EPSG:4326: {e}"
            ))
        })?;

        let (lon, lat) = transform
            .convert((origin.x, origin.y))
            .map_err(|e| TilerError::crs(format!("forward transform of origin failed: {e}")))?;
        let geo_origin = DVec3::new(lon, lat, origin.z);
        let enu_to_ecef = wgs84::enu_to_ecef_matrix(lon, lat, origin.z);

        Ok(GeoTransform {
            spec: ForwardSpec::CrsToWgs84 { source },
            origin,
            geo_origin,
            is_enu: false,
            ecef_to_enu: enu_to_ecef.inverse(),
        })
    }

    #[cfg(not(feature = "proj"))]
    fn from_crs_definition(source: String, _origin: DVec3) -> Result<Self> {
        Err(TilerError::crs(format!(
            "Failed to create transformation from {source} to EPSG:4326: \
             proj feature not enabled"
        )))
    }

    /// The stored source-coordinate origin offset.
    pub fn origin(&self) -> DVec3 {
        self.origin
    }

    /// The geodetic origin as (lon°, lat°, height m).
    pub fn geographic_origin(&self) -> DVec3 {
        self.geo_origin
    }

    /// Whether the source is a local ENU frame rather than a projected CRS.
    pub fn is_enu(&self) -> bool {
        self.is_enu
    }

    /// The ECEF→ENU transform of the dataset origin.
    pub fn ecef_to_enu(&self) -> DMat4 {
        self.ecef_to_enu
    }

    /// Instantiate a forward evaluator for the current worker. Projected
    /// sources rebuild their PROJ pipeline here; ENU sources are free.
    pub fn evaluator(&self) -> Result<ForwardEval> {
        match &self.spec {
            ForwardSpec::Identity => Ok(ForwardEval::Identity),
            ForwardSpec::CrsToWgs84 { source } => ForwardEval::for_crs(source),
        }
    }

    /// Map a point in source coordinates (with the origin offset already
    /// added) into the dataset's ENU frame.
    pub fn correct_point(&self, eval: &ForwardEval, point: DVec3) -> DVec3 {
        if self.is_enu {
            let absolute_enu = point + self.origin;
            let ecef_origin = wgs84::cartographic_to_ecef(
                self.geo_origin.x,
                self.geo_origin.y,
                self.geo_origin.z,
            );
            let ecef = ecef_origin
                + wgs84::enu_offset_to_ecef(self.geo_origin.x, self.geo_origin.y, absolute_enu);
            (self.ecef_to_enu * DVec4::new(ecef.x, ecef.y, ecef.z, 1.0)).truncate()
        } else {
            let cartographic = eval.forward(point + self.origin);
            let ecef =
                wgs84::cartographic_to_ecef(cartographic.x, cartographic.y, cartographic.z);
            (self.ecef_to_enu * DVec4::new(ecef.x, ecef.y, ecef.z, 1.0)).truncate()
        }
    }
}

/// Per-worker forward transform instance.
pub enum ForwardEval {
    Identity,
    #[cfg(feature = "proj")]
    Crs(proj::Proj),
}

impl ForwardEval {
    #[cfg(feature = "proj")]
    fn for_crs(source: &str) -> Result<Self> {
        let transform = proj::Proj::new_known_crs(source, "EPSG:4326", None).map_err(|e| {
            TilerError::crs(format!(
                "Failed to create transformation from {source} to EPSG:4326: {e}"
            ))
        })?;
        Ok(ForwardEval::Crs(transform))
    }

    #[cfg(not(feature = "proj"))]
    fn for_crs(source: &str) -> Result<Self> {
        Err(TilerError::crs(format!(
            "Failed to create transformation from {source} to EPSG:4326: \
             proj feature not enabled"
        )))
    }

    /// Forward-transform (x, y, z) to (lon°, lat°, height). The identity
    /// evaluator passes coordinates through; PROJ failures leave the input
    /// untouched, matching the source behavior of skipping unconvertible
    /// points.
    pub fn forward(&self, p: DVec3) -> DVec3 {
        match self {
            ForwardEval::Identity => p,
            #[cfg(feature = "proj")]
            ForwardEval::Crs(transform) => match transform.convert((p.x, p.y)) {
                Ok((lon, lat)) => DVec3::new(lon, lat, p.z),
                Err(_) => p,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enu_init_stores_geographic_origin() {
        let geo = GeoTransform::from_enu(120.34445, 36.09953, DVec3::ZERO).unwrap();
        assert!(geo.is_enu());
        let origin = geo.geographic_origin();
        assert_eq!(origin.x, 120.34445);
        assert_eq!(origin.y, 36.09953);
        assert_eq!(origin.z, 0.0);
    }

    #[test]
    fn test_enu_correction_is_identity_for_zero_offset() {
        let geo = GeoTransform::from_enu(120.34445, 36.09953, DVec3::ZERO).unwrap();
        let eval = geo.evaluator().unwrap();
        for p in [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(10.0, -25.0, 3.5),
            DVec3::new(-100.0, 200.0, 50.0),
        ] {
            let corrected = geo.correct_point(&eval, p);
            assert!((corrected - p).length() < 1e-6, "{p:?} -> {corrected:?}");
        }
    }

    #[test]
    fn test_enu_correction_applies_origin_offset() {
        let offset = DVec3::new(5.0, -7.0, 100.0);
        let geo = GeoTransform::from_enu(-71.06, 42.36, offset).unwrap();
        let eval = geo.evaluator().unwrap();
        let p = DVec3::new(1.0, 2.0, 3.0);
        let corrected = geo.correct_point(&eval, p);
        assert!((corrected - (p + offset)).length() < 1e-6);
    }

    #[test]
    fn test_nonfinite_enu_offset_rejected() {
        let err = GeoTransform::from_enu(0.0, 0.0, DVec3::new(f64::NAN, 0.0, 0.0));
        assert!(err.is_err());
    }

    #[cfg(not(feature = "proj"))]
    #[test]
    fn test_epsg_without_proj_reports_transformation_failure() {
        let err = GeoTransform::from_epsg(4547, DVec3::ZERO).unwrap_err();
        assert!(err.to_string().contains("Failed to create transformation"));
    }
}

//! WGS84 ellipsoid math: cartographic→ECEF and the ENU↔ECEF basis.
//!
//! All angles at this layer are degrees; matrices are column-major doubles
//! matching the 3D Tiles `transform` layout.

use glam::{DMat4, DVec3, DVec4};

/// WGS84 semi-major axis in meters.
pub const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;

/// WGS84 flattening.
pub const FLATTENING: f64 = 1.0 / 298.257_223_563;

/// First eccentricity squared, `f * (2 - f)`.
pub const E2: f64 = FLATTENING * (2.0 - FLATTENING);

/// Convert geodetic (lon, lat in degrees, height in meters) to ECEF.
pub fn cartographic_to_ecef(lon_deg: f64, lat_deg: f64, height: f64) -> DVec3 {
    let lon = lon_deg.to_radians();
    let phi = lat_deg.to_radians();

    let (sin_phi, cos_phi) = phi.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    // Prime-vertical radius of curvature.
    let n = SEMI_MAJOR_AXIS / (1.0 - E2 * sin_phi * sin_phi).sqrt();

    DVec3::new(
        (n + height) * cos_phi * cos_lon,
        (n + height) * cos_phi * sin_lon,
        (n * (1.0 - E2) + height) * sin_phi,
    )
}

/// Build the ENU→ECEF transform at the given geodetic origin.
///
/// Columns 0..2 are the east, north, and up basis vectors expressed in ECEF;
/// column 3 is the origin's ECEF position.
pub fn enu_to_ecef_matrix(lon_deg: f64, lat_deg: f64, height: f64) -> DMat4 {
    let lon = lon_deg.to_radians();
    let phi = lat_deg.to_radians();

    let (sin_phi, cos_phi) = phi.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    let east = DVec3::new(-sin_lon, cos_lon, 0.0);
    let north = DVec3::new(-sin_phi * cos_lon, -sin_phi * sin_lon, cos_phi);
    let up = DVec3::new(cos_phi * cos_lon, cos_phi * sin_lon, sin_phi);
    let origin = cartographic_to_ecef(lon_deg, lat_deg, height);

    DMat4::from_cols(
        DVec4::new(east.x, east.y, east.z, 0.0),
        DVec4::new(north.x, north.y, north.z, 0.0),
        DVec4::new(up.x, up.y, up.z, 0.0),
        DVec4::new(origin.x, origin.y, origin.z, 1.0),
    )
}

/// Rotate an ENU-frame offset into ECEF at the given geodetic origin
/// (rotation only, no translation).
pub fn enu_offset_to_ecef(lon_deg: f64, lat_deg: f64, enu: DVec3) -> DVec3 {
    let lon = lon_deg.to_radians();
    let lat = lat_deg.to_radians();

    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    DVec3::new(
        -sin_lon * enu.x - sin_lat * cos_lon * enu.y + cos_lat * cos_lon * enu.z,
        cos_lon * enu.x - sin_lat * sin_lon * enu.y + cos_lat * sin_lon * enu.z,
        cos_lat * enu.y + sin_lat * enu.z,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ecef_equator_prime_meridian() {
        let p = cartographic_to_ecef(0.0, 0.0, 0.0);
        assert!((p.x - SEMI_MAJOR_AXIS).abs() < 1e-6);
        assert!(p.y.abs() < 1e-6);
        assert!(p.z.abs() < 1e-6);
    }

    #[test]
    fn test_ecef_north_pole() {
        let p = cartographic_to_ecef(0.0, 90.0, 0.0);
        // Semi-minor axis b = a * (1 - f).
        let b = SEMI_MAJOR_AXIS * (1.0 - FLATTENING);
        assert!(p.x.abs() < 1e-6);
        assert!(p.y.abs() < 1e-6);
        assert!((p.z - b).abs() < 1e-3);
    }

    #[test]
    fn test_enu_basis_is_orthonormal() {
        let m = enu_to_ecef_matrix(120.34445, 36.09953, 12.5);
        let east = m.col(0).truncate();
        let north = m.col(1).truncate();
        let up = m.col(2).truncate();

        assert!((east.length() - 1.0).abs() < 1e-12);
        assert!((north.length() - 1.0).abs() < 1e-12);
        assert!((up.length() - 1.0).abs() < 1e-12);
        assert!(east.dot(north).abs() < 1e-12);
        assert!(east.dot(up).abs() < 1e-12);
        assert!(north.dot(up).abs() < 1e-12);
        // Right-handed: east x north = up.
        assert!((east.cross(north) - up).length() < 1e-12);
    }

    #[test]
    fn test_enu_matrix_translation_is_origin_ecef() {
        let m = enu_to_ecef_matrix(-71.06, 42.36, 100.0);
        let t = m.col(3).truncate();
        let ecef = cartographic_to_ecef(-71.06, 42.36, 100.0);
        assert!((t - ecef).length() < 1e-9);
    }

    #[test]
    fn test_enu_offset_rotation_matches_matrix() {
        let lon = 120.34445;
        let lat = 36.09953;
        let offset = DVec3::new(10.0, -20.0, 5.0);

        let rotated = enu_offset_to_ecef(lon, lat, offset);
        let m = enu_to_ecef_matrix(lon, lat, 0.0);
        let via_matrix = (m * DVec4::new(offset.x, offset.y, offset.z, 0.0)).truncate();
        assert!((rotated - via_matrix).length() < 1e-9);
    }
}

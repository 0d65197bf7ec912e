//! Axis-aligned tile bounding boxes.

use glam::DVec3;

/// Minimum full extent along any axis of an emitted bounding volume; keeps
/// flat tiles from degenerating to zero-thickness boxes.
const MIN_EXTENT: f64 = 0.01;

/// Min/max box in tile-local meters. Starts empty; unions and point
/// expansion populate it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TileBox {
    bounds: Option<(DVec3, DVec3)>,
}

impl TileBox {
    pub fn from_min_max(min: DVec3, max: DVec3) -> Self {
        TileBox {
            bounds: Some((min, max)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }

    pub fn min(&self) -> Option<DVec3> {
        self.bounds.map(|(min, _)| min)
    }

    pub fn max(&self) -> Option<DVec3> {
        self.bounds.map(|(_, max)| max)
    }

    pub fn expand_point(&mut self, p: DVec3) {
        self.bounds = Some(match self.bounds {
            Some((min, max)) => (min.min(p), max.max(p)),
            None => (p, p),
        });
    }

    /// Component-wise union; empty operands contribute nothing.
    pub fn union(&mut self, other: &TileBox) {
        let Some((omin, omax)) = other.bounds else {
            return;
        };
        self.bounds = Some(match self.bounds {
            Some((min, max)) => (min.min(omin), max.max(omax)),
            None => (omin, omax),
        });
    }

    /// Scale the half-extents by `ratio / 2` about the center.
    pub fn extend(&mut self, ratio: f64) {
        if let Some((min, max)) = self.bounds {
            let grow = (max - min) * (ratio / 2.0);
            self.bounds = Some((min - grow, max + grow));
        }
    }

    /// Largest full extent across the three axes.
    pub fn max_extent(&self) -> Option<f64> {
        self.bounds
            .map(|(min, max)| (max - min).max_element())
    }

    /// 3D Tiles `box` form: center plus three axis-aligned half-extent
    /// vectors, each extent floored to stay non-degenerate.
    pub fn to_box_volume(&self) -> Option<[f64; 12]> {
        let (min, max) = self.bounds?;
        let center = (min + max) / 2.0;
        let extent = (max - min).max(DVec3::splat(MIN_EXTENT));
        Some([
            center.x,
            center.y,
            center.z,
            extent.x / 2.0,
            0.0,
            0.0,
            0.0,
            extent.y / 2.0,
            0.0,
            0.0,
            0.0,
            extent.z / 2.0,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_with_empty_is_identity() {
        let mut a = TileBox::from_min_max(DVec3::ZERO, DVec3::ONE);
        let before = a;
        a.union(&TileBox::default());
        assert_eq!(a, before);

        let mut empty = TileBox::default();
        empty.union(&before);
        assert_eq!(empty, before);
    }

    #[test]
    fn test_union_takes_componentwise_min_max() {
        let mut a = TileBox::from_min_max(DVec3::new(0.0, -1.0, 0.0), DVec3::new(2.0, 1.0, 3.0));
        let b = TileBox::from_min_max(DVec3::new(-1.0, 0.0, 1.0), DVec3::new(1.0, 4.0, 2.0));
        a.union(&b);
        assert_eq!(a.min().unwrap(), DVec3::new(-1.0, -1.0, 0.0));
        assert_eq!(a.max().unwrap(), DVec3::new(2.0, 4.0, 3.0));
    }

    #[test]
    fn test_extend_scales_about_center() {
        let mut b = TileBox::from_min_max(DVec3::new(0.0, 0.0, 0.0), DVec3::new(10.0, 20.0, 30.0));
        b.extend(0.2);
        assert_eq!(b.min().unwrap(), DVec3::new(-1.0, -2.0, -3.0));
        assert_eq!(b.max().unwrap(), DVec3::new(11.0, 22.0, 33.0));
    }

    #[test]
    fn test_box_volume_floors_degenerate_axes() {
        let b = TileBox::from_min_max(DVec3::new(0.0, 0.0, 5.0), DVec3::new(100.0, 50.0, 5.0));
        let v = b.to_box_volume().unwrap();
        assert_eq!(v[0..3], [50.0, 25.0, 5.0]);
        assert_eq!(v[3], 50.0);
        assert_eq!(v[7], 25.0);
        // Flat z axis floors to the minimum half-extent.
        assert_eq!(v[11], 0.005);
    }

    #[test]
    fn test_empty_box_has_no_volume() {
        assert!(TileBox::default().to_box_volume().is_none());
    }
}

//! Sub-bounding-box sampling within a layer extent.

use serde::{Deserialize, Serialize};

use crate::error::{LoadTestError, LoadTestResult};
use crate::rng::Mt19937;

/// Full rectangular extent of a layer, in projected coordinates.
///
/// Side lengths are treated as meters when converting the configured
/// sample area from square kilometers. Geographic (degree-based) extents
/// will therefore produce oversized samples; the session logs the derived
/// side lengths at setup so an operator can spot that.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    /// Create a new extent from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Width in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// One sampled sub-bounding-box, consumed by a single GetMap request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubBbox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl SubBbox {
    /// WMS BBOX parameter encoding: "minx,miny,maxx,maxy".
    pub fn to_bbox_param(&self) -> String {
        format!("{},{},{},{}", self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

/// Deterministic generator of fixed-size sub-bounding-boxes inside an
/// extent.
///
/// Draw `N` is a pure function of `(seed, N)`: two samplers built from the
/// same parameters yield identical infinite sequences. The instance is
/// single-owner and not meant to be shared across tasks.
#[derive(Debug)]
pub struct BboxSampler {
    extent: Extent,
    side_x: f64,
    side_y: f64,
    max_start_x: f64,
    max_start_y: f64,
    rng: Mt19937,
}

impl BboxSampler {
    /// Create a sampler for sub-boxes of `area_km2` with the given
    /// width/height `ratio` inside `extent`.
    pub fn new(extent: Extent, area_km2: f64, ratio: f64, seed: u64) -> LoadTestResult<Self> {
        if extent.max_x <= extent.min_x || extent.max_y <= extent.min_y {
            return Err(LoadTestError::Configuration(format!(
                "degenerate extent ({}, {}, {}, {})",
                extent.min_x, extent.min_y, extent.max_x, extent.max_y
            )));
        }
        if area_km2 <= 0.0 {
            return Err(LoadTestError::Configuration(format!(
                "bbox area must be > 0, got {area_km2}"
            )));
        }
        if ratio <= 0.0 {
            return Err(LoadTestError::Configuration(format!(
                "bbox aspect ratio must be > 0, got {ratio}"
            )));
        }

        let height_km = (area_km2 / ratio).sqrt();
        let width_km = ratio * height_km;
        let side_x = width_km * 1000.0;
        let side_y = height_km * 1000.0;

        // Checked up front so a draw can never face an inverted range.
        let max_start_x = extent.max_x - side_x;
        let max_start_y = extent.max_y - side_y;
        if max_start_x < extent.min_x || max_start_y < extent.min_y {
            return Err(LoadTestError::Range(format!(
                "a {width_km:.3} km x {height_km:.3} km sample does not fit the \
                 {:.3} km x {:.3} km extent (units assumed meters)",
                extent.width() / 1000.0,
                extent.height() / 1000.0
            )));
        }

        Ok(Self {
            extent,
            side_x,
            side_y,
            max_start_x,
            max_start_y,
            rng: Mt19937::new(seed),
        })
    }

    /// Extent this sampler draws from.
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Side lengths of every sampled box, in extent units.
    pub fn side_lengths(&self) -> (f64, f64) {
        (self.side_x, self.side_y)
    }

    /// Next sub-bounding-box. Always contained in the extent.
    pub fn next_bbox(&mut self) -> SubBbox {
        let start_x = self.rng.uniform(self.extent.min_x, self.max_start_x);
        let start_y = self.rng.uniform(self.extent.min_y, self.max_start_y);
        SubBbox {
            min_x: start_x,
            min_y: start_y,
            max_x: start_x + self.side_x,
            max_y: start_y + self.side_y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_extent() -> Extent {
        Extent::new(-144_205.734375, -326_024.8125, 162_129.09375, 276_083.78125)
    }

    #[test]
    fn test_first_draw_regression() {
        // Known-good vector for seed 42; guards the whole derivation chain
        // (area split, km->m conversion, draw order).
        let mut sampler = BboxSampler::new(test_extent(), 5.0, 1.2, 42).unwrap();
        let bbox = sampler.next_bbox();
        assert_eq!(bbox.min_x, 50106.69464503156);
        assert_eq!(bbox.min_y, -311016.67483456887);
        assert_eq!(bbox.max_x, 52556.184387814734);
        assert_eq!(bbox.max_y, -308975.43338224955);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = BboxSampler::new(test_extent(), 100.0, 1.0, 1640).unwrap();
        let mut b = BboxSampler::new(test_extent(), 100.0, 1.0, 1640).unwrap();
        for _ in 0..500 {
            assert_eq!(a.next_bbox(), b.next_bbox());
        }
    }

    #[test]
    fn test_draws_stay_inside_extent() {
        let extent = test_extent();
        let mut sampler = BboxSampler::new(extent, 100.0, 1.0, 7).unwrap();
        for _ in 0..1000 {
            let bbox = sampler.next_bbox();
            assert!(bbox.min_x >= extent.min_x);
            assert!(bbox.min_y >= extent.min_y);
            assert!(bbox.max_x <= extent.max_x);
            assert!(bbox.max_y <= extent.max_y);
        }
    }

    #[test]
    fn test_aspect_ratio_preserved() {
        let mut sampler = BboxSampler::new(test_extent(), 50.0, 2.5, 3).unwrap();
        for _ in 0..100 {
            let bbox = sampler.next_bbox();
            let ratio = (bbox.max_x - bbox.min_x) / (bbox.max_y - bbox.min_y);
            assert!((ratio - 2.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rejects_zero_area() {
        let err = BboxSampler::new(test_extent(), 0.0, 1.0, 1).unwrap_err();
        assert!(matches!(err, LoadTestError::Configuration(_)));
    }

    #[test]
    fn test_rejects_negative_ratio() {
        let err = BboxSampler::new(test_extent(), 10.0, -1.0, 1).unwrap_err();
        assert!(matches!(err, LoadTestError::Configuration(_)));
    }

    #[test]
    fn test_rejects_degenerate_extent() {
        let extent = Extent::new(10.0, 0.0, 10.0, 5.0);
        let err = BboxSampler::new(extent, 1.0, 1.0, 1).unwrap_err();
        assert!(matches!(err, LoadTestError::Configuration(_)));
    }

    #[test]
    fn test_oversized_area_is_range_error() {
        // 10 km x 10 km requested from a 1 km x 1 km extent.
        let extent = Extent::new(0.0, 0.0, 1000.0, 1000.0);
        let err = BboxSampler::new(extent, 100.0, 1.0, 1).unwrap_err();
        assert!(matches!(err, LoadTestError::Range(_)));
    }

    #[test]
    fn test_exact_fit_pins_draws_to_origin() {
        // Sample side length equals the extent side length, so the only
        // valid start coordinate is the extent minimum.
        let extent = Extent::new(500.0, -2000.0, 10_500.0, 8000.0);
        let mut sampler = BboxSampler::new(extent, 100.0, 1.0, 9).unwrap();
        for _ in 0..50 {
            let bbox = sampler.next_bbox();
            assert_eq!(bbox.min_x, extent.min_x);
            assert_eq!(bbox.min_y, extent.min_y);
            assert_eq!(bbox.max_x, extent.max_x);
            assert_eq!(bbox.max_y, extent.max_y);
        }
    }

    #[test]
    fn test_bbox_param_format() {
        let bbox = SubBbox {
            min_x: -1.5,
            min_y: 2.25,
            max_x: 3.5,
            max_y: 7.25,
        };
        assert_eq!(bbox.to_bbox_param(), "-1.5,2.25,3.5,7.25");
    }
}

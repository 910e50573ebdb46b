//! Per-session request generation.
//!
//! A session resolves the operator configuration against the service
//! capabilities once at startup, owns its private samplers from then on,
//! and turns every draw into one request URL. Sessions never share
//! sampler state; each concurrent worker gets its own instance.

use tracing::info;
use url::Url;

use crate::bbox::BboxSampler;
use crate::capabilities::{WmsCapabilities, WmtsCapabilities};
use crate::config::TestConfig;
use crate::error::{LoadTestError, LoadTestResult};
use crate::request;
use crate::tiles::TileSampler;

const DEFAULT_FORMAT: &str = "image/png";

/// Capabilities of the target, already fetched and parsed.
#[derive(Debug, Clone)]
pub enum ServiceCapabilities {
    Wms(WmsCapabilities),
    Wmts(WmtsCapabilities),
}

/// One simulated client with its own deterministic request stream.
pub enum Session {
    Wms(WmsSession),
    Wmts(WmtsSession),
}

impl Session {
    /// Build a session for the capabilities' protocol. Any resolution
    /// failure here is fatal for the whole run.
    pub fn new(
        config: &TestConfig,
        caps: &ServiceCapabilities,
        seed: u64,
    ) -> LoadTestResult<Self> {
        match caps {
            ServiceCapabilities::Wms(caps) => Ok(Session::Wms(WmsSession::new(config, caps, seed)?)),
            ServiceCapabilities::Wmts(caps) => {
                Ok(Session::Wmts(WmtsSession::new(config, caps, seed)?))
            }
        }
    }

    /// Next request URL.
    pub fn next_url(&mut self) -> Url {
        match self {
            Session::Wms(session) => session.next_url(),
            Session::Wmts(session) => session.next_url(),
        }
    }

    /// Resolved layer name.
    pub fn layer(&self) -> &str {
        match self {
            Session::Wms(session) => session.layer(),
            Session::Wmts(session) => session.layer(),
        }
    }
}

/// GetMap request stream over random sub-bounding-boxes.
#[derive(Debug)]
pub struct WmsSession {
    endpoint: Url,
    layer: String,
    crs: String,
    format: String,
    sampler: BboxSampler,
}

impl WmsSession {
    pub fn new(config: &TestConfig, caps: &WmsCapabilities, seed: u64) -> LoadTestResult<Self> {
        let endpoint = config.endpoint()?;

        let layer = match &config.layer {
            Some(name) => caps
                .find_layer(name)
                .ok_or_else(|| LoadTestError::LayerNotFound {
                    name: name.clone(),
                    available: caps.layer_names(),
                })?,
            None => {
                let first = caps.layers.first().ok_or_else(|| {
                    LoadTestError::Capabilities("service advertises no layers".to_string())
                })?;
                info!(layer = %first.name, "no layer configured, using the first advertised");
                first
            }
        };

        let extent = layer.extent.ok_or_else(|| {
            LoadTestError::Capabilities(format!("layer '{}' has no bounding box", layer.name))
        })?;
        let crs = layer.crs.clone().ok_or_else(|| {
            LoadTestError::Capabilities(format!(
                "layer '{}' bounding box carries no CRS code",
                layer.name
            ))
        })?;
        let format = config
            .format
            .clone()
            .or_else(|| caps.formats.first().cloned())
            .unwrap_or_else(|| DEFAULT_FORMAT.to_string());

        let sampler = BboxSampler::new(extent, config.bbox_area_km2, config.bbox_ratio, seed)?;
        let (side_x, side_y) = sampler.side_lengths();
        info!(
            layer = %layer.name,
            %crs,
            %format,
            seed,
            side_x_m = side_x,
            side_y_m = side_y,
            "WMS session ready"
        );

        Ok(Self {
            endpoint,
            layer: layer.name.clone(),
            crs,
            format,
            sampler,
        })
    }

    pub fn next_url(&mut self) -> Url {
        let bbox = self.sampler.next_bbox();
        request::build_url(
            &self.endpoint,
            &request::getmap_params(&self.layer, &bbox, &self.crs, &self.format),
        )
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }
}

/// GetTile request stream over random tile coordinates.
#[derive(Debug)]
pub struct WmtsSession {
    endpoint: Url,
    layer: String,
    format: String,
    tile_matrix_set: String,
    tile_matrix: String,
    sampler: TileSampler,
}

impl WmtsSession {
    pub fn new(config: &TestConfig, caps: &WmtsCapabilities, seed: u64) -> LoadTestResult<Self> {
        let endpoint = config.endpoint()?;

        let layer = match &config.layer {
            Some(name) => caps
                .find_layer(name)
                .ok_or_else(|| LoadTestError::LayerNotFound {
                    name: name.clone(),
                    available: caps.layer_names(),
                })?,
            None => {
                let first = caps.layers.first().ok_or_else(|| {
                    LoadTestError::Capabilities("service advertises no layers".to_string())
                })?;
                info!(layer = %first.name, "no layer configured, using the first advertised");
                first
            }
        };

        let set_name = match &config.tile_matrix_set {
            Some(name) => {
                if !layer.matrix_set_links.iter().any(|link| link == name) {
                    return Err(LoadTestError::TileMatrixSetNotFound {
                        name: name.clone(),
                        layer: layer.name.clone(),
                        available: layer.matrix_set_links.clone(),
                    });
                }
                name.clone()
            }
            None => {
                let first = layer.matrix_set_links.first().ok_or_else(|| {
                    LoadTestError::Capabilities(format!(
                        "layer '{}' links no tile matrix sets",
                        layer.name
                    ))
                })?;
                info!(tile_matrix_set = %first, "no tile matrix set configured, using the first linked");
                first.clone()
            }
        };

        let set = caps.find_matrix_set(&set_name).ok_or_else(|| {
            LoadTestError::Capabilities(format!(
                "tile matrix set '{set_name}' is linked but not defined in the capabilities"
            ))
        })?;
        if set.matrices.is_empty() {
            return Err(LoadTestError::Capabilities(format!(
                "tile matrix set '{set_name}' defines no tile matrices"
            )));
        }

        let matrix = match &config.tile_matrix {
            Some(name) => set
                .matrices
                .iter()
                .find(|m| &m.identifier == name)
                .ok_or_else(|| LoadTestError::TileMatrixNotFound {
                    name: name.clone(),
                    set: set_name.clone(),
                    available: set.matrices.iter().map(|m| m.identifier.clone()).collect(),
                })?,
            None => {
                // Middle of the pyramid: coarse enough to hit cached
                // levels, fine enough to spread across the grid.
                let matrix = &set.matrices[set.matrices.len() / 2];
                info!(tile_matrix = %matrix.identifier, "no tile matrix configured, using the middle of the pyramid");
                matrix
            }
        };

        let format = config
            .format
            .clone()
            .or_else(|| layer.formats.first().cloned())
            .unwrap_or_else(|| DEFAULT_FORMAT.to_string());

        let sampler = TileSampler::new(matrix.matrix_width, matrix.matrix_height, seed)?;
        info!(
            layer = %layer.name,
            tile_matrix_set = %set_name,
            tile_matrix = %matrix.identifier,
            matrix_width = matrix.matrix_width,
            matrix_height = matrix.matrix_height,
            %format,
            seed,
            "WMTS session ready"
        );

        Ok(Self {
            endpoint,
            layer: layer.name.clone(),
            format,
            tile_matrix_set: set_name,
            tile_matrix: matrix.identifier.clone(),
            sampler,
        })
    }

    pub fn next_url(&mut self) -> Url {
        let tile = self.sampler.next_tile();
        request::build_url(
            &self.endpoint,
            &request::gettile_params(
                &self.layer,
                &tile,
                &self.tile_matrix,
                &self.tile_matrix_set,
                &self.format,
            ),
        )
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::Extent;
    use crate::capabilities::{TileMatrix, TileMatrixSet, WmsLayer, WmtsLayer};
    use crate::config::ServiceMode;

    fn wms_caps() -> WmsCapabilities {
        WmsCapabilities {
            layers: vec![
                WmsLayer {
                    name: "first".to_string(),
                    extent: Some(Extent::new(0.0, 0.0, 100_000.0, 100_000.0)),
                    crs: Some("EPSG:3763".to_string()),
                },
                WmsLayer {
                    name: "second".to_string(),
                    extent: Some(Extent::new(0.0, 0.0, 50_000.0, 50_000.0)),
                    crs: Some("EPSG:3857".to_string()),
                },
            ],
            formats: vec!["image/jpeg".to_string(), "image/png".to_string()],
        }
    }

    fn wmts_caps() -> WmtsCapabilities {
        WmtsCapabilities {
            layers: vec![WmtsLayer {
                name: "ortos".to_string(),
                formats: vec!["image/png".to_string()],
                matrix_set_links: vec!["PTTM_06".to_string()],
            }],
            matrix_sets: vec![TileMatrixSet {
                identifier: "PTTM_06".to_string(),
                matrices: vec![
                    TileMatrix {
                        identifier: "05".to_string(),
                        matrix_width: 123,
                        matrix_height: 246,
                    },
                    TileMatrix {
                        identifier: "06".to_string(),
                        matrix_width: 245,
                        matrix_height: 492,
                    },
                    TileMatrix {
                        identifier: "07".to_string(),
                        matrix_width: 490,
                        matrix_height: 985,
                    },
                    TileMatrix {
                        identifier: "08".to_string(),
                        matrix_width: 980,
                        matrix_height: 1970,
                    },
                    TileMatrix {
                        identifier: "09".to_string(),
                        matrix_width: 1960,
                        matrix_height: 3940,
                    },
                ],
            }],
        }
    }

    fn config(mode: ServiceMode) -> TestConfig {
        TestConfig {
            name: "test".to_string(),
            description: String::new(),
            base_url: "https://host/service?map=/a/b.map".to_string(),
            mode,
            duration_secs: 10,
            concurrency: 1,
            requests_per_second: None,
            warmup_secs: 0,
            seed: 1640,
            layer: None,
            bbox_area_km2: 100.0,
            bbox_ratio: 1.0,
            tile_matrix_set: None,
            tile_matrix: None,
            format: None,
            log_requests: false,
        }
    }

    #[test]
    fn test_wms_defaults_to_first_layer_and_format() {
        let mut session = WmsSession::new(&config(ServiceMode::Wms), &wms_caps(), 42).unwrap();
        let url = session.next_url();
        let query = url.query().unwrap();
        assert!(query.contains("layers=first"));
        assert!(query.contains("format=image%2Fjpeg"));
        assert!(query.contains("crs=EPSG%3A3763"));
        assert!(query.contains("map=%2Fa%2Fb.map"));
    }

    #[test]
    fn test_wms_unknown_layer_lists_alternatives() {
        let mut cfg = config(ServiceMode::Wms);
        cfg.layer = Some("missing".to_string());
        let err = WmsSession::new(&cfg, &wms_caps(), 42).unwrap_err();
        match err {
            LoadTestError::LayerNotFound { name, available } => {
                assert_eq!(name, "missing");
                assert_eq!(available, vec!["first", "second"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wms_sessions_with_same_seed_agree() {
        let cfg = config(ServiceMode::Wms);
        let mut a = WmsSession::new(&cfg, &wms_caps(), 7).unwrap();
        let mut b = WmsSession::new(&cfg, &wms_caps(), 7).unwrap();
        for _ in 0..20 {
            assert_eq!(a.next_url(), b.next_url());
        }
    }

    #[test]
    fn test_wmts_defaults_to_middle_matrix() {
        let mut session = WmtsSession::new(&config(ServiceMode::Wmts), &wmts_caps(), 1640).unwrap();
        let url = session.next_url();
        let query = url.query().unwrap();
        // Five matrices, so the middle is index 2.
        assert!(query.contains("tilematrix=07"));
        assert!(query.contains("tilematrixset=PTTM_06"));
        assert!(query.contains("style=default"));
    }

    #[test]
    fn test_wmts_first_draw_matches_samplers() {
        let mut session = WmtsSession::new(&config(ServiceMode::Wmts), &wmts_caps(), 1640).unwrap();
        let url = session.next_url();
        let query = url.query().unwrap();
        // First draws of the 490x985 grid under seed 1640.
        assert!(query.contains("tilecol=406"));
        assert!(query.contains("tilerow=812"));
    }

    #[test]
    fn test_wmts_unknown_matrix_set_lists_alternatives() {
        let mut cfg = config(ServiceMode::Wmts);
        cfg.tile_matrix_set = Some("nope".to_string());
        let err = WmtsSession::new(&cfg, &wmts_caps(), 1).unwrap_err();
        match err {
            LoadTestError::TileMatrixSetNotFound {
                name,
                layer,
                available,
            } => {
                assert_eq!(name, "nope");
                assert_eq!(layer, "ortos");
                assert_eq!(available, vec!["PTTM_06"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wmts_unknown_matrix_lists_alternatives() {
        let mut cfg = config(ServiceMode::Wmts);
        cfg.tile_matrix = Some("99".to_string());
        let err = WmtsSession::new(&cfg, &wmts_caps(), 1).unwrap_err();
        match err {
            LoadTestError::TileMatrixNotFound {
                name,
                set,
                available,
            } => {
                assert_eq!(name, "99");
                assert_eq!(set, "PTTM_06");
                assert_eq!(available, vec!["05", "06", "07", "08", "09"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_session_dispatches_by_capabilities() {
        let caps = ServiceCapabilities::Wmts(wmts_caps());
        let mut session = Session::new(&config(ServiceMode::Wmts), &caps, 1640).unwrap();
        let url = session.next_url();
        assert!(url.query().unwrap().contains("request=GetTile"));
    }
}

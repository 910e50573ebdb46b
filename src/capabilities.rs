//! GetCapabilities client for WMS and WMTS services.
//!
//! Fetches the capabilities document from the operator-supplied endpoint
//! and extracts the metadata the samplers need: layers with their extents
//! and CRS codes for WMS, layers with tile matrix sets and per-matrix grid
//! dimensions for WMTS. Namespace prefixes are ignored, matching is on
//! local element names.

use anyhow::Result;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;
use url::Url;

use crate::bbox::Extent;
use crate::error::{LoadTestError, LoadTestResult};
use crate::request;

/// Metadata advertised by a WMS service.
#[derive(Debug, Clone, Default)]
pub struct WmsCapabilities {
    pub layers: Vec<WmsLayer>,
    /// GetMap output formats, in advertised order.
    pub formats: Vec<String>,
}

/// One named WMS layer.
#[derive(Debug, Clone, Default)]
pub struct WmsLayer {
    pub name: String,
    /// Extent of the first BoundingBox element, inherited from parent
    /// layers where the layer declares none of its own.
    pub extent: Option<Extent>,
    /// CRS code of that bounding box.
    pub crs: Option<String>,
}

/// Metadata advertised by a WMTS service.
#[derive(Debug, Clone, Default)]
pub struct WmtsCapabilities {
    pub layers: Vec<WmtsLayer>,
    pub matrix_sets: Vec<TileMatrixSet>,
}

/// One WMTS layer with its format list and tile matrix set links.
#[derive(Debug, Clone, Default)]
pub struct WmtsLayer {
    pub name: String,
    pub formats: Vec<String>,
    pub matrix_set_links: Vec<String>,
}

/// A named pyramid of tile matrices.
#[derive(Debug, Clone, Default)]
pub struct TileMatrixSet {
    pub identifier: String,
    pub matrices: Vec<TileMatrix>,
}

/// One zoom level of a tile matrix set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileMatrix {
    pub identifier: String,
    pub matrix_width: u64,
    pub matrix_height: u64,
}

impl WmsCapabilities {
    pub fn layer_names(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.name.clone()).collect()
    }

    pub fn find_layer(&self, name: &str) -> Option<&WmsLayer> {
        self.layers.iter().find(|l| l.name == name)
    }
}

impl WmtsCapabilities {
    pub fn layer_names(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.name.clone()).collect()
    }

    pub fn find_layer(&self, name: &str) -> Option<&WmtsLayer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn find_matrix_set(&self, identifier: &str) -> Option<&TileMatrixSet> {
        self.matrix_sets.iter().find(|s| s.identifier == identifier)
    }
}

/// Fetch and parse WMS capabilities.
pub async fn fetch_wms(client: &reqwest::Client, base: &Url) -> Result<WmsCapabilities> {
    let url = request::build_url(
        base,
        &[
            ("service", "WMS".to_string()),
            ("request", "GetCapabilities".to_string()),
        ],
    );
    debug!(url = %url, "fetching WMS capabilities");
    let xml = client
        .get(url.as_str())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(parse_wms(&xml)?)
}

/// Fetch and parse WMTS capabilities.
pub async fn fetch_wmts(client: &reqwest::Client, base: &Url) -> Result<WmtsCapabilities> {
    let url = request::build_url(
        base,
        &[
            ("service", "WMTS".to_string()),
            ("request", "GetCapabilities".to_string()),
        ],
    );
    debug!(url = %url, "fetching WMTS capabilities");
    let xml = client
        .get(url.as_str())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(parse_wmts(&xml)?)
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Read the extent and CRS off a BoundingBox element's attributes.
/// Accepts both the 1.3.0 `CRS` and the 1.1.1 `SRS` spelling.
fn read_bounding_box(e: &BytesStart) -> LoadTestResult<(Extent, Option<String>)> {
    let mut min_x = None;
    let mut min_y = None;
    let mut max_x = None;
    let mut max_y = None;
    let mut crs = None;

    for attr in e.attributes() {
        let attr = attr
            .map_err(|err| LoadTestError::Capabilities(format!("bad attribute: {err}")))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = String::from_utf8_lossy(&attr.value).into_owned();
        match key.as_str() {
            "minx" => min_x = Some(parse_coord(&value)?),
            "miny" => min_y = Some(parse_coord(&value)?),
            "maxx" => max_x = Some(parse_coord(&value)?),
            "maxy" => max_y = Some(parse_coord(&value)?),
            "CRS" | "SRS" => crs = Some(value),
            _ => {}
        }
    }

    match (min_x, min_y, max_x, max_y) {
        (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) => {
            Ok((Extent::new(min_x, min_y, max_x, max_y), crs))
        }
        _ => Err(LoadTestError::Capabilities(
            "BoundingBox element is missing corner attributes".to_string(),
        )),
    }
}

fn parse_coord(value: &str) -> LoadTestResult<f64> {
    value
        .parse()
        .map_err(|_| LoadTestError::Capabilities(format!("invalid coordinate '{value}'")))
}

/// Parse a WMS GetCapabilities document.
pub fn parse_wms(xml: &str) -> LoadTestResult<WmsCapabilities> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    // Layers nest; children inherit the parent's bounding box.
    let mut layer_stack: Vec<WmsLayer> = Vec::new();
    let mut caps = WmsCapabilities::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(&e);
                match name.as_str() {
                    "Layer" => {
                        let mut layer = WmsLayer::default();
                        if let Some(parent) = layer_stack.last() {
                            layer.extent = parent.extent;
                            layer.crs = parent.crs.clone();
                        }
                        layer_stack.push(layer);
                    }
                    "BoundingBox" => {
                        if let Some(layer) = layer_stack.last_mut() {
                            let (extent, crs) = read_bounding_box(&e)?;
                            layer.extent = Some(extent);
                            layer.crs = crs;
                        }
                    }
                    _ => {}
                }
                path.push(name);
            }
            Ok(Event::Empty(e)) => {
                if local_name(&e) == "BoundingBox" {
                    if let Some(layer) = layer_stack.last_mut() {
                        let (extent, crs) = read_bounding_box(&e)?;
                        layer.extent = Some(extent);
                        layer.crs = crs;
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| LoadTestError::Capabilities(format!("bad text node: {e}")))?
                    .into_owned();
                let elem = path.last().map(String::as_str).unwrap_or("");
                let parent = if path.len() >= 2 {
                    path[path.len() - 2].as_str()
                } else {
                    ""
                };
                match (parent, elem) {
                    ("Layer", "Name") => {
                        if let Some(layer) = layer_stack.last_mut() {
                            layer.name = text;
                        }
                    }
                    ("GetMap", "Format") => caps.formats.push(text),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                path.pop();
                if name == "Layer" {
                    if let Some(layer) = layer_stack.pop() {
                        // Container layers without a name are grouping only.
                        if !layer.name.is_empty() {
                            caps.layers.push(layer);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(LoadTestError::Capabilities(format!(
                    "XML parsing error at position {}: {e:?}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    if caps.layers.is_empty() {
        return Err(LoadTestError::Capabilities(
            "service advertises no named layers".to_string(),
        ));
    }
    Ok(caps)
}

/// Parse a WMTS GetCapabilities document.
pub fn parse_wmts(xml: &str) -> LoadTestResult<WmtsCapabilities> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut caps = WmtsCapabilities::default();
    let mut cur_layer: Option<WmtsLayer> = None;
    let mut cur_set: Option<TileMatrixSet> = None;
    let mut cur_matrix: Option<(String, Option<u64>, Option<u64>)> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(&e);
                let parent = path.last().map(String::as_str).unwrap_or("");
                match (parent, name.as_str()) {
                    ("Contents", "Layer") => cur_layer = Some(WmtsLayer::default()),
                    // The top-level block, not the text link inside a layer.
                    ("Contents", "TileMatrixSet") => cur_set = Some(TileMatrixSet::default()),
                    ("TileMatrixSet", "TileMatrix") => {
                        if cur_set.is_some() {
                            cur_matrix = Some((String::new(), None, None));
                        }
                    }
                    _ => {}
                }
                path.push(name);
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| LoadTestError::Capabilities(format!("bad text node: {e}")))?
                    .into_owned();
                let elem = path.last().map(String::as_str).unwrap_or("");
                let parent = if path.len() >= 2 {
                    path[path.len() - 2].as_str()
                } else {
                    ""
                };
                match (parent, elem) {
                    ("Layer", "Identifier") => {
                        if let Some(layer) = cur_layer.as_mut() {
                            layer.name = text;
                        }
                    }
                    ("Layer", "Format") => {
                        if let Some(layer) = cur_layer.as_mut() {
                            layer.formats.push(text);
                        }
                    }
                    ("TileMatrixSetLink", "TileMatrixSet") => {
                        if let Some(layer) = cur_layer.as_mut() {
                            layer.matrix_set_links.push(text);
                        }
                    }
                    ("TileMatrixSet", "Identifier") => {
                        if let Some(set) = cur_set.as_mut() {
                            set.identifier = text;
                        }
                    }
                    ("TileMatrix", "Identifier") => {
                        if let Some(matrix) = cur_matrix.as_mut() {
                            matrix.0 = text;
                        }
                    }
                    ("TileMatrix", "MatrixWidth") => {
                        if let Some(matrix) = cur_matrix.as_mut() {
                            matrix.1 = Some(parse_dimension(&text)?);
                        }
                    }
                    ("TileMatrix", "MatrixHeight") => {
                        if let Some(matrix) = cur_matrix.as_mut() {
                            matrix.2 = Some(parse_dimension(&text)?);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                path.pop();
                let parent = path.last().map(String::as_str).unwrap_or("");
                match (parent, name.as_str()) {
                    ("Contents", "Layer") => {
                        if let Some(layer) = cur_layer.take() {
                            if !layer.name.is_empty() {
                                caps.layers.push(layer);
                            }
                        }
                    }
                    ("Contents", "TileMatrixSet") => {
                        if let Some(set) = cur_set.take() {
                            if !set.identifier.is_empty() {
                                caps.matrix_sets.push(set);
                            }
                        }
                    }
                    ("TileMatrixSet", "TileMatrix") => {
                        if let Some((identifier, width, height)) = cur_matrix.take() {
                            if let (Some(matrix_width), Some(matrix_height)) = (width, height) {
                                if let Some(set) = cur_set.as_mut() {
                                    set.matrices.push(TileMatrix {
                                        identifier,
                                        matrix_width,
                                        matrix_height,
                                    });
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(LoadTestError::Capabilities(format!(
                    "XML parsing error at position {}: {e:?}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    if caps.layers.is_empty() {
        return Err(LoadTestError::Capabilities(
            "service advertises no layers".to_string(),
        ));
    }
    Ok(caps)
}

fn parse_dimension(value: &str) -> LoadTestResult<u64> {
    value
        .parse()
        .map_err(|_| LoadTestError::Capabilities(format!("invalid matrix dimension '{value}'")))
}

//! Request URL construction.
//!
//! Service endpoints may already carry query parameters (mapserv-style
//! `...?map=/path/file.map`), so building a request means merging the
//! protocol parameters into the existing query string instead of
//! appending a second `?` section.

use url::Url;

use crate::bbox::SubBbox;
use crate::tiles::TileCoord;

/// Fixed image size for GetMap requests, in pixels per side.
pub const IMAGE_SIZE: u32 = 512;

/// GetMap query parameters, in transmission order.
pub fn getmap_params(
    layer: &str,
    bbox: &SubBbox,
    crs: &str,
    format: &str,
) -> Vec<(&'static str, String)> {
    vec![
        ("service", "WMS".to_string()),
        ("version", "1.3.0".to_string()),
        ("request", "GetMap".to_string()),
        ("layers", layer.to_string()),
        ("styles", String::new()),
        ("bbox", bbox.to_bbox_param()),
        ("width", IMAGE_SIZE.to_string()),
        ("height", IMAGE_SIZE.to_string()),
        ("crs", crs.to_string()),
        ("format", format.to_string()),
    ]
}

/// GetTile query parameters, in transmission order.
pub fn gettile_params(
    layer: &str,
    tile: &TileCoord,
    tile_matrix: &str,
    tile_matrix_set: &str,
    format: &str,
) -> Vec<(&'static str, String)> {
    vec![
        ("service", "WMTS".to_string()),
        ("version", "1.0.0".to_string()),
        ("request", "GetTile".to_string()),
        ("layer", layer.to_string()),
        ("style", "default".to_string()),
        ("tilematrix", tile_matrix.to_string()),
        ("tilematrixset", tile_matrix_set.to_string()),
        ("tilerow", tile.row.to_string()),
        ("tilecol", tile.col.to_string()),
        ("format", format.to_string()),
    ]
}

/// Merge `params` onto the base URL's existing query string.
///
/// Existing keys keep their position and values unless a parameter
/// overrides them; overridden keys collapse to the single new value; new
/// keys are appended in `params` order. Every value is re-encoded with
/// standard form-urlencoded rules, so e.g. a `/` inside a mimetype
/// becomes `%2F`.
pub fn build_url(base: &Url, params: &[(&str, String)]) -> Url {
    // Ordered multimap of the existing query, grouped at first occurrence.
    let mut merged: Vec<(String, Vec<String>)> = Vec::new();
    for (key, value) in base.query_pairs() {
        let key = key.into_owned();
        let value = value.into_owned();
        match merged.iter_mut().find(|entry| entry.0 == key) {
            Some((_, values)) => values.push(value),
            None => merged.push((key, vec![value])),
        }
    }

    for (key, value) in params {
        match merged.iter_mut().find(|entry| entry.0 == *key) {
            Some((_, values)) => {
                values.clear();
                values.push(value.clone());
            }
            None => merged.push((key.to_string(), vec![value.clone()])),
        }
    }

    let mut url = base.clone();
    if merged.is_empty() {
        url.set_query(None);
        return url;
    }
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (key, values) in &merged {
            for value in values {
                query.append_pair(key, value);
            }
        }
    }
    url
}

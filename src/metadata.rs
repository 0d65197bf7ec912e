//! Dataset metadata (metadata.xml) parsing.
//!
//! The file is an ASCII-subset element soup, parsed by tag extraction rather
//! than a full XML stack: `<SRS>` carries `ENU:<lat>,<lon>`, `EPSG:<code>`,
//! or raw WKT; `<SRSOrigin>` carries the projected origin offset.

use std::path::Path;

use glam::DVec3;

use crate::error::{Result, TilerError};

/// Which kind of spatial reference the dataset declares.
#[derive(Debug, Clone, PartialEq)]
pub enum SrsKind {
    /// Local east/north/up frame at a geographic origin.
    Enu { lat: f64, lon: f64 },
    /// Projected CRS by EPSG code.
    Epsg(i32),
    /// Raw WKT CRS definition.
    Wkt(String),
}

/// Parsed dataset metadata.
#[derive(Debug, Clone)]
pub struct DatasetMetadata {
    pub version: String,
    pub srs: SrsKind,
    /// Origin offset in source projected coordinates.
    pub origin: DVec3,
}

/// Extract the body of the first `<tag>...</tag>` pair.
fn extract_tag<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(&xml[start..end])
}

/// Extract the `version` attribute of `<ModelMetadata ...>`.
fn extract_version(xml: &str) -> String {
    let Some(start) = xml.find("<ModelMetadata") else {
        return "1".into();
    };
    let tail = &xml[start..];
    let Some(end) = tail.find('>') else {
        return "1".into();
    };
    let open_tag = &tail[..end];
    open_tag
        .find("version=\"")
        .and_then(|p| {
            let value = &open_tag[p + 9..];
            value.find('"').map(|q| value[..q].to_string())
        })
        .unwrap_or_else(|| "1".into())
}

/// Parse a metadata.xml file.
pub fn parse_metadata_xml(path: &Path) -> Result<DatasetMetadata> {
    let content = std::fs::read_to_string(path)?;
    parse_metadata_str(&content)
}

/// Parse metadata.xml content.
pub fn parse_metadata_str(content: &str) -> Result<DatasetMetadata> {
    let srs_text = extract_tag(content, "SRS")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TilerError::parse("metadata.xml: SRS tag not found"))?;
    let origin_text = extract_tag(content, "SRSOrigin")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TilerError::parse("metadata.xml: SRSOrigin tag not found"))?;

    let srs = parse_srs(srs_text)?;
    let origin = parse_origin(origin_text)?;

    Ok(DatasetMetadata {
        version: extract_version(content),
        srs,
        origin,
    })
}

/// The `ENU` and `EPSG` prefixes are case-sensitive; anything else is WKT.
fn parse_srs(text: &str) -> Result<SrsKind> {
    let Some((prefix, rest)) = text.split_once(':') else {
        return Ok(SrsKind::Wkt(text.to_string()));
    };
    match prefix.trim() {
        "ENU" => {
            let mut parts = rest.split(',');
            let lat = parts
                .next()
                .map(str::trim)
                .and_then(|v| v.parse::<f64>().ok());
            let lon = parts
                .next()
                .map(str::trim)
                .and_then(|v| v.parse::<f64>().ok());
            match (lat, lon) {
                (Some(lat), Some(lon)) => Ok(SrsKind::Enu { lat, lon }),
                _ => Err(TilerError::parse(format!(
                    "metadata.xml: invalid ENU coordinates in SRS [{text}]"
                ))),
            }
        }
        "EPSG" => rest
            .trim()
            .parse::<i32>()
            .map(SrsKind::Epsg)
            .map_err(|_| TilerError::parse(format!("metadata.xml: invalid EPSG code [{text}]"))),
        _ => Ok(SrsKind::Wkt(text.to_string())),
    }
}

/// `x,y[,z]`; a missing third component defaults to 0.
fn parse_origin(text: &str) -> Result<DVec3> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    if parts.len() < 2 {
        return Err(TilerError::parse(format!(
            "metadata.xml: SRSOrigin needs at least x,y [{text}]"
        )));
    }
    let parse = |s: &str| {
        s.parse::<f64>()
            .map_err(|_| TilerError::parse(format!("metadata.xml: bad SRSOrigin component [{s}]")))
    };
    let x = parse(parts[0])?;
    let y = parse(parts[1])?;
    let z = if parts.len() >= 3 { parse(parts[2])? } else { 0.0 };
    Ok(DVec3::new(x, y, z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_enu_metadata() {
        let xml = r#"<ModelMetadata version="1">
  <SRS>ENU:36.09953,120.34445</SRS>
  <SRSOrigin>0,0,0</SRSOrigin>
</ModelMetadata>"#;
        let meta = parse_metadata_str(xml).unwrap();
        assert_eq!(meta.version, "1");
        assert_eq!(
            meta.srs,
            SrsKind::Enu {
                lat: 36.09953,
                lon: 120.34445
            }
        );
        assert_eq!(meta.origin, DVec3::ZERO);
    }

    #[test]
    fn test_parse_epsg_metadata() {
        let xml = "<ModelMetadata><SRS> EPSG:4547 </SRS><SRSOrigin>39500000.0,3450000.0,0</SRSOrigin></ModelMetadata>";
        let meta = parse_metadata_str(xml).unwrap();
        assert_eq!(meta.srs, SrsKind::Epsg(4547));
        assert_eq!(meta.origin.x, 39_500_000.0);
    }

    #[test]
    fn test_unknown_prefix_is_wkt() {
        let xml = "<ModelMetadata><SRS>PROJCS[\"CGCS2000\"]</SRS><SRSOrigin>1,2</SRSOrigin></ModelMetadata>";
        let meta = parse_metadata_str(xml).unwrap();
        assert!(matches!(meta.srs, SrsKind::Wkt(_)));
        // Missing z defaults to 0.
        assert_eq!(meta.origin, DVec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_lowercase_enu_is_wkt() {
        let xml =
            "<ModelMetadata><SRS>enu:1,2</SRS><SRSOrigin>0,0</SRSOrigin></ModelMetadata>";
        let meta = parse_metadata_str(xml).unwrap();
        assert!(matches!(meta.srs, SrsKind::Wkt(_)));
    }

    #[test]
    fn test_missing_srs_is_an_error() {
        let xml = "<ModelMetadata><SRSOrigin>0,0</SRSOrigin></ModelMetadata>";
        assert!(parse_metadata_str(xml).is_err());
    }

    #[test]
    fn test_single_component_origin_is_an_error() {
        let xml = "<ModelMetadata><SRS>EPSG:4547</SRS><SRSOrigin>15</SRSOrigin></ModelMetadata>";
        assert!(parse_metadata_str(xml).is_err());
    }

    #[test]
    fn test_version_attribute() {
        let xml = r#"<ModelMetadata version="2.1"><SRS>EPSG:4547</SRS><SRSOrigin>0,0</SRSOrigin></ModelMetadata>"#;
        assert_eq!(parse_metadata_str(xml).unwrap().version, "2.1");
    }
}

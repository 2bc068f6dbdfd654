//! OSM PBF extract loading: drivable ways plus the nodes they reference.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use osmpbf::{Element, ElementReader};

/// Highway classes kept for routing; everything else is discarded on read.
const DRIVABLE_HIGHWAYS: [&str; 13] = [
    "motorway",
    "motorway_link",
    "trunk",
    "trunk_link",
    "primary",
    "primary_link",
    "secondary",
    "secondary_link",
    "tertiary",
    "tertiary_link",
    "unclassified",
    "residential",
    "living_street",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OneWay {
    #[default]
    No,
    Forward,
    Backward,
}

#[derive(Debug, Clone)]
pub struct OsmWay {
    pub id: i64,
    pub node_ids: Vec<i64>,
    /// Parsed `maxspeed` in km/h; 0 when the tag is absent or unparseable.
    pub maxspeed_kmh: u32,
    pub oneway: OneWay,
}

/// Raw road data pulled from a PBF file, ready for graph building.
#[derive(Debug, Default)]
pub struct OsmExtract {
    /// Node id → (lat, lon), for every node in the extract.
    pub nodes: HashMap<i64, (f64, f64)>,
    pub ways: Vec<OsmWay>,
}

/// Errors encountered while reading an extract.
#[derive(Debug)]
pub enum ExtractError {
    Pbf(osmpbf::Error),
    /// The file parsed but contained no drivable road data.
    NoRoadData,
}

impl From<osmpbf::Error> for ExtractError {
    fn from(err: osmpbf::Error) -> Self {
        ExtractError::Pbf(err)
    }
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::Pbf(err) => write!(f, "failed to read OSM extract: {err}"),
            ExtractError::NoRoadData => write!(f, "extract contains no drivable road data"),
        }
    }
}

impl std::error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtractError::Pbf(err) => Some(err),
            ExtractError::NoRoadData => None,
        }
    }
}

/// Stream a PBF file into an [`OsmExtract`].
pub fn load_extract(path: impl AsRef<Path>) -> Result<OsmExtract, ExtractError> {
    let reader = ElementReader::from_path(path)?;
    let mut extract = OsmExtract::default();

    reader.for_each(|element| match element {
        Element::Node(node) => {
            extract.nodes.insert(node.id(), (node.lat(), node.lon()));
        }
        Element::DenseNode(node) => {
            extract.nodes.insert(node.id(), (node.lat(), node.lon()));
        }
        Element::Way(way) => {
            let mut highway = None;
            let mut maxspeed_kmh = 0;
            let mut oneway = OneWay::No;
            for (key, value) in way.tags() {
                match key {
                    "highway" => highway = Some(value),
                    "maxspeed" => maxspeed_kmh = parse_leading_int(value),
                    "oneway" => {
                        oneway = match value {
                            "yes" | "1" => OneWay::Forward,
                            "-1" => OneWay::Backward,
                            _ => OneWay::No,
                        }
                    }
                    _ => {}
                }
            }
            if highway.is_some_and(|h| DRIVABLE_HIGHWAYS.contains(&h)) {
                extract.ways.push(OsmWay {
                    id: way.id(),
                    node_ids: way.refs().collect(),
                    maxspeed_kmh,
                    oneway,
                });
            }
        }
        Element::Relation(_) => {}
    })?;

    if extract.nodes.is_empty() || extract.ways.is_empty() {
        return Err(ExtractError::NoRoadData);
    }
    Ok(extract)
}

/// Integer prefix of a tag value: `"50"` and `"50 mph"` both parse as 50.
fn parse_leading_int(value: &str) -> u32 {
    let digits: &str = value
        .trim_start()
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .unwrap_or("");
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maxspeed_parses_integer_prefix() {
        assert_eq!(parse_leading_int("50"), 50);
        assert_eq!(parse_leading_int("30 mph"), 30);
        assert_eq!(parse_leading_int(" 40"), 40);
        assert_eq!(parse_leading_int("walk"), 0);
        assert_eq!(parse_leading_int(""), 0);
    }

    #[test]
    fn drivable_set_covers_link_variants() {
        assert!(DRIVABLE_HIGHWAYS.contains(&"motorway_link"));
        assert!(DRIVABLE_HIGHWAYS.contains(&"living_street"));
        assert!(!DRIVABLE_HIGHWAYS.contains(&"footway"));
        assert!(!DRIVABLE_HIGHWAYS.contains(&"cycleway"));
    }
}

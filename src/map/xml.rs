// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Reader of XML map tiles.
//!
//! A tile is a flat list of self-closing elements, optionally wrapped in `<map>`:
//!
//! ```xml
//! <map id="7" nodes="2">
//!   <node id="1" lat="52000000" lon="21000000" restriction="noThroughfare"/>
//!   <node id="2" lat="52000100" lon="21000000"/>
//!   <connection from="1" to="2" a="120" b="9" c="9" vehicles="0xff"/>
//!   <external from="2" map="8" node="5" a="10" b="1" c="1" vehicles="0xff"/>
//!   <expansion node="3" from="1" to="2"/>
//!   <level level="1" map="0x80000001"/>
//!   <translation map="8" node="5" higher="0x40000010"/>
//!   <neighbour map="8"/>
//! </map>
//! ```
//!
//! Numbers may be written in decimal or, with a `0x` prefix, in hexadecimal.

use std::fs::File;
use std::io::{self, BufRead};
use std::path::Path;
use std::str::from_utf8;

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};

use super::{ConnectionData, EntryRestriction, LoadError, MapBuilder, RoutingMap};

/// Format of the input tile file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    /// Guess the format based on the first bytes of the content
    #[default]
    Unknown,

    /// Force uncompressed XML
    Xml,

    /// Force XML with [gzip](https://en.wikipedia.org/wiki/Gzip) compression
    XmlGz,

    /// Force XML with [bzip2](https://en.wikipedia.org/wiki/Bzip2) compression
    XmlBz2,
}

impl FileFormat {
    fn detect(head: &[u8]) -> Self {
        if head.starts_with(&[0x1f, 0x8b]) {
            Self::XmlGz
        } else if head.starts_with(b"BZh") {
            Self::XmlBz2
        } else {
            Self::Xml
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("xml: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("xml attribute: {0}")]
    Attribute(#[from] AttrError),

    #[error("<{element}> is missing the {attribute:?} attribute")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },

    #[error("<{element}> has an invalid {attribute:?} attribute: {value:?}")]
    InvalidAttribute {
        element: String,
        attribute: &'static str,
        value: String,
    },

    #[error("the tile does not declare its map id")]
    MissingMapId,

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Loads a tile from the file at the provided path.
pub fn load_from_file<P: AsRef<Path>>(path: P, format: FileFormat) -> Result<RoutingMap, ReadError> {
    let f = File::open(path)?;
    load_from_reader(f, format)
}

/// Loads a tile from a stream. The stream is wrapped in a buffered reader when needed.
pub fn load_from_reader<R: io::Read>(reader: R, format: FileFormat) -> Result<RoutingMap, ReadError> {
    let mut b = io::BufReader::new(reader);
    let format = match format {
        FileFormat::Unknown => FileFormat::detect(b.fill_buf()?),
        f => f,
    };
    log::debug!("reading a {:?} map tile", format);

    match format {
        FileFormat::XmlGz => {
            let d = flate2::read::MultiGzDecoder::new(b);
            read_tile(io::BufReader::new(d))
        }
        FileFormat::XmlBz2 => {
            let d = bzip2::read::MultiBzDecoder::new(b);
            read_tile(io::BufReader::new(d))
        }
        FileFormat::Xml | FileFormat::Unknown => read_tile(b),
    }
}

fn read_tile<R: BufRead>(reader: R) -> Result<RoutingMap, ReadError> {
    let mut parser = quick_xml::Reader::from_reader(reader);
    let mut buf = Vec::new();
    let mut builder = MapBuilder::new(0);
    let mut has_map_id = false;
    let mut skipped = 0_usize;

    loop {
        match parser.read_event_into(&mut buf)? {
            Event::Start(start) | Event::Empty(start) => {
                let e = Element::parse(&start)?;
                match e.name.as_str() {
                    "map" => {
                        builder.set_map_id(e.u32("id")?);
                        if let Some(count) = e.opt_u32("nodes")? {
                            builder.expect_nodes(count as usize);
                        }
                        has_map_id = true;
                    }

                    "node" => {
                        let restriction = match e.get("restriction") {
                            None => EntryRestriction::NoRestrictions,
                            Some(v) => EntryRestriction::from_name(v).ok_or_else(|| e.invalid("restriction", v))?,
                        };
                        builder.add_node(e.u32("id")?, e.i32("lat")?, e.i32("lon")?, restriction);
                    }

                    "connection" => {
                        builder.add_connection(e.u32("from")?, e.u32("to")?, e.connection_data()?);
                    }

                    "external" => {
                        builder.add_external_connection(
                            e.u32("from")?,
                            e.u32("map")?,
                            e.u32("node")?,
                            e.connection_data()?,
                        );
                    }

                    "expansion" => {
                        builder.add_expansion(e.u32("node")?, e.u32("from")?, e.u32("to")?);
                    }

                    "level" => {
                        builder.add_level(e.u32("level")?, e.u32("map")?);
                    }

                    "translation" => {
                        builder.add_translation(e.u32("map")?, e.u32("node")?, e.u32("higher")?);
                    }

                    "neighbour" => {
                        builder.add_neighbour(e.u32("map")?);
                    }

                    _ => skipped += 1,
                }
            }

            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if skipped > 0 {
        log::warn!("skipped {} unknown elements", skipped);
    }
    if !has_map_id {
        return Err(ReadError::MissingMapId);
    }

    let map = builder.build()?;
    log::info!(
        "loaded map {:#x} with {} nodes and {} external nodes",
        map.map_id(),
        map.graph().len(),
        map.graph().external_nodes().len()
    );
    Ok(map)
}

/// Name and attributes of a single element.
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
}

impl Element {
    fn parse(start: &BytesStart<'_>) -> Result<Self, ReadError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = from_utf8(&attr.value)
                .map_err(|_| ReadError::InvalidAttribute {
                    element: name.clone(),
                    attribute: "(utf-8)",
                    value: String::from_utf8_lossy(&attr.value).into_owned(),
                })?
                .to_string();
            attrs.push((key, value));
        }
        Ok(Self { name, attrs })
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn invalid(&self, attribute: &'static str, value: &str) -> ReadError {
        ReadError::InvalidAttribute {
            element: self.name.clone(),
            attribute,
            value: value.to_string(),
        }
    }

    fn opt_u32(&self, key: &'static str) -> Result<Option<u32>, ReadError> {
        self.get(key)
            .map(|v| parse_u32(v).ok_or_else(|| self.invalid(key, v)))
            .transpose()
    }

    fn u32(&self, key: &'static str) -> Result<u32, ReadError> {
        self.opt_u32(key)?.ok_or_else(|| ReadError::MissingAttribute {
            element: self.name.clone(),
            attribute: key,
        })
    }

    fn i32(&self, key: &'static str) -> Result<i32, ReadError> {
        let v = self.get(key).ok_or_else(|| ReadError::MissingAttribute {
            element: self.name.clone(),
            attribute: key,
        })?;
        v.parse().map_err(|_| self.invalid(key, v))
    }

    fn connection_data(&self) -> Result<ConnectionData, ReadError> {
        Ok(ConnectionData::new(
            self.u32("a")?,
            self.u32("b")?,
            self.u32("c")?,
            self.u32("vehicles")?,
        ))
    }
}

fn parse_u32(s: &str) -> Option<u32> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16).ok(),
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TILE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<map id="7" nodes="3">
  <node id="1" lat="0" lon="0"/>
  <node id="2" lat="0" lon="100" restriction="noThroughfare"/>
  <node id="0x80000001" lat="0" lon="100"/>
  <connection from="1" to="2" a="100" b="10" c="10" vehicles="0xff"/>
  <connection from="2" to="0x80000001" a="0" b="0" c="0" vehicles="0xff"/>
  <external from="2" map="8" node="5" a="10" b="1" c="1" vehicles="0xff"/>
  <level level="1" map="0x80000001"/>
  <neighbour map="8"/>
  <comment text="ignored"/>
</map>
"#;

    #[test]
    fn parse_u32_formats() {
        assert_eq!(parse_u32("42"), Some(42));
        assert_eq!(parse_u32(" 0x2a "), Some(42));
        assert_eq!(parse_u32("0x8000_0001"), Some(0x8000_0001));
        assert_eq!(parse_u32("-1"), None);
        assert_eq!(parse_u32("x"), None);
    }

    #[test]
    fn detect_format() {
        assert_eq!(FileFormat::detect(&[0x1f, 0x8b, 8]), FileFormat::XmlGz);
        assert_eq!(FileFormat::detect(b"BZh91AY"), FileFormat::XmlBz2);
        assert_eq!(FileFormat::detect(b"<?xml"), FileFormat::Xml);
        assert_eq!(FileFormat::detect(b""), FileFormat::Xml);
    }

    fn check_tile(map: &RoutingMap) {
        let g = map.graph();
        assert_eq!(map.map_id(), 7);
        assert_eq!(g.len(), 3);

        let n1 = g.node_index(1).unwrap();
        let n2 = g.node_index(2).unwrap();
        assert_eq!(g.restriction(n2), EntryRestriction::NoThroughfare);
        assert_eq!(g.node(n2).map(|n| n.lon), Some(100));

        let c = g.connection_to(n1, n2, true).unwrap();
        assert_eq!(g.data(c.data).cost_a, 100);
        assert_eq!(g.data(c.data).vehicles, 0xff);

        assert_eq!(g.external_nodes().len(), 1);
        assert_eq!(g.external_nodes()[0].item_id, 2);
        assert_eq!(g.map_at_level(1), Some(0x8000_0001));
        assert_eq!(g.neighbours().collect::<Vec<_>>(), vec![8]);
    }

    #[test]
    fn plain_tile() {
        let map = load_from_reader(TILE.as_bytes(), FileFormat::Xml).unwrap();
        check_tile(&map);
    }

    #[test]
    fn gzipped_tile() {
        let mut e = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        e.write_all(TILE.as_bytes()).unwrap();
        let data = e.finish().unwrap();

        check_tile(&load_from_reader(data.as_slice(), FileFormat::XmlGz).unwrap());
        check_tile(&load_from_reader(data.as_slice(), FileFormat::Unknown).unwrap());
    }

    #[test]
    fn bzipped_tile() {
        let mut e = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        e.write_all(TILE.as_bytes()).unwrap();
        let data = e.finish().unwrap();

        check_tile(&load_from_reader(data.as_slice(), FileFormat::Unknown).unwrap());
    }

    #[test]
    fn missing_attribute() {
        let tile = r#"<map id="1"><node id="1" lat="0"/></map>"#;
        let err = load_from_reader(tile.as_bytes(), FileFormat::Xml).unwrap_err();
        assert!(matches!(
            err,
            ReadError::MissingAttribute {
                attribute: "lon",
                ..
            }
        ));
    }

    #[test]
    fn invalid_restriction() {
        let tile = r#"<map id="1"><node id="1" lat="0" lon="0" restriction="sometimes"/></map>"#;
        let err = load_from_reader(tile.as_bytes(), FileFormat::Xml).unwrap_err();
        assert!(matches!(
            err,
            ReadError::InvalidAttribute {
                attribute: "restriction",
                ..
            }
        ));
    }

    #[test]
    fn missing_map_id() {
        let tile = r#"<node id="1" lat="0" lon="0"/>"#;
        let err = load_from_reader(tile.as_bytes(), FileFormat::Xml).unwrap_err();
        assert!(matches!(err, ReadError::MissingMapId));
    }

    #[test]
    fn structural_errors_are_passed_through() {
        let tile = r#"<map id="1">
            <node id="1" lat="0" lon="0"/>
            <connection from="1" to="9" a="1" b="1" c="1" vehicles="1"/>
        </map>"#;
        let err = load_from_reader(tile.as_bytes(), FileFormat::Xml).unwrap_err();
        assert!(matches!(err, ReadError::Load(LoadError::UnknownNode(9))));
    }
}

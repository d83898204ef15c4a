// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Export Artifact Codec
//!
//! Reader and writer for the export interchange format. The format must
//! round-trip bit-exactly at the model level:
//!
//! ```xml
//! <inventory xmlns="http://inventario.example.com/schema"
//!            exportDate="2026-03-01T10:00:00+00:00" exportType="locations">
//!   <locations>
//!     <location id="l1" name="Home"/>
//!   </locations>
//!   <areas>
//!     <area id="a1" locationId="l1" name="Garage"/>
//!   </areas>
//!   <commodities>
//!     <commodity id="c1" areaId="a1" name="Drill" shortName="Drill">
//!       <images><image id="i1" fileId="f1"/></images>
//!       <manuals/>
//!       <invoices/>
//!     </commodity>
//!   </commodities>
//!   <files>
//!     <file id="f1" path="drill.jpg" ext="jpg" mimeType="image/jpeg">
//!       <data>…base64…</data>
//!     </file>
//!   </files>
//!   <stats locationCount="1" areaCount="1" commodityCount="1"
//!          imageCount="1" invoiceCount="0" manualCount="0"
//!          binaryDataCount="1"/>
//! </inventory>
//! ```
//!
//! The parser cross-checks `<stats>` against the children it actually
//! counted and fails with `BadDataStructure` on any mismatch, so a
//! truncated or hand-edited artifact is rejected before a restore begins.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use stockroom_domain::entities::{ExportStats, ExportType};
use stockroom_domain::{DomainError, DomainResult};

/// XML namespace of the artifact root element.
pub const ARTIFACT_NAMESPACE: &str = "http://inventario.example.com/schema";

/// MIME type of a written artifact.
pub const ARTIFACT_MIME: &str = "application/xml";

fn ser_err<E: std::fmt::Display>(e: E) -> DomainError {
    DomainError::serialization(e.to_string())
}

fn bad<E: std::fmt::Display>(e: E) -> DomainError {
    DomainError::bad_data(e.to_string())
}

/// One exported location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    pub id: String,
    pub name: String,
}

/// One exported area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactArea {
    pub id: String,
    pub location_id: String,
    pub name: String,
}

/// A file reference attached to a commodity (image/manual/invoice).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub id: String,
    pub file_id: String,
}

/// One exported commodity with its attachment references.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArtifactCommodity {
    pub id: String,
    pub area_id: String,
    pub name: String,
    pub short_name: String,
    pub images: Vec<ArtifactRef>,
    pub manuals: Vec<ArtifactRef>,
    pub invoices: Vec<ArtifactRef>,
}

/// One exported file, optionally carrying its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    pub id: String,
    pub path: String,
    pub ext: String,
    pub mime_type: String,
    /// Present only when the export was written with `includeFileData`.
    pub data: Option<Vec<u8>>,
}

/// The in-memory form of an export artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub export_date: DateTime<Utc>,
    pub export_type: ExportType,
    pub locations: Vec<ArtifactLocation>,
    pub areas: Vec<ArtifactArea>,
    pub commodities: Vec<ArtifactCommodity>,
    pub files: Vec<ArtifactFile>,
}

impl Artifact {
    pub fn new(export_type: ExportType) -> Self {
        Self {
            export_date: Utc::now(),
            export_type,
            locations: Vec::new(),
            areas: Vec::new(),
            commodities: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Counts of the artifact's children; `file_size` is filled by the
    /// caller once the byte size is known.
    pub fn counts(&self) -> ExportStats {
        ExportStats {
            location_count: self.locations.len() as u32,
            area_count: self.areas.len() as u32,
            commodity_count: self.commodities.len() as u32,
            image_count: self.commodities.iter().map(|c| c.images.len() as u32).sum(),
            manual_count: self.commodities.iter().map(|c| c.manuals.len() as u32).sum(),
            invoice_count: self.commodities.iter().map(|c| c.invoices.len() as u32).sum(),
            binary_data_count: self.files.iter().filter(|f| f.data.is_some()).count() as u32,
            file_size: 0,
        }
    }

    /// Serialises the artifact to XML bytes.
    pub fn to_xml(&self) -> DomainResult<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(ser_err)?;

        let mut root = BytesStart::new("inventory");
        root.push_attribute(("xmlns", ARTIFACT_NAMESPACE));
        root.push_attribute(("exportDate", self.export_date.to_rfc3339().as_str()));
        root.push_attribute(("exportType", self.export_type.as_str()));
        writer.write_event(Event::Start(root)).map_err(ser_err)?;

        writer
            .write_event(Event::Start(BytesStart::new("locations")))
            .map_err(ser_err)?;
        for location in &self.locations {
            let mut el = BytesStart::new("location");
            el.push_attribute(("id", location.id.as_str()));
            el.push_attribute(("name", location.name.as_str()));
            writer.write_event(Event::Empty(el)).map_err(ser_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("locations")))
            .map_err(ser_err)?;

        writer
            .write_event(Event::Start(BytesStart::new("areas")))
            .map_err(ser_err)?;
        for area in &self.areas {
            let mut el = BytesStart::new("area");
            el.push_attribute(("id", area.id.as_str()));
            el.push_attribute(("locationId", area.location_id.as_str()));
            el.push_attribute(("name", area.name.as_str()));
            writer.write_event(Event::Empty(el)).map_err(ser_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("areas")))
            .map_err(ser_err)?;

        writer
            .write_event(Event::Start(BytesStart::new("commodities")))
            .map_err(ser_err)?;
        for commodity in &self.commodities {
            let mut el = BytesStart::new("commodity");
            el.push_attribute(("id", commodity.id.as_str()));
            el.push_attribute(("areaId", commodity.area_id.as_str()));
            el.push_attribute(("name", commodity.name.as_str()));
            el.push_attribute(("shortName", commodity.short_name.as_str()));
            writer.write_event(Event::Start(el)).map_err(ser_err)?;
            for (tag, item_tag, refs) in [
                ("images", "image", &commodity.images),
                ("manuals", "manual", &commodity.manuals),
                ("invoices", "invoice", &commodity.invoices),
            ] {
                writer
                    .write_event(Event::Start(BytesStart::new(tag)))
                    .map_err(ser_err)?;
                for r in refs {
                    let mut item = BytesStart::new(item_tag);
                    item.push_attribute(("id", r.id.as_str()));
                    item.push_attribute(("fileId", r.file_id.as_str()));
                    writer.write_event(Event::Empty(item)).map_err(ser_err)?;
                }
                writer
                    .write_event(Event::End(BytesEnd::new(tag)))
                    .map_err(ser_err)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("commodity")))
                .map_err(ser_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("commodities")))
            .map_err(ser_err)?;

        if !self.files.is_empty() {
            writer
                .write_event(Event::Start(BytesStart::new("files")))
                .map_err(ser_err)?;
            for file in &self.files {
                let mut el = BytesStart::new("file");
                el.push_attribute(("id", file.id.as_str()));
                el.push_attribute(("path", file.path.as_str()));
                el.push_attribute(("ext", file.ext.as_str()));
                el.push_attribute(("mimeType", file.mime_type.as_str()));
                match &file.data {
                    Some(bytes) => {
                        writer.write_event(Event::Start(el)).map_err(ser_err)?;
                        writer
                            .write_event(Event::Start(BytesStart::new("data")))
                            .map_err(ser_err)?;
                        writer
                            .write_event(Event::Text(BytesText::new(&BASE64.encode(bytes))))
                            .map_err(ser_err)?;
                        writer
                            .write_event(Event::End(BytesEnd::new("data")))
                            .map_err(ser_err)?;
                        writer
                            .write_event(Event::End(BytesEnd::new("file")))
                            .map_err(ser_err)?;
                    }
                    None => writer.write_event(Event::Empty(el)).map_err(ser_err)?,
                }
            }
            writer
                .write_event(Event::End(BytesEnd::new("files")))
                .map_err(ser_err)?;
        }

        let counts = self.counts();
        let mut stats = BytesStart::new("stats");
        stats.push_attribute(("locationCount", counts.location_count.to_string().as_str()));
        stats.push_attribute(("areaCount", counts.area_count.to_string().as_str()));
        stats.push_attribute(("commodityCount", counts.commodity_count.to_string().as_str()));
        stats.push_attribute(("imageCount", counts.image_count.to_string().as_str()));
        stats.push_attribute(("invoiceCount", counts.invoice_count.to_string().as_str()));
        stats.push_attribute(("manualCount", counts.manual_count.to_string().as_str()));
        stats.push_attribute(("binaryDataCount", counts.binary_data_count.to_string().as_str()));
        writer.write_event(Event::Empty(stats)).map_err(ser_err)?;

        writer
            .write_event(Event::End(BytesEnd::new("inventory")))
            .map_err(ser_err)?;
        Ok(writer.into_inner())
    }

    /// Parses and validates an artifact from XML bytes.
    pub fn from_xml(bytes: &[u8]) -> DomainResult<Artifact> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(true);

        let mut state = ParseState::default();
        let mut buf = Vec::new();
        loop {
            match reader
                .read_event_into(&mut buf)
                .map_err(|e| bad(format!("malformed XML: {e}")))?
            {
                Event::Start(el) => state.open_element(&el, false)?,
                Event::Empty(el) => state.open_element(&el, true)?,
                Event::Text(text) => state.text(&text)?,
                Event::End(el) => state.close_element(el.name().as_ref())?,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        state.finish()
    }
}

/// Streaming parse state for [`Artifact::from_xml`].
#[derive(Default)]
struct ParseState {
    artifact: Option<Artifact>,
    declared_stats: Option<ExportStats>,
    current_commodity: Option<ArtifactCommodity>,
    current_file: Option<ArtifactFile>,
    in_data: bool,
    ref_bucket: Option<&'static str>,
}

fn get_attr(el: &BytesStart<'_>, name: &str) -> DomainResult<Option<String>> {
    match el.try_get_attribute(name) {
        Ok(Some(a)) => Ok(Some(
            a.unescape_value()
                .map_err(|e| bad(format!("bad attribute {name}: {e}")))?
                .into_owned(),
        )),
        Ok(None) => Ok(None),
        Err(e) => Err(bad(format!("bad attribute {name}: {e}"))),
    }
}

fn require_attr(el: &BytesStart<'_>, name: &str) -> DomainResult<String> {
    get_attr(el, name)?.ok_or_else(|| bad(format!("missing attribute {name}")))
}

impl ParseState {
    fn artifact_mut(&mut self, context: &str) -> DomainResult<&mut Artifact> {
        self.artifact
            .as_mut()
            .ok_or_else(|| bad(format!("{context} outside <inventory>")))
    }

    fn open_element(&mut self, el: &BytesStart<'_>, is_empty: bool) -> DomainResult<()> {
        match el.name().as_ref() {
            b"inventory" => {
                let export_date = DateTime::parse_from_rfc3339(&require_attr(el, "exportDate")?)
                    .map_err(|e| bad(format!("bad exportDate: {e}")))?
                    .with_timezone(&Utc);
                let export_type =
                    ExportType::parse(&require_attr(el, "exportType")?).map_err(bad)?;
                self.artifact = Some(Artifact {
                    export_date,
                    export_type,
                    locations: Vec::new(),
                    areas: Vec::new(),
                    commodities: Vec::new(),
                    files: Vec::new(),
                });
            }
            b"location" => {
                let location = ArtifactLocation {
                    id: require_attr(el, "id")?,
                    name: require_attr(el, "name")?,
                };
                self.artifact_mut("location")?.locations.push(location);
            }
            b"area" => {
                let area = ArtifactArea {
                    id: require_attr(el, "id")?,
                    location_id: require_attr(el, "locationId")?,
                    name: require_attr(el, "name")?,
                };
                self.artifact_mut("area")?.areas.push(area);
            }
            b"commodity" => {
                let commodity = ArtifactCommodity {
                    id: require_attr(el, "id")?,
                    area_id: require_attr(el, "areaId")?,
                    name: require_attr(el, "name")?,
                    short_name: get_attr(el, "shortName")?.unwrap_or_default(),
                    ..Default::default()
                };
                if is_empty {
                    self.artifact_mut("commodity")?.commodities.push(commodity);
                } else {
                    self.current_commodity = Some(commodity);
                }
            }
            b"images" => self.ref_bucket = Some("images"),
            b"manuals" => self.ref_bucket = Some("manuals"),
            b"invoices" => self.ref_bucket = Some("invoices"),
            b"image" | b"manual" | b"invoice" => {
                let reference = ArtifactRef {
                    id: require_attr(el, "id")?,
                    file_id: require_attr(el, "fileId")?,
                };
                let commodity = self
                    .current_commodity
                    .as_mut()
                    .ok_or_else(|| bad("attachment outside <commodity>"))?;
                match self.ref_bucket {
                    Some("images") => commodity.images.push(reference),
                    Some("manuals") => commodity.manuals.push(reference),
                    Some("invoices") => commodity.invoices.push(reference),
                    _ => return Err(bad("attachment outside its list element")),
                }
            }
            b"file" => {
                let file = ArtifactFile {
                    id: require_attr(el, "id")?,
                    path: require_attr(el, "path")?,
                    ext: get_attr(el, "ext")?.unwrap_or_default(),
                    mime_type: require_attr(el, "mimeType")?,
                    data: None,
                };
                if is_empty {
                    self.artifact_mut("file")?.files.push(file);
                } else {
                    self.current_file = Some(file);
                }
            }
            b"data" => {
                if self.current_file.is_none() {
                    return Err(bad("<data> outside <file>"));
                }
                self.in_data = !is_empty;
            }
            b"stats" => {
                let count = |name: &str| -> DomainResult<u32> {
                    require_attr(el, name)?
                        .parse::<u32>()
                        .map_err(|e| bad(format!("bad stats attribute {name}: {e}")))
                };
                self.declared_stats = Some(ExportStats {
                    location_count: count("locationCount")?,
                    area_count: count("areaCount")?,
                    commodity_count: count("commodityCount")?,
                    image_count: count("imageCount")?,
                    invoice_count: count("invoiceCount")?,
                    manual_count: count("manualCount")?,
                    binary_data_count: count("binaryDataCount")?,
                    file_size: 0,
                });
            }
            b"locations" | b"areas" | b"commodities" | b"files" => {}
            other => {
                return Err(bad(format!(
                    "unexpected element <{}>",
                    String::from_utf8_lossy(other)
                )))
            }
        }
        Ok(())
    }

    fn text(&mut self, text: &BytesText<'_>) -> DomainResult<()> {
        if !self.in_data {
            return Ok(());
        }
        let encoded = text.unescape().map_err(|e| bad(format!("bad payload text: {e}")))?;
        let decoded = BASE64
            .decode(encoded.trim().as_bytes())
            .map_err(|e| bad(format!("bad base64 payload: {e}")))?;
        if let Some(file) = self.current_file.as_mut() {
            file.data = Some(decoded);
        }
        Ok(())
    }

    fn close_element(&mut self, name: &[u8]) -> DomainResult<()> {
        match name {
            b"commodity" => {
                let commodity = self
                    .current_commodity
                    .take()
                    .ok_or_else(|| bad("unbalanced <commodity>"))?;
                self.artifact_mut("commodity")?.commodities.push(commodity);
            }
            b"file" => {
                let file = self.current_file.take().ok_or_else(|| bad("unbalanced <file>"))?;
                self.artifact_mut("file")?.files.push(file);
            }
            b"data" => self.in_data = false,
            b"images" | b"manuals" | b"invoices" => self.ref_bucket = None,
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> DomainResult<Artifact> {
        let artifact = self.artifact.ok_or_else(|| bad("missing <inventory> root"))?;
        let declared = self.declared_stats.ok_or_else(|| bad("missing <stats> element"))?;
        let counted = artifact.counts();
        if declared != counted {
            return Err(bad(format!(
                "stats mismatch: declared {declared:?}, counted {counted:?}"
            )));
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Artifact {
        let mut artifact = Artifact::new(ExportType::Locations);
        artifact.locations.push(ArtifactLocation {
            id: "l1".into(),
            name: "Home".into(),
        });
        artifact.areas.push(ArtifactArea {
            id: "a1".into(),
            location_id: "l1".into(),
            name: "Garage".into(),
        });
        artifact.commodities.push(ArtifactCommodity {
            id: "c1".into(),
            area_id: "a1".into(),
            name: "Drill".into(),
            short_name: "Drill".into(),
            images: vec![ArtifactRef {
                id: "i1".into(),
                file_id: "f1".into(),
            }],
            ..Default::default()
        });
        artifact.files.push(ArtifactFile {
            id: "f1".into(),
            path: "drill.jpg".into(),
            ext: "jpg".into(),
            mime_type: "image/jpeg".into(),
            data: Some(vec![0xde, 0xad, 0xbe, 0xef]),
        });
        artifact
    }

    #[test]
    fn round_trip_preserves_model_and_stats() {
        let artifact = sample();
        let bytes = artifact.to_xml().unwrap();
        let parsed = Artifact::from_xml(&bytes).unwrap();
        assert_eq!(parsed, artifact);
        assert_eq!(parsed.counts(), artifact.counts());
    }

    #[test]
    fn payloads_survive_base64() {
        let bytes = sample().to_xml().unwrap();
        let parsed = Artifact::from_xml(&bytes).unwrap();
        assert_eq!(parsed.files[0].data.as_deref(), Some(&[0xde, 0xad, 0xbe, 0xef][..]));
    }

    #[test]
    fn tampered_stats_rejected() {
        let bytes = sample().to_xml().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let tampered = text.replace("commodityCount=\"1\"", "commodityCount=\"7\"");
        let err = Artifact::from_xml(tampered.as_bytes()).unwrap_err();
        assert!(matches!(err, DomainError::BadDataStructure(_)));
    }

    #[test]
    fn missing_stats_rejected() {
        let xml = format!(
            "<inventory xmlns=\"{ARTIFACT_NAMESPACE}\" exportDate=\"2026-03-01T10:00:00+00:00\" \
             exportType=\"locations\"><locations/></inventory>"
        );
        let err = Artifact::from_xml(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, DomainError::BadDataStructure(_)));
    }

    #[test]
    fn unknown_export_type_rejected() {
        let xml = format!(
            "<inventory xmlns=\"{ARTIFACT_NAMESPACE}\" exportDate=\"2026-03-01T10:00:00+00:00\" \
             exportType=\"sideways\"><stats locationCount=\"0\" areaCount=\"0\" commodityCount=\"0\" \
             imageCount=\"0\" invoiceCount=\"0\" manualCount=\"0\" binaryDataCount=\"0\"/></inventory>"
        );
        assert!(Artifact::from_xml(xml.as_bytes()).is_err());
    }

    #[test]
    fn export_without_payloads_has_zero_binary_count() {
        let mut artifact = sample();
        artifact.files[0].data = None;
        let parsed = Artifact::from_xml(&artifact.to_xml().unwrap()).unwrap();
        assert_eq!(parsed.counts().binary_data_count, 0);
        assert_eq!(parsed.files[0].data, None);
    }
}

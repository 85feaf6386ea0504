//! Zip container access and Open Packaging Conventions plumbing:
//! content types, relationships and part-name resolution.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::ZipArchive;

use crate::error::{Result, ScrubError};

/// Maximum uncompressed size accepted for any single part.
pub(crate) const MAX_PART_BYTES: u64 = 256 * 1024 * 1024;

pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub(crate) const WORKSHEET_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
pub(crate) const SHARED_STRINGS_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";
const SHARED_STRINGS_REL_TYPE_SUFFIX: &str = "/sharedStrings";

/// Read-only view of the zip entries of a package.
pub(crate) struct Package<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    // canonical part name -> actual entry name
    names: HashMap<String, String>,
}

impl<'a> Package<'a> {
    pub(crate) fn open(bytes: &'a [u8]) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes))?;
        let names = archive
            .file_names()
            .map(|name| (canonical_part_name(name), name.to_string()))
            .collect();
        Ok(Package { archive, names })
    }

    /// The entry name as stored in the zip for a (possibly `/`-prefixed,
    /// differently cased) part name.
    pub(crate) fn entry_name(&self, part: &str) -> Option<&str> {
        self.names.get(&canonical_part_name(part)).map(String::as_str)
    }

    pub(crate) fn read_part(&mut self, part: &str) -> Result<Vec<u8>> {
        let entry = self
            .entry_name(part)
            .ok_or_else(|| ScrubError::MissingPart(part.to_string()))?
            .to_string();
        let file = self.archive.by_name(&entry)?;
        if file.size() > MAX_PART_BYTES {
            return Err(ScrubError::PartTooLarge {
                part: entry,
                size: file.size(),
                max: MAX_PART_BYTES,
            });
        }

        // The declared size can lie, so cap the actual read as well.
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.take(MAX_PART_BYTES + 1).read_to_end(&mut buf)?;
        if buf.len() as u64 > MAX_PART_BYTES {
            return Err(ScrubError::PartTooLarge {
                part: entry,
                size: buf.len() as u64,
                max: MAX_PART_BYTES,
            });
        }
        Ok(buf)
    }

    pub(crate) fn read_part_optional(&mut self, part: &str) -> Result<Option<Vec<u8>>> {
        if self.entry_name(part).is_none() {
            return Ok(None);
        }
        self.read_part(part).map(Some)
    }
}

/// Lowercased, without leading separators, `\` folded to `/`.
pub(crate) fn canonical_part_name(name: &str) -> String {
    name.trim_start_matches(['/', '\\'])
        .replace('\\', "/")
        .to_ascii_lowercase()
}

/// `[Content_Types].xml` overrides keyed by part name (no leading `/`).
#[derive(Debug, Default)]
pub(crate) struct ContentTypes {
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    pub(crate) fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(false);
        let mut overrides = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Override" => {
                    let part = attr_value(&e, b"PartName")?;
                    let content_type = attr_value(&e, b"ContentType")?;
                    if let (Some(part), Some(content_type)) = (part, content_type) {
                        overrides.push((
                            part.trim_start_matches('/').to_string(),
                            content_type.trim().to_string(),
                        ));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(ContentTypes { overrides })
    }

    pub(crate) fn parts_of_type<'s>(
        &'s self,
        content_type: &'s str,
    ) -> impl Iterator<Item = &'s str> + 's {
        self.overrides
            .iter()
            .filter(move |(_, ct)| ct.eq_ignore_ascii_case(content_type))
            .map(|(part, _)| part.as_str())
    }

    /// The main workbook part: regular, macro-enabled or template.
    pub(crate) fn workbook_part(&self) -> Option<&str> {
        self.overrides
            .iter()
            .find(|(_, ct)| {
                let ct = ct.to_ascii_lowercase();
                ct.ends_with(".main+xml")
                    && (ct.contains("spreadsheetml") || ct.contains("ms-excel"))
            })
            .map(|(part, _)| part.as_str())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Relationship {
    pub(crate) id: String,
    pub(crate) rel_type: String,
    pub(crate) target: String,
    pub(crate) external: bool,
}

pub(crate) fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut rels = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let (Some(id), Some(target)) = (attr_value(&e, b"Id")?, attr_value(&e, b"Target")?)
                else {
                    continue;
                };
                let rel_type = attr_value(&e, b"Type")?.unwrap_or_default();
                let external = attr_value(&e, b"TargetMode")?
                    .is_some_and(|mode| mode.eq_ignore_ascii_case("External"));
                rels.push(Relationship {
                    id,
                    rel_type,
                    target,
                    external,
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(rels)
}

pub(crate) fn is_shared_strings_rel(rel: &Relationship) -> bool {
    rel.rel_type.ends_with(SHARED_STRINGS_REL_TYPE_SUFFIX)
}

/// `xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`
pub(crate) fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against the part that owns the
/// relationship. Absolute targets start from the package root.
pub(crate) fn resolve_target(source_part: &str, target: &str) -> String {
    let target = target.split('#').next().unwrap_or_default().replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();

    if !target.starts_with('/') {
        if let Some((dir, _)) = source_part.rsplit_once('/') {
            segments.extend(dir.split('/').filter(|s| !s.is_empty()));
        }
    }

    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Unescaped value of the attribute whose local name is `key`.
pub(crate) fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes().with_checks(false) {
        let attr = attr?;
        if attr.key.local_name().as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_and_absolute_targets() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(
            resolve_target("xl/workbook.xml", "/xl/worksheets/sheet2.xml"),
            "xl/worksheets/sheet2.xml"
        );
        assert_eq!(
            resolve_target("xl/workbook.xml", "./../xl/sharedStrings.xml"),
            "xl/sharedStrings.xml"
        );
    }

    #[test]
    fn rels_part_sits_next_to_its_source() {
        assert_eq!(rels_part_for("xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
        assert_eq!(rels_part_for("workbook.xml"), "_rels/workbook.xml.rels");
    }

    #[test]
    fn canonical_names_ignore_case_and_leading_separators() {
        assert_eq!(canonical_part_name("/XL/Workbook.xml"), "xl/workbook.xml");
        assert_eq!(canonical_part_name("xl\\worksheets\\a.xml"), "xl/worksheets/a.xml");
    }

    #[test]
    fn content_types_find_workbook_and_worksheets() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/xl/workbook.xml" ContentType="application/vnd.ms-excel.sheet.macroEnabled.main+xml"/>
  <Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
  <Override PartName="/xl/chartsheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.chartsheet+xml"/>
</Types>"#;
        let types = ContentTypes::parse(xml).unwrap();
        assert_eq!(types.workbook_part(), Some("xl/workbook.xml"));
        let sheets: Vec<_> = types.parts_of_type(WORKSHEET_CONTENT_TYPE).collect();
        assert_eq!(sheets, vec!["xl/worksheets/sheet1.xml"]);
    }

    #[test]
    fn relationships_keep_ids_types_and_mode() {
        let xml = br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>
  <Relationship Id="rId3" Type="http://example.com/link" Target="https://example.com" TargetMode="External"/>
</Relationships>"#;
        let rels = parse_relationships(xml).unwrap();
        assert_eq!(rels.len(), 3);
        assert_eq!(rels[0].id, "rId1");
        assert!(is_shared_strings_rel(&rels[1]));
        assert!(rels[2].external);
    }
}

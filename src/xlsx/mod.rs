//! Part-preserving `.xlsx` codec.
//!
//! Decoding reads the package into a [`Workbook`] while remembering where
//! every cell lives in its worksheet XML. Encoding copies every zip entry
//! raw except the parts whose text actually changed, and within those parts
//! only the affected `<si>` / `<c>` elements are regenerated. Styles,
//! formulas, drawings and every other part survive byte for byte.

mod package;
mod shared_strings;
mod text;
mod worksheet;

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Write};

use log::debug;
use quick_xml::Reader;
use quick_xml::events::Event;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::cell::CellValue;
use crate::error::{Result, ScrubError};
use crate::workbook::{Sheet, Workbook};
use package::{
    CONTENT_TYPES_PART, ContentTypes, Package, SHARED_STRINGS_CONTENT_TYPE,
    WORKSHEET_CONTENT_TYPE, attr_value, canonical_part_name, is_shared_strings_rel,
    parse_relationships, rels_part_for, resolve_target,
};
use shared_strings::SharedStringsPart;
use text::splice;
use worksheet::{TextSource, WorksheetPart};

/// MIME type of an `.xlsx` workbook.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A decoded workbook that can be written back into its original package.
#[derive(Debug, Clone)]
pub struct XlsxDocument {
    source: Vec<u8>,
    workbook: Workbook,
    shared_strings: Option<SharedStringsPart>,
    // parallel to `workbook.sheets()`
    worksheets: Vec<WorksheetPart>,
}

enum SharedResolution {
    Agreed(String),
    Conflict,
}

impl XlsxDocument {
    /// Decode an `.xlsx` package.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let source = bytes.into();
        let (workbook, shared_strings, worksheets) = decode(&source)?;
        Ok(XlsxDocument {
            source,
            workbook,
            shared_strings,
            worksheets,
        })
    }

    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    /// Mutable view of the cell grid. Only text values may be changed;
    /// anything else is rejected by [`XlsxDocument::to_bytes`].
    pub fn workbook_mut(&mut self) -> &mut Workbook {
        &mut self.workbook
    }

    /// Encode the document, rewriting only the parts whose text changed.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let rewritten = self.rewritten_parts()?;
        if rewritten.is_empty() {
            return Ok(self.source.clone());
        }

        let mut archive = ZipArchive::new(Cursor::new(self.source.as_slice()))?;
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

        for i in 0..archive.len() {
            let file = archive.by_index_raw(i)?;
            let name = file.name().to_string();
            match rewritten.get(&name) {
                Some(bytes) => {
                    zip.start_file(name, options)?;
                    zip.write_all(bytes)?;
                }
                None => zip.raw_copy_file(file)?,
            }
        }

        Ok(zip.finish()?.into_inner())
    }

    /// Zip entry name -> new bytes, for every part that needs rewriting.
    fn rewritten_parts(&self) -> Result<HashMap<String, Vec<u8>>> {
        self.check_edits()?;

        let mut resolutions: BTreeMap<usize, SharedResolution> = BTreeMap::new();
        for (sheet, part) in self.workbook.sheets().iter().zip(&self.worksheets) {
            for (cell, slot) in sheet.cells().iter().zip(&part.slots) {
                let (Some(TextSource::Shared(idx)), Some(text)) = (slot.source, cell.value.as_text())
                else {
                    continue;
                };
                resolutions
                    .entry(idx)
                    .and_modify(|existing| {
                        if let SharedResolution::Agreed(agreed) = existing {
                            if agreed.as_str() != text {
                                *existing = SharedResolution::Conflict;
                            }
                        }
                    })
                    .or_insert_with(|| SharedResolution::Agreed(text.to_string()));
            }
        }

        let mut out = HashMap::new();
        let entry_names = self.entry_names()?;

        if let Some(sst) = &self.shared_strings {
            let mut replacements = BTreeMap::new();
            for (&idx, resolution) in &resolutions {
                let (SharedResolution::Agreed(text), Some(item)) = (resolution, sst.get(idx)) else {
                    continue;
                };
                if item.text != *text {
                    if item.rich {
                        debug!("{}: flattening rich text item {}", sst.part, idx);
                    }
                    replacements.insert(idx, text.clone());
                }
            }
            if !replacements.is_empty() {
                out.insert(entry_name(&entry_names, &sst.part), sst.rewrite(&replacements)?);
            }
        }

        for (sheet, part) in self.workbook.sheets().iter().zip(&self.worksheets) {
            let mut splices = Vec::new();
            for (cell, slot) in sheet.cells().iter().zip(&part.slots) {
                let Some(text) = cell.value.as_text() else {
                    continue;
                };
                let inline = match slot.source {
                    Some(TextSource::Inline) => slot.original.as_text() != Some(text),
                    Some(TextSource::Shared(idx)) => {
                        matches!(resolutions.get(&idx), Some(SharedResolution::Conflict))
                            && slot.original.as_text() != Some(text)
                    }
                    None => false,
                };
                if inline {
                    splices.push((slot.span.clone(), slot.inline_string_xml(text)?));
                }
            }
            if !splices.is_empty() {
                out.insert(entry_name(&entry_names, &part.part), splice(&part.xml, splices));
            }
        }

        Ok(out)
    }

    /// Reject grid edits the package cannot express without a full rewrite.
    fn check_edits(&self) -> Result<()> {
        let sheets = self.workbook.sheets();
        if sheets.len() != self.worksheets.len() {
            return Err(ScrubError::UnsupportedEdit(
                "sheets were added or removed".into(),
            ));
        }
        for (sheet, part) in sheets.iter().zip(&self.worksheets) {
            check_sheet(sheet, part)?;
        }
        Ok(())
    }

    fn entry_names(&self) -> Result<HashMap<String, String>> {
        let archive = ZipArchive::new(Cursor::new(self.source.as_slice()))?;
        Ok(archive
            .file_names()
            .map(|name| (canonical_part_name(name), name.to_string()))
            .collect())
    }
}

fn check_sheet(sheet: &Sheet, part: &WorksheetPart) -> Result<()> {
    if sheet.len() != part.slots.len() {
        return Err(ScrubError::UnsupportedEdit(format!(
            "cells were added or removed in sheet '{}'",
            sheet.name()
        )));
    }
    for (cell, slot) in sheet.cells().iter().zip(&part.slots) {
        if (cell.row, cell.col) != (slot.row, slot.col) {
            return Err(ScrubError::UnsupportedEdit(format!(
                "cell {} was moved in sheet '{}'",
                cell.name(),
                sheet.name()
            )));
        }
        let unchanged = match (&slot.original, &cell.value) {
            (CellValue::Text(_), value) => value.is_text(),
            // bitwise, so a stored NaN still matches itself
            (CellValue::Number(a), CellValue::Number(b)) => a.to_bits() == b.to_bits(),
            (original, value) => value == original,
        };
        if !unchanged {
            return Err(ScrubError::UnsupportedEdit(format!(
                "only text can be edited, but {} in sheet '{}' changed",
                cell.name(),
                sheet.name()
            )));
        }
    }
    Ok(())
}

fn entry_name(entries: &HashMap<String, String>, part: &str) -> String {
    entries
        .get(&canonical_part_name(part))
        .cloned()
        .unwrap_or_else(|| part.to_string())
}

type Decoded = (Workbook, Option<SharedStringsPart>, Vec<WorksheetPart>);

fn decode(source: &[u8]) -> Result<Decoded> {
    let mut package = Package::open(source)?;

    let content_types = ContentTypes::parse(&package.read_part(CONTENT_TYPES_PART)?)?;
    let workbook_part = match content_types.workbook_part() {
        Some(part) => part.to_string(),
        None => {
            return Err(ScrubError::MissingPart(
                "workbook (no spreadsheet main part in [Content_Types].xml)".into(),
            ));
        }
    };
    let workbook_xml = package.read_part(&workbook_part)?;
    let rels = match package.read_part_optional(&rels_part_for(&workbook_part))? {
        Some(xml) => parse_relationships(&xml)?,
        None => Vec::new(),
    };

    // Shared strings: the relationship wins, the content type is the fallback.
    let shared_part = rels
        .iter()
        .find(|rel| is_shared_strings_rel(rel) && !rel.external)
        .map(|rel| resolve_target(&workbook_part, &rel.target))
        .or_else(|| {
            content_types
                .parts_of_type(SHARED_STRINGS_CONTENT_TYPE)
                .next()
                .map(str::to_string)
        });
    let shared_strings = match shared_part {
        Some(part) => match package.read_part_optional(&part)? {
            Some(xml) => Some(SharedStringsPart::parse(part, xml)?),
            None => None,
        },
        None => None,
    };

    let rel_targets: HashMap<&str, String> = rels
        .iter()
        .filter(|rel| !rel.external)
        .map(|rel| (rel.id.as_str(), resolve_target(&workbook_part, &rel.target)))
        .collect();
    let worksheet_parts: Vec<String> = content_types
        .parts_of_type(WORKSHEET_CONTENT_TYPE)
        .map(str::to_string)
        .collect();

    // Workbook order first, then any worksheet the workbook does not list.
    let mut ordered: Vec<(String, String)> = Vec::new();
    for (name, rel_id) in sheet_entries(&workbook_xml)? {
        let Some(target) = rel_targets.get(rel_id.as_str()) else {
            continue;
        };
        let canonical = canonical_part_name(target);
        if let Some(part) = worksheet_parts
            .iter()
            .find(|p| canonical_part_name(p) == canonical)
        {
            ordered.push((name, part.clone()));
        }
    }
    for part in &worksheet_parts {
        if !ordered.iter().any(|(_, p)| p == part) {
            ordered.push((part.clone(), part.clone()));
        }
    }

    let mut sheets = Vec::with_capacity(ordered.len());
    let mut worksheets = Vec::with_capacity(ordered.len());
    for (name, part) in ordered {
        let xml = package.read_part(&part)?;
        let (worksheet, cells) = WorksheetPart::parse(part, xml, shared_strings.as_ref())?;
        sheets.push(Sheet::with_cells(name, cells));
        worksheets.push(worksheet);
    }

    Ok((Workbook::from_sheets(sheets), shared_strings, worksheets))
}

/// `(name, relationship id)` of every `<sheet>` in `workbook.xml`.
fn sheet_entries(xml: &[u8]) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut out = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                if let (Some(name), Some(id)) = (attr_value(&e, b"name")?, attr_value(&e, b"id")?)
                {
                    out.push((name, id));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

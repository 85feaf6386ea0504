use std::borrow::Cow;
use std::ops::Range;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};

use super::shared_strings::SharedStringsPart;
use super::text::{markup_start, prefix_of, read_string_item, read_text, write_plain_text};
use crate::cell::{Cell, CellValue, parse_cell_name};
use crate::error::{Result, ScrubError};

/// Where a text cell's content lives in the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextSource {
    Shared(usize),
    Inline,
}

/// Location and original state of one `<c>` element.
#[derive(Debug, Clone)]
pub(crate) struct CellSlot {
    pub(crate) row: u32,
    pub(crate) col: u32,
    pub(crate) span: Range<usize>,
    pub(crate) original: CellValue,
    pub(crate) source: Option<TextSource>,
    qname: String,
    // raw (still escaped) attributes of the start tag
    attrs: Vec<(String, String)>,
}

impl CellSlot {
    /// The element rewritten as an inline string cell holding `text`.
    /// Style and any other attributes are carried over.
    pub(crate) fn inline_string_xml(&self, text: &str) -> Result<Vec<u8>> {
        let prefix = prefix_of(&self.qname);
        let mut start = BytesStart::new(self.qname.as_str());
        for (key, value) in &self.attrs {
            if key == "t" {
                continue;
            }
            start.push_attribute(Attribute {
                key: QName(key.as_bytes()),
                value: Cow::Borrowed(value.as_bytes()),
            });
        }
        start.push_attribute(("t", "inlineStr"));

        let is = format!("{prefix}is");
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Start(start))?;
        writer.write_event(Event::Start(BytesStart::new(is.as_str())))?;
        write_plain_text(&mut writer, prefix, text)?;
        writer.write_event(Event::End(BytesEnd::new(is.as_str())))?;
        writer.write_event(Event::End(BytesEnd::new(self.qname.as_str())))?;
        Ok(writer.into_inner())
    }
}

/// A decoded worksheet part: original bytes plus one slot per cell.
#[derive(Debug, Clone)]
pub(crate) struct WorksheetPart {
    pub(crate) part: String,
    pub(crate) xml: Vec<u8>,
    pub(crate) slots: Vec<CellSlot>,
}

#[derive(Default)]
struct CellBody {
    value: Option<String>,
    formula: Option<String>,
    inline: Option<String>,
}

impl WorksheetPart {
    pub(crate) fn parse(
        part: String,
        xml: Vec<u8>,
        shared: Option<&SharedStringsPart>,
    ) -> Result<(Self, Vec<Cell>)> {
        let (slots, cells) = parse_cells(&part, &xml, shared)?;
        Ok((WorksheetPart { part, xml, slots }, cells))
    }
}

fn parse_cells(
    part: &str,
    xml: &[u8],
    shared: Option<&SharedStringsPart>,
) -> Result<(Vec<CellSlot>, Vec<Cell>)> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut slots = Vec::new();
    let mut cells = Vec::new();
    let mut in_sheet_data = false;
    let mut next_row: u32 = 0;
    let mut current_row: u32 = 0;
    let mut next_col: u32 = 0;

    loop {
        let before = reader.buffer_position() as usize;
        let (e, empty) = match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                in_sheet_data = true;
                continue;
            }
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => {
                in_sheet_data = false;
                continue;
            }
            Event::Start(e) | Event::Empty(e)
                if in_sheet_data && e.local_name().as_ref() == b"row" =>
            {
                current_row = match attr_raw(&e, b"r")? {
                    Some(r) => r
                        .trim()
                        .parse::<u32>()
                        .ok()
                        .and_then(|r| r.checked_sub(1))
                        .ok_or_else(|| invalid(part, format!("bad row number '{r}'")))?,
                    None => next_row,
                };
                next_row = current_row + 1;
                next_col = 0;
                continue;
            }
            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"c" => (e, false),
            Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"c" => (e, true),
            Event::Eof => break,
            _ => continue,
        };

        let qname = std::str::from_utf8(e.name().as_ref())?.to_string();
        let mut attrs = Vec::new();
        for attr in e.attributes().with_checks(false) {
            let attr = attr?;
            attrs.push((
                std::str::from_utf8(attr.key.as_ref())?.to_string(),
                std::str::from_utf8(&attr.value)?.to_string(),
            ));
        }
        let find = |key: &str| {
            attrs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        let (row, col) = match find("r") {
            Some(r) => parse_cell_name(r)
                .ok_or_else(|| invalid(part, format!("bad cell reference '{r}'")))?,
            None => (current_row, next_col),
        };
        next_col = col + 1;
        let cell_type = find("t").map(str::to_string);

        let body = if empty {
            CellBody::default()
        } else {
            read_cell_body(&mut reader)?
        };
        let end = reader.buffer_position() as usize;

        let (value, source) = decode_value(part, cell_type.as_deref(), body, shared, row, col)?;
        slots.push(CellSlot {
            row,
            col,
            span: markup_start(xml, before)..end,
            original: value.clone(),
            source,
            qname,
            attrs,
        });
        cells.push(Cell::new(row, col, value));
    }

    Ok((slots, cells))
}

fn read_cell_body(reader: &mut Reader<&[u8]>) -> Result<CellBody> {
    let mut body = CellBody::default();
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"v" => body.value = Some(read_text(reader, b"v")?),
                b"f" => body.formula = Some(read_text(reader, b"f")?),
                b"is" => body.inline = Some(read_string_item(reader, b"is")?.0),
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"v" => body.value = Some(String::new()),
                b"f" => body.formula = Some(String::new()),
                b"is" => body.inline = Some(String::new()),
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"c" => break,
            Event::Eof => return Err(ScrubError::Invalid("unexpected eof in <c>".into())),
            _ => {}
        }
    }
    Ok(body)
}

fn decode_value(
    part: &str,
    cell_type: Option<&str>,
    body: CellBody,
    shared: Option<&SharedStringsPart>,
    row: u32,
    col: u32,
) -> Result<(CellValue, Option<TextSource>)> {
    if let Some(formula) = body.formula {
        return Ok((CellValue::Other(format!("={formula}")), None));
    }

    let value = body.value.map(|v| v.trim().to_string());
    let decoded = match cell_type {
        Some("s") => {
            let Some(raw) = value.filter(|v| !v.is_empty()) else {
                return Ok((CellValue::Empty, None));
            };
            let idx = raw.parse::<usize>().map_err(|_| {
                invalid(part, format!("bad shared string index '{raw}' at {}", at(row, col)))
            })?;
            let item = shared.and_then(|sst| sst.get(idx)).ok_or_else(|| {
                invalid(
                    part,
                    format!("shared string index {idx} out of range at {}", at(row, col)),
                )
            })?;
            return Ok((
                CellValue::Text(item.text.clone()),
                Some(TextSource::Shared(idx)),
            ));
        }
        Some("inlineStr") => match body.inline {
            Some(text) => return Ok((CellValue::Text(text), Some(TextSource::Inline))),
            None => CellValue::Empty,
        },
        Some("b") => match value.as_deref() {
            Some("1") | Some("true") => CellValue::Boolean(true),
            Some("0") | Some("false") => CellValue::Boolean(false),
            Some("") | None => CellValue::Empty,
            Some(other) => CellValue::Other(other.to_string()),
        },
        Some("e") | Some("str") | Some("d") => match value {
            Some(v) => CellValue::Other(v),
            None => CellValue::Empty,
        },
        _ => match value {
            Some(v) if !v.is_empty() => match v.parse::<f64>() {
                Ok(n) => CellValue::Number(n),
                Err(_) => CellValue::Other(v),
            },
            _ => CellValue::Empty,
        },
    };
    Ok((decoded, None))
}

fn attr_raw(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes().with_checks(false) {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(std::str::from_utf8(&attr.value)?.to_string()));
        }
    }
    Ok(None)
}

fn at(row: u32, col: u32) -> String {
    crate::cell::cell_name(row, col)
}

fn invalid(part: &str, message: String) -> ScrubError {
    ScrubError::Invalid(format!("{part}: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SST: &str = r#"<sst><si><t>[a] shared</t></si><si><t>plain</t></si></sst>"#;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="s" s="3"><v>0</v></c><c r="B1"><v>42</v></c><c r="C1" t="b"><v>1</v></c><c r="D1" s="2"/></row><row r="3"><c t="inlineStr"><is><t> [x] inline</t></is></c><c><f>SUM(B1:B2)</f><v>42</v></c><c t="e"><v>#N/A</v></c><c t="str"><f>A1</f><v>x</v></c></row></sheetData></worksheet>"#;

    fn parse() -> (WorksheetPart, Vec<Cell>) {
        let sst = SharedStringsPart::parse("xl/sharedStrings.xml".into(), SST.into()).unwrap();
        WorksheetPart::parse("xl/worksheets/sheet1.xml".into(), SHEET.into(), Some(&sst)).unwrap()
    }

    #[test]
    fn decodes_every_cell_kind() {
        let (_, cells) = parse();
        let values: Vec<_> = cells.iter().map(|c| (c.name(), c.value.clone())).collect();
        assert_eq!(
            values,
            vec![
                ("A1".to_string(), CellValue::Text("[a] shared".into())),
                ("B1".to_string(), CellValue::Number(42.0)),
                ("C1".to_string(), CellValue::Boolean(true)),
                ("D1".to_string(), CellValue::Empty),
                ("A3".to_string(), CellValue::Text(" [x] inline".into())),
                ("B3".to_string(), CellValue::Other("=SUM(B1:B2)".into())),
                ("C3".to_string(), CellValue::Other("#N/A".into())),
                ("D3".to_string(), CellValue::Other("=A1".into())),
            ]
        );
    }

    #[test]
    fn slots_cover_whole_cell_elements() {
        let (part, _) = parse();
        let a1 = &part.slots[0];
        assert_eq!(
            &part.xml[a1.span.clone()],
            br#"<c r="A1" t="s" s="3"><v>0</v></c>"#
        );
        assert_eq!(a1.source, Some(TextSource::Shared(0)));
        let d1 = &part.slots[3];
        assert_eq!(&part.xml[d1.span.clone()], br#"<c r="D1" s="2"/>"#);
        assert_eq!(part.slots[4].source, Some(TextSource::Inline));
    }

    #[test]
    fn inline_rewrite_keeps_style_and_reference() {
        let (part, _) = parse();
        let xml = part.slots[0].inline_string_xml("shared").unwrap();
        assert_eq!(
            String::from_utf8(xml).unwrap(),
            r#"<c r="A1" s="3" t="inlineStr"><is><t>shared</t></is></c>"#
        );
    }

    #[test]
    fn out_of_range_shared_index_is_rejected() {
        let sheet = r#"<worksheet><sheetData><row><c t="s"><v>9</v></c></row></sheetData></worksheet>"#;
        let sst = SharedStringsPart::parse("sst".into(), SST.into()).unwrap();
        let err = WorksheetPart::parse("sheet".into(), sheet.into(), Some(&sst)).unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
    }

    #[test]
    fn shared_cells_without_a_table_are_rejected() {
        let sheet = r#"<worksheet><sheetData><row><c t="s"><v>0</v></c></row></sheetData></worksheet>"#;
        assert!(WorksheetPart::parse("sheet".into(), sheet.into(), None).is_err());
    }
}

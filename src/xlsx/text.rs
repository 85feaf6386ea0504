//! Reading and writing SpreadsheetML string runs (`<t>`, `<r>`, `<rPh>`).

use std::ops::Range;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Result, ScrubError};

/// Concatenate character data up to the end tag with local name `end`.
pub(crate) fn read_text(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<String> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::CData(e) => text.push_str(std::str::from_utf8(e.as_ref())?),
            Event::End(e) if e.local_name().as_ref() == end => break,
            Event::Eof => {
                return Err(ScrubError::Invalid(format!(
                    "unexpected eof in <{}>",
                    String::from_utf8_lossy(end)
                )));
            }
            _ => {}
        }
    }
    Ok(text)
}

/// Visible text of a string item (`<si>` or `<is>`): direct `<t>` children
/// and `<r><t>` runs. Phonetic runs and extensions are skipped.
///
/// Returns the text and whether it was split into formatted runs.
pub(crate) fn read_string_item(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<(String, bool)> {
    let mut text = String::new();
    let mut rich = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => {
                text.push_str(&read_text(reader, b"t")?);
            }
            Event::Start(e) if e.local_name().as_ref() == b"r" => {
                rich = true;
                text.push_str(&read_run(reader)?);
            }
            Event::Start(e) => {
                reader.read_to_end(e.name())?;
            }
            Event::End(e) if e.local_name().as_ref() == end => break,
            Event::Eof => {
                return Err(ScrubError::Invalid(format!(
                    "unexpected eof in <{}>",
                    String::from_utf8_lossy(end)
                )));
            }
            _ => {}
        }
    }

    Ok((text, rich))
}

fn read_run(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => {
                text.push_str(&read_text(reader, b"t")?);
            }
            Event::Start(e) => {
                reader.read_to_end(e.name())?;
            }
            Event::End(e) if e.local_name().as_ref() == b"r" => break,
            Event::Eof => return Err(ScrubError::Invalid("unexpected eof in <r>".into())),
            _ => {}
        }
    }
    Ok(text)
}

/// `x:si` -> `x:`, `si` -> ``
pub(crate) fn prefix_of(qname: &str) -> &str {
    match qname.find(':') {
        Some(idx) => &qname[..=idx],
        None => "",
    }
}

/// Write `<{prefix}t>text</{prefix}t>`, preserving whitespace when needed.
pub(crate) fn write_plain_text(writer: &mut Writer<Vec<u8>>, prefix: &str, text: &str) -> Result<()> {
    let t_name = format!("{prefix}t");
    let mut start = BytesStart::new(t_name.as_str());
    if needs_space_preserve(text) {
        start.push_attribute(("xml:space", "preserve"));
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(t_name.as_str())))?;
    Ok(())
}

fn needs_space_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace)
        || text.ends_with(char::is_whitespace)
        || text.contains(['\n', '\t'])
        || text.contains("  ")
}

/// Offset of the `<` opening the element read right after `pos`.
///
/// Depending on the preceding event the reader may or may not have already
/// consumed the `<`.
pub(crate) fn markup_start(source: &[u8], pos: usize) -> usize {
    if source.get(pos) == Some(&b'<') {
        pos
    } else if pos > 0 && source.get(pos - 1) == Some(&b'<') {
        pos - 1
    } else {
        pos
    }
}

/// Replace byte ranges of `source` with new content. `splices` must not
/// overlap.
pub(crate) fn splice(source: &[u8], mut splices: Vec<(Range<usize>, Vec<u8>)>) -> Vec<u8> {
    splices.sort_by_key(|(range, _)| range.start);
    let mut out = Vec::with_capacity(source.len());
    let mut cursor = 0;
    for (range, replacement) in splices {
        out.extend_from_slice(&source[cursor..range.start]);
        out.extend_from_slice(&replacement);
        cursor = range.end;
    }
    out.extend_from_slice(&source[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(xml: &str) -> (String, bool) {
        let mut reader = Reader::from_str(xml);
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) if e.local_name().as_ref() == b"si" => {
                    return read_string_item(&mut reader, b"si").unwrap();
                }
                Event::Eof => panic!("no <si>"),
                _ => {}
            }
        }
    }

    #[test]
    fn reads_plain_and_rich_items() {
        assert_eq!(item("<si><t>a &amp; b</t></si>"), ("a & b".to_string(), false));
        assert_eq!(
            item("<si><r><rPr><b/></rPr><t>bold</t></r><r><t xml:space=\"preserve\"> [x]</t></r></si>"),
            ("bold [x]".to_string(), true)
        );
    }

    #[test]
    fn phonetic_runs_are_not_visible_text() {
        assert_eq!(
            item("<si><t>Base</t><rPh sb=\"0\" eb=\"4\"><t>PHO</t></rPh><phoneticPr fontId=\"0\"/></si>"),
            ("Base".to_string(), false)
        );
    }

    #[test]
    fn character_references_are_decoded() {
        assert_eq!(item("<si><t>A&#160;B</t></si>").0, "A\u{A0}B");
    }

    #[test]
    fn writes_escaped_text_with_space_preserve() {
        let mut writer = Writer::new(Vec::new());
        write_plain_text(&mut writer, "", " a<b ").unwrap();
        let xml = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(xml, "<t xml:space=\"preserve\"> a&lt;b </t>");

        let mut writer = Writer::new(Vec::new());
        write_plain_text(&mut writer, "x:", "plain").unwrap();
        assert_eq!(String::from_utf8(writer.into_inner()).unwrap(), "<x:t>plain</x:t>");
    }

    #[test]
    fn markup_start_finds_the_opening_bracket() {
        let xml = b"<a> <b/></a>";
        assert_eq!(markup_start(xml, 4), 4);
        assert_eq!(markup_start(xml, 5), 4);
    }

    #[test]
    fn splice_replaces_ranges_in_order() {
        let out = splice(b"0123456789", vec![(6..8, b"X".to_vec()), (1..3, b"ab".to_vec())]);
        assert_eq!(out, b"0ab345X89");
    }
}

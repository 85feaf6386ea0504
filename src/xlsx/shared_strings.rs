use std::collections::BTreeMap;
use std::ops::Range;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use super::text::{markup_start, prefix_of, read_string_item, splice, write_plain_text};
use crate::error::Result;

#[derive(Debug, Clone)]
pub(crate) struct SharedString {
    pub(crate) text: String,
    pub(crate) rich: bool,
    span: Range<usize>,
    prefix: String,
}

/// The parsed `sharedStrings.xml` part together with its original bytes.
#[derive(Debug, Clone)]
pub(crate) struct SharedStringsPart {
    pub(crate) part: String,
    xml: Vec<u8>,
    pub(crate) items: Vec<SharedString>,
}

impl SharedStringsPart {
    pub(crate) fn parse(part: String, xml: Vec<u8>) -> Result<Self> {
        let items = parse_items(&xml)?;
        Ok(SharedStringsPart { part, xml, items })
    }

    pub(crate) fn get(&self, idx: usize) -> Option<&SharedString> {
        self.items.get(idx)
    }

    /// Rewrite the given items as plain text; every other byte is kept.
    ///
    /// Replaced rich items lose their run formatting.
    pub(crate) fn rewrite(&self, replacements: &BTreeMap<usize, String>) -> Result<Vec<u8>> {
        let mut splices = Vec::with_capacity(replacements.len());
        for (&idx, text) in replacements {
            let Some(item) = self.items.get(idx) else {
                continue;
            };
            let mut writer = Writer::new(Vec::new());
            let si = format!("{}si", item.prefix);
            writer.write_event(Event::Start(BytesStart::new(si.as_str())))?;
            write_plain_text(&mut writer, &item.prefix, text)?;
            writer.write_event(Event::End(BytesEnd::new(si.as_str())))?;
            splices.push((item.span.clone(), writer.into_inner()));
        }
        Ok(splice(&self.xml, splices))
    }
}

fn parse_items(xml: &[u8]) -> Result<Vec<SharedString>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut items = Vec::new();

    loop {
        let start = reader.buffer_position() as usize;
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"si" => {
                let prefix = prefix_of(std::str::from_utf8(e.name().as_ref())?).to_string();
                let (text, rich) = read_string_item(&mut reader, b"si")?;
                let end = reader.buffer_position() as usize;
                items.push(SharedString {
                    text,
                    rich,
                    span: markup_start(xml, start)..end,
                    prefix,
                });
            }
            Event::Empty(e) if e.local_name().as_ref() == b"si" => {
                let prefix = prefix_of(std::str::from_utf8(e.name().as_ref())?).to_string();
                let end = reader.buffer_position() as usize;
                items.push(SharedString {
                    text: String::new(),
                    rich: false,
                    span: markup_start(xml, start)..end,
                    prefix,
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SST: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="4" uniqueCount="4"><si><t xml:space="preserve"> [001] value</t></si><si><t>keep</t></si><si/><si><r><rPr><b/></rPr><t>A </t></r><r><t>[x] B</t></r></si></sst>"#;

    fn part() -> SharedStringsPart {
        SharedStringsPart::parse("xl/sharedStrings.xml".into(), SST.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn parses_every_item_including_empty_ones() {
        let sst = part();
        let texts: Vec<_> = sst.items.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec![" [001] value", "keep", "", "A [x] B"]);
        assert!(sst.items[3].rich);
        assert!(!sst.items[0].rich);
    }

    #[test]
    fn rewrite_touches_only_replaced_items() {
        let sst = part();
        let mut replacements = BTreeMap::new();
        replacements.insert(0, "value".to_string());
        replacements.insert(3, "A/B".to_string());

        let xml = String::from_utf8(sst.rewrite(&replacements).unwrap()).unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#));
        assert!(xml.contains(r#"count="4" uniqueCount="4"><si><t>value</t></si><si><t>keep</t></si><si/><si><t>A/B</t></si></sst>"#));

        let reparsed =
            SharedStringsPart::parse("xl/sharedStrings.xml".into(), xml.into_bytes()).unwrap();
        assert_eq!(reparsed.items.len(), 4);
        assert_eq!(reparsed.items[3].text, "A/B");
    }

    #[test]
    fn prefixed_items_keep_their_prefix() {
        let xml = r#"<x:sst xmlns:x="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><x:si><x:t>[a] b</x:t></x:si></x:sst>"#;
        let sst = SharedStringsPart::parse("xl/sharedStrings.xml".into(), xml.as_bytes().to_vec())
            .unwrap();
        let mut replacements = BTreeMap::new();
        replacements.insert(0, "b".to_string());
        let out = String::from_utf8(sst.rewrite(&replacements).unwrap()).unwrap();
        assert!(out.contains("<x:si><x:t>b</x:t></x:si>"));
    }
}

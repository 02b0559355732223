//! Flat event view of one XML part.
//!
//! Reading keeps everything a rewrite must reproduce: attribute values stay in their escaped
//! source form, and declarations, comments, processing instructions and doctypes are kept as
//! the exact source markup. Only character data is unescaped, since text extraction needs it.

use anyhow::Context;
use quick_xml::escape::{escape, partial_escape, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XmlEvent {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    /// Unescaped character data.
    Text(String),
    CData(String),
    /// Source markup written back unchanged (`<?xml ...?>`, `<!-- -->`, `<?pi?>`, `<!DOCTYPE>`).
    Raw(String),
}

pub fn read_events(name: &str, xml: &[u8]) -> anyhow::Result<Vec<XmlEvent>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut events = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let start = reader.buffer_position() as usize;
        let ev = reader
            .read_event_into(&mut buf)
            .with_context(|| format!("{name}: malformed xml near byte {}", reader.buffer_position()))?;
        let end = (reader.buffer_position() as usize).min(xml.len());
        let raw = || lossy(&xml[start.min(end)..end]);
        events.push(match ev {
            Event::Eof => break,
            Event::Start(s) => XmlEvent::Start {
                name: lossy(s.name().as_ref()),
                attrs: raw_attrs(&s).with_context(|| format!("{name}: bad attribute"))?,
            },
            Event::Empty(s) => XmlEvent::Empty {
                name: lossy(s.name().as_ref()),
                attrs: raw_attrs(&s).with_context(|| format!("{name}: bad attribute"))?,
            },
            Event::End(e) => XmlEvent::End {
                name: lossy(e.name().as_ref()),
            },
            Event::Text(t) => XmlEvent::Text(
                t.unescape()
                    .with_context(|| format!("{name}: bad character reference"))?
                    .into_owned(),
            ),
            Event::CData(t) => XmlEvent::CData(lossy(&t.into_inner())),
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {
                XmlEvent::Raw(raw())
            }
        });
    }
    Ok(events)
}

fn raw_attrs(s: &BytesStart<'_>) -> anyhow::Result<Vec<(String, String)>> {
    s.attributes()
        .map(|a| -> anyhow::Result<(String, String)> {
            let a = a?;
            Ok((lossy(a.key.as_ref()), lossy(&a.value)))
        })
        .collect()
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Escapes a plain attribute value into the raw form kept in `attrs`.
pub fn escape_attr(value: &str) -> String {
    escape(value).into_owned()
}

/// Inverse of [`escape_attr`]; malformed references are returned as written.
pub fn unescape_attr(raw: &str) -> String {
    unescape(raw)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Whether `c` matches the XML 1.0 `Char` production. quick-xml does not check this.
pub fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\u{9}' | '\u{A}' | '\u{D}'
            | '\u{20}'..='\u{D7FF}'
            | '\u{E000}'..='\u{FFFD}'
            | '\u{10000}'..='\u{10FFFF}'
    )
}

/// `text` without the characters no XML 1.0 document may contain.
pub fn strip_invalid_chars(text: &str) -> String {
    text.chars().filter(|c| is_xml_char(*c)).collect()
}

pub fn write_events(events: &[XmlEvent]) -> Vec<u8> {
    let mut out = String::new();
    for ev in events {
        match ev {
            XmlEvent::Start { name, attrs } => push_tag(&mut out, name, attrs, false),
            XmlEvent::Empty { name, attrs } => push_tag(&mut out, name, attrs, true),
            XmlEvent::End { name } => {
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            XmlEvent::Text(text) => out.push_str(&partial_escape(text)),
            XmlEvent::CData(text) => {
                out.push_str("<![CDATA[");
                out.push_str(text);
                out.push_str("]]>");
            }
            XmlEvent::Raw(markup) => out.push_str(markup),
        }
    }
    out.into_bytes()
}

// attribute values are already escaped
fn push_tag(out: &mut String, name: &str, attrs: &[(String, String)], empty: bool) {
    out.push('<');
    out.push_str(name);
    for (k, v) in attrs {
        out.push(' ');
        out.push_str(k);
        out.push_str("=\"");
        out.push_str(v);
        out.push('"');
    }
    out.push_str(if empty { "/>" } else { ">" });
}

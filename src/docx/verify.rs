use std::collections::BTreeSet;

use super::package::DocxPackage;
use super::tree::XmlTree;
use super::xml::is_xml_char;
use super::wml::{
    COMMENTS_PART, CONTENT_TYPES_PART, DOCUMENT_PART, DOCUMENT_RELS_PART, PACKAGE_RELS_PART,
};
use crate::error::MergeError;

/// Parts every merged package must contain.
pub const REQUIRED_OUTPUT_PARTS: [&str; 5] = [
    CONTENT_TYPES_PART,
    PACKAGE_RELS_PART,
    DOCUMENT_PART,
    DOCUMENT_RELS_PART,
    COMMENTS_PART,
];

const ZIP_MAGIC: &[u8] = b"PK";

/// Re-opens freshly written package bytes and checks they are usable.
///
/// Required parts must exist and parse into balanced trees. Parts named in `rewritten` may only
/// hold XML 1.0 characters. Every other entry of `original` must decompress to identical bytes.
pub fn verify_output(
    bytes: &[u8],
    original: &DocxPackage,
    rewritten: &BTreeSet<String>,
) -> anyhow::Result<()> {
    if !bytes.starts_with(ZIP_MAGIC) {
        return Err(corrupt("missing zip signature"));
    }
    let pkg = DocxPackage::from_bytes(bytes)
        .map_err(|e| corrupt(format!("zip does not re-open: {e:#}")))?;

    for name in REQUIRED_OUTPUT_PARTS {
        let text = pkg
            .read_optional_part(name)
            .ok_or_else(|| corrupt(format!("missing {name}")))?;
        XmlTree::parse(name, text.as_bytes())
            .map_err(|e| corrupt(format!("{name} is not well-formed: {e:#}")))?;
    }

    for name in rewritten {
        let text = pkg
            .read_optional_part(name)
            .ok_or_else(|| corrupt(format!("missing {name}")))?;
        if let Some(c) = text.chars().find(|c| !is_xml_char(*c)) {
            return Err(corrupt(format!(
                "{name} contains U+{:04X}, which XML 1.0 does not allow",
                c as u32
            )));
        }
    }

    for entry in original.entries.iter().filter(|e| !e.is_dir) {
        if rewritten.iter().any(|r| r.eq_ignore_ascii_case(&entry.name)) {
            continue;
        }
        let before = original.part_digest(&entry.name);
        let after = pkg.part_digest(&entry.name);
        if after.is_none() {
            return Err(corrupt(format!("{} was dropped", entry.name)));
        }
        if before != after {
            return Err(corrupt(format!("{} changed unexpectedly", entry.name)));
        }
    }
    Ok(())
}

fn corrupt(msg: impl Into<String>) -> anyhow::Error {
    MergeError::OutputCorrupt(msg.into()).into()
}

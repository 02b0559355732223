use std::io::{Cursor, Read, Write};

use anyhow::Context;
use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::MergeError;

/// In-memory zip package. Entries keep their original order, compression and timestamps.
#[derive(Clone)]
pub struct DocxPackage {
    pub entries: Vec<DocxEntry>,
}

#[derive(Clone)]
pub struct DocxEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl DocxPackage {
    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let mut zip = ZipArchive::new(Cursor::new(bytes)).context("read zip")?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).context("zip entry")?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .with_context(|| format!("read zip entry: {}", file.name()))?;
            entries.push(DocxEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    /// Part names are matched exactly first, then ASCII case-insensitively as OPC allows.
    pub fn entry(&self, name: &str) -> Option<&DocxEntry> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .or_else(|| self.entries.iter().find(|e| e.name.eq_ignore_ascii_case(name)))
    }

    fn entry_index(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .or_else(|| self.entries.iter().position(|e| e.name.eq_ignore_ascii_case(name)))
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.entry(name).is_some_and(|e| !e.is_dir)
    }

    /// Decoded text of a part; a missing part is [`MergeError::PartMissing`].
    pub fn read_part(&self, name: &str) -> anyhow::Result<String> {
        self.read_optional_part(name)
            .ok_or_else(|| MergeError::PartMissing(name.to_string()).into())
    }

    pub fn read_optional_part(&self, name: &str) -> Option<String> {
        self.entry(name)
            .filter(|e| !e.is_dir)
            .map(|e| decode_part_text(&e.data))
    }

    /// Replaces a part's bytes, or appends a new deflated entry.
    pub fn write_part(&mut self, name: &str, data: Vec<u8>) {
        if let Some(idx) = self.entry_index(name) {
            self.entries[idx].data = data;
            return;
        }
        self.entries.push(DocxEntry {
            name: name.to_string(),
            data,
            compression: CompressionMethod::Deflated,
            last_modified: zip::DateTime::default(),
            unix_mode: None,
            is_dir: false,
        });
    }

    pub fn part_digest(&self, name: &str) -> Option<String> {
        self.entry(name).map(|e| hex::encode(Sha256::digest(&e.data)))
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
        for ent in &self.entries {
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(&ent.name, opts)
                    .with_context(|| format!("add zip dir: {}", ent.name))?;
            } else {
                zout.start_file(&ent.name, opts)
                    .with_context(|| format!("start zip file: {}", ent.name))?;
                zout.write_all(&ent.data)
                    .with_context(|| format!("write zip file: {}", ent.name))?;
            }
        }
        let cursor = zout.finish().context("finish zip")?;
        Ok(cursor.into_inner())
    }
}

/// UTF-8 unless a byte-order mark says otherwise; the BOM itself is dropped.
pub fn decode_part_text(data: &[u8]) -> String {
    let (text, _, _) = encoding_rs::UTF_8.decode(data);
    text.into_owned()
}

use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::MergeSettings;
use crate::docx::comments::{
    comment_body, empty_comments_xml, initials, insert_comment, CommentIds, NewComment,
};
use crate::docx::package::DocxPackage;
use crate::docx::rels::{
    empty_relationships_xml, ensure_comments_content_type, ensure_comments_relationship,
};
use crate::docx::text::ParagraphIndex;
use crate::docx::tree::{NodeId, XmlTree};
use crate::docx::verify::verify_output;
use crate::docx::wml::{
    WordNames, COMMENTS_PART, CONTENT_TYPES_PART, DOCUMENT_PART, DOCUMENT_RELS_PART,
};
use crate::error::MergeError;
use crate::matching::{best_paragraph, place_anchor, MatchResult, StartMethod};
use crate::progress::{preview, ConsoleProgress};

/// Report `method` of records that were not merged.
pub const SKIPPED_METHOD: &str = "skipped";

const PREVIEW_CHARS: usize = 80;

/// One reviewer comment to attach near `anchor_text`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct CommentRecord {
    #[serde(default, alias = "anchorText", deserialize_with = "null_as_empty")]
    pub anchor_text: String,
    #[serde(default, alias = "commentText", deserialize_with = "null_as_empty")]
    pub comment_text: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default, alias = "editTypeLabel")]
    pub edit_type_label: Option<String>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// Parses a JSON array of records. Anything else is [`MergeError::InvalidRecords`].
pub fn parse_records(json: &str) -> anyhow::Result<Vec<CommentRecord>> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| MergeError::InvalidRecords(format!("not valid JSON: {e}")))?;
    let serde_json::Value::Array(items) = value else {
        return Err(MergeError::InvalidRecords("expected a JSON array".to_string()).into());
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value::<CommentRecord>(item)
                .map_err(|e| MergeError::InvalidRecords(format!("record {i}: {e}")).into())
        })
        .collect()
}

/// Outcome of one record.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeDetail {
    pub index: usize,
    pub merged: bool,
    /// Serialized as `-1` when no paragraph matched.
    #[serde(serialize_with = "index_or_minus_one")]
    pub paragraph_index: Option<usize>,
    pub score: f64,
    pub anchor_preview: String,
    pub target_preview: String,
    pub method: &'static str,
    pub approx_start: Option<usize>,
    pub anchor_node_index: Option<usize>,
    pub start_method: Option<StartMethod>,
    pub comment_id: Option<u64>,
}

fn index_or_minus_one<S: Serializer>(v: &Option<usize>, s: S) -> Result<S::Ok, S::Error> {
    match v {
        Some(i) => s.serialize_u64(*i as u64),
        None => s.serialize_i64(-1),
    }
}

impl MergeDetail {
    fn skipped(index: usize, record: &CommentRecord, m: &MatchResult) -> Self {
        Self {
            index,
            merged: false,
            paragraph_index: None,
            score: m.score,
            anchor_preview: preview(&record.anchor_text, PREVIEW_CHARS),
            target_preview: String::new(),
            method: SKIPPED_METHOD,
            approx_start: None,
            anchor_node_index: None,
            start_method: None,
            comment_id: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub merged_count: usize,
    pub total_count: usize,
    pub details: Vec<MergeDetail>,
}

impl MergeReport {
    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("serialize merge report")
    }

    pub fn is_complete(&self) -> bool {
        self.merged_count == self.total_count
    }

    pub fn summary(&self) -> String {
        let unmatched = self.total_count - self.merged_count;
        if unmatched == 0 {
            format!("{} of {} comments merged", self.merged_count, self.total_count)
        } else {
            format!(
                "{} of {} comments merged; {unmatched} had no sufficiently similar text",
                self.merged_count, self.total_count
            )
        }
    }
}

#[derive(Clone, Debug)]
pub struct MergeOutput {
    pub docx: Vec<u8>,
    pub report: MergeReport,
}

/// Merges comment records into `.docx` bytes.
///
/// Holds only settings, so one merger can serve many threads; every call works on its own
/// copy of the package and nothing is shared between calls.
#[derive(Clone, Debug)]
pub struct CommentMerger {
    settings: MergeSettings,
    progress: ConsoleProgress,
}

impl Default for CommentMerger {
    fn default() -> Self {
        Self::new(MergeSettings::default(), ConsoleProgress::silent())
    }
}

impl CommentMerger {
    pub fn new(settings: MergeSettings, progress: ConsoleProgress) -> Self {
        Self { settings, progress }
    }

    pub fn settings(&self) -> &MergeSettings {
        &self.settings
    }

    pub fn merge_json(&self, docx: &[u8], records_json: &str) -> anyhow::Result<MergeOutput> {
        let records = parse_records(records_json)?;
        self.merge(docx, &records)
    }

    pub fn merge(&self, docx: &[u8], records: &[CommentRecord]) -> anyhow::Result<MergeOutput> {
        let pkg = DocxPackage::from_bytes(docx)
            .map_err(|e| MergeError::InvalidPackage(format!("{e:#}")))?;

        let document_xml = pkg.read_part(DOCUMENT_PART)?;
        let types_xml = pkg.read_part(CONTENT_TYPES_PART)?;
        let comments_present = pkg.has_part(COMMENTS_PART);
        let rels_present = pkg.has_part(DOCUMENT_RELS_PART);
        let comments_xml = pkg
            .read_optional_part(COMMENTS_PART)
            .unwrap_or_else(empty_comments_xml);
        let rels_xml = pkg
            .read_optional_part(DOCUMENT_RELS_PART)
            .unwrap_or_else(empty_relationships_xml);

        let mut document = parse_input_part(DOCUMENT_PART, &document_xml)?;
        let mut types = parse_input_part(CONTENT_TYPES_PART, &types_xml)?;
        let mut comments = parse_input_part(COMMENTS_PART, &comments_xml)?;
        let mut rels = parse_input_part(DOCUMENT_RELS_PART, &rels_xml)?;

        let names = WordNames::for_tree(&document);
        let index = ParagraphIndex::build(&document, &names);
        let mut ids = CommentIds::scan(&document, &comments)?;
        self.progress.info(format!(
            "package: {} parts, {} paragraphs, {} records, first comment id {}",
            pkg.entries.len(),
            index.len(),
            records.len(),
            ids.peek()
        ));

        let date = self.settings.comment_date();
        let mut used: HashMap<NodeId, HashSet<usize>> = HashMap::new();
        let mut report = MergeReport {
            merged_count: 0,
            total_count: records.len(),
            details: Vec::with_capacity(records.len()),
        };

        for (i, record) in records.iter().enumerate() {
            self.progress.progress("merge", i + 1, records.len());
            let m = best_paragraph(&record.anchor_text, &index, self.settings.min_match_score);
            let Some(paragraph) = m.paragraph_index.and_then(|pi| index.get(pi)) else {
                self.progress.info(format!(
                    "record {i}: no match for \"{}\"",
                    preview(&record.anchor_text, 40)
                ));
                report.details.push(MergeDetail::skipped(i, record, &m));
                continue;
            };

            let placement = place_anchor(
                &mut document,
                &names,
                paragraph.node,
                &paragraph.text,
                &record.anchor_text,
                used.entry(paragraph.node).or_default(),
                &self.settings.locate,
            );

            let id = ids.next_id()?;
            let author = record
                .author
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .unwrap_or(self.settings.default_author.as_str());
            let author_initials = initials(author);
            let body = comment_body(&record.comment_text, record.edit_type_label.as_deref());
            insert_comment(
                &mut document,
                &names,
                &mut comments,
                placement.anchor_node,
                &NewComment {
                    id,
                    author,
                    initials: &author_initials,
                    date: &date,
                    text: &body,
                },
            )
            .with_context(|| format!("insert comment for record {i}"))?;

            self.progress.info(format!(
                "record {i}: paragraph {} score {:.1}, start {}, anchor node {}, comment {id}",
                paragraph_index_label(m.paragraph_index),
                m.score,
                placement.start_method.as_str(),
                placement.anchor_node_index
            ));
            report.merged_count += 1;
            report.details.push(MergeDetail {
                index: i,
                merged: true,
                paragraph_index: m.paragraph_index,
                score: m.score,
                anchor_preview: preview(&record.anchor_text, PREVIEW_CHARS),
                target_preview: preview(&paragraph.text, PREVIEW_CHARS),
                method: m.method,
                approx_start: placement.approx_char_offset,
                anchor_node_index: Some(placement.anchor_node_index),
                start_method: Some(placement.start_method),
                comment_id: Some(id),
            });
        }

        let types_changed = ensure_comments_content_type(&mut types);
        let rel_added = ensure_comments_relationship(&mut rels)?;

        let mut out = pkg.clone();
        let mut rewritten: BTreeSet<String> = BTreeSet::new();
        let mut rewrite = |name: &str, tree: &XmlTree| {
            out.write_part(name, tree.to_bytes());
            rewritten.insert(name.to_string());
        };
        if report.merged_count > 0 {
            rewrite(DOCUMENT_PART, &document);
        }
        if report.merged_count > 0 || !comments_present {
            rewrite(COMMENTS_PART, &comments);
        }
        if rel_added.is_some() || !rels_present {
            rewrite(DOCUMENT_RELS_PART, &rels);
        }
        if types_changed {
            rewrite(CONTENT_TYPES_PART, &types);
        }

        let bytes = out.to_bytes().context("write merged docx")?;
        verify_output(&bytes, &pkg, &rewritten)?;
        self.progress.info(format!(
            "{} (rewrote {})",
            report.summary(),
            rewritten.iter().cloned().collect::<Vec<_>>().join(", ")
        ));
        Ok(MergeOutput {
            docx: bytes,
            report,
        })
    }
}

fn paragraph_index_label(idx: Option<usize>) -> String {
    idx.map_or_else(|| "-".to_string(), |i| i.to_string())
}

fn parse_input_part(name: &str, xml: &str) -> anyhow::Result<XmlTree> {
    XmlTree::parse(name, xml.as_bytes())
        .map_err(|e| MergeError::InvalidPackage(format!("{e:#}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::package::tests::build_zip;
    use crate::docx::wml::{CT_NS, REL_NS, WML_NS, XML_DECL};
    use crate::error::merge_error;

    const FIXED_DATE: &str = "2024-05-01T12:00:00Z";

    fn merger() -> CommentMerger {
        let settings = MergeSettings {
            fixed_date: Some(FIXED_DATE.to_string()),
            ..MergeSettings::default()
        };
        CommentMerger::new(settings, ConsoleProgress::silent())
    }

    fn record(anchor: &str, comment: &str) -> CommentRecord {
        CommentRecord {
            anchor_text: anchor.to_string(),
            comment_text: comment.to_string(),
            ..CommentRecord::default()
        }
    }

    fn content_types(with_comments: bool) -> String {
        let comments = if with_comments {
            r#"<Override PartName="/word/comments.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.comments+xml"/>"#
        } else {
            ""
        };
        format!(
            r#"{XML_DECL}
<Types xmlns="{CT_NS}"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>{comments}</Types>"#
        )
    }

    fn package_rels() -> String {
        format!(
            r#"{XML_DECL}
<Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#
        )
    }

    fn document(paragraphs: &[&str]) -> String {
        let body: String = paragraphs
            .iter()
            .map(|t| {
                format!(
                    r#"<w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr><w:r><w:t xml:space="preserve">{t}</w:t></w:r></w:p>"#
                )
            })
            .collect();
        format!(
            r#"{XML_DECL}
<w:document xmlns:w="{WML_NS}" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><w:body>{body}<w:sectPr/></w:body></w:document>"#
        )
    }

    /// Minimal package without comments part or document relationships.
    fn docx(paragraphs: &[&str]) -> Vec<u8> {
        let ct = content_types(false);
        let rels = package_rels();
        let doc = document(paragraphs);
        build_zip(&[
            ("[Content_Types].xml", ct.as_str()),
            ("_rels/.rels", rels.as_str()),
            ("word/document.xml", doc.as_str()),
            ("word/media/image1.png", "binary-ish payload"),
        ])
    }

    fn read(docx: &[u8], part: &str) -> String {
        DocxPackage::from_bytes(docx)
            .expect("open")
            .read_part(part)
            .expect("part")
    }

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn brown_fox_scenario() {
        let text = "The quick brown fox jumps over the lazy dog.";
        let input = docx(&["Title", text]);
        let rec = CommentRecord {
            author: Some("Kate".to_string()),
            ..record("brown fox jumps", "nice rhythm")
        };
        let out = merger().merge(&input, &[rec]).expect("merge");

        assert_eq!(out.report.merged_count, 1);
        assert_eq!(out.report.total_count, 1);
        let d = &out.report.details[0];
        assert!(d.merged);
        assert_eq!(d.paragraph_index, Some(1));
        assert!(d.score >= 90.0);
        assert_eq!(d.method, "partial_ratio");
        assert_eq!(d.start_method, Some(StartMethod::Substring));
        assert_eq!(d.approx_start, Some(text.find("brown").expect("brown")));
        assert_eq!(d.anchor_node_index, Some(0));
        assert_eq!(d.comment_id, Some(0));

        let comments = read(&out.docx, COMMENTS_PART);
        let tree = XmlTree::parse(COMMENTS_PART, comments.as_bytes()).expect("reparse");
        assert_eq!(tree.element_children(tree.root()).count(), 1);
        assert!(comments.contains(r#"w:author="Kate""#));
        assert!(comments.contains(&format!(r#"w:date="{FIXED_DATE}""#)));
        assert!(comments.contains(">nice rhythm</w:t>"));

        let doc = read(&out.docx, DOCUMENT_PART);
        assert!(doc.contains(
            r#"<w:commentRangeStart w:id="0"/><w:r><w:t xml:space="preserve">The quick brown fox jumps over the lazy dog.</w:t></w:r><w:commentRangeEnd w:id="0"/><w:r><w:commentReference w:id="0"/></w:r>"#
        ));
    }

    #[test]
    fn new_parts_are_registered_once() {
        let out = merger()
            .merge(&docx(&["Hello there"]), &[record("Hello", "hi")])
            .expect("merge");
        let ct = read(&out.docx, CONTENT_TYPES_PART);
        assert_eq!(count(&ct, "/word/comments.xml"), 1);
        assert_eq!(count(&ct, "<?xml"), 1);
        let rels = read(&out.docx, DOCUMENT_RELS_PART);
        assert!(rels.contains(r#"Id="rId1""#));
        assert!(rels.contains(r#"Target="comments.xml""#));
        assert!(rels.starts_with(XML_DECL));

        // a second run over the output must not register anything again
        let again = merger()
            .merge(&out.docx, &[record("Hello", "second")])
            .expect("merge again");
        let ct = read(&again.docx, CONTENT_TYPES_PART);
        assert_eq!(count(&ct, "/word/comments.xml"), 1);
        let rels = read(&again.docx, DOCUMENT_RELS_PART);
        assert_eq!(count(&rels, "relationships/comments"), 1);
        assert_eq!(again.report.details[0].comment_id, Some(1));
    }

    #[test]
    fn empty_anchor_is_skipped_without_error() {
        let out = merger()
            .merge(&docx(&["Some text"]), &[record("", "orphan"), record("  \n", "blank")])
            .expect("merge");
        assert_eq!(out.report.merged_count, 0);
        assert_eq!(out.report.total_count, 2);
        for d in &out.report.details {
            assert!(!d.merged);
            assert_eq!(d.method, SKIPPED_METHOD);
            assert_eq!(d.paragraph_index, None);
            assert_eq!(d.comment_id, None);
        }
    }

    #[test]
    fn curly_quotes_anchor_matches_straight_quotes() {
        let text = r#"She sat in the "cozy corner" all day."#;
        let out = merger()
            .merge(&docx(&[text]), &[record("\u{201C}cozy corner\u{201D}", "lovely")])
            .expect("merge");
        let d = &out.report.details[0];
        assert!(!text.contains("\u{201C}cozy corner\u{201D}"));
        assert!(d.merged);
        assert_eq!(d.start_method, Some(StartMethod::Substring));
        assert_eq!(d.approx_start, text.find('"'));
    }

    #[test]
    fn same_spot_comments_get_distinct_anchor_nodes() {
        let input = docx(&["Hello world again"]);
        let out = merger()
            .merge(
                &input,
                &[record("Hello world", "first"), record("Hello world", "second")],
            )
            .expect("merge");
        let a = out.report.details[0].anchor_node_index;
        let b = out.report.details[1].anchor_node_index;
        assert_eq!(a, Some(0));
        assert_eq!(b, Some(1));
        assert_eq!(out.report.details[0].approx_start, out.report.details[1].approx_start);

        let comments = read(&out.docx, COMMENTS_PART);
        let tree = XmlTree::parse(COMMENTS_PART, comments.as_bytes()).expect("reparse");
        let ids: Vec<String> = tree
            .element_children(tree.root())
            .filter_map(|c| tree.attr(c, "w:id"))
            .collect();
        assert_eq!(ids, vec!["0", "1"]);
        assert!(comments.contains(">first</w:t>") && comments.contains(">second</w:t>"));

        let doc = read(&out.docx, DOCUMENT_PART);
        assert_eq!(count(&doc, "<w:commentRangeStart "), 2);
        assert_eq!(count(&doc, "<w:commentReference "), 2);
        assert!(doc.contains(r#"<w:commentRangeStart w:id="1"/><w:r><w:t xml:space="preserve"> </w:t></w:r><w:commentRangeEnd w:id="1"/>"#));
    }

    #[test]
    fn ids_continue_after_existing_comments() {
        let ct = content_types(true);
        let rels = package_rels();
        let doc = document(&["Alpha paragraph", "Beta paragraph"]);
        let comments = format!(
            r#"{XML_DECL}
<w:comments xmlns:w="{WML_NS}"><w:comment w:id="3" w:author="A"><w:p/></w:comment><w:comment w:id="5" w:author="B"><w:p/></w:comment></w:comments>"#
        );
        let doc_rels = format!(
            r#"<Relationships xmlns="{REL_NS}"><Relationship Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments" Target="comments.xml"/></Relationships>"#
        );
        let input = build_zip(&[
            ("[Content_Types].xml", ct.as_str()),
            ("_rels/.rels", rels.as_str()),
            ("word/document.xml", doc.as_str()),
            ("word/comments.xml", comments.as_str()),
            ("word/_rels/document.xml.rels", doc_rels.as_str()),
        ]);
        let out = merger()
            .merge(
                &input,
                &[
                    record("Alpha", "one"),
                    record("", "skipped"),
                    record("Beta", "two"),
                ],
            )
            .expect("merge");
        let ids: Vec<Option<u64>> = out.report.details.iter().map(|d| d.comment_id).collect();
        assert_eq!(ids, vec![Some(6), None, Some(7)]);

        let before = DocxPackage::from_bytes(&input).expect("open");
        let after = DocxPackage::from_bytes(&out.docx).expect("open");
        for part in [CONTENT_TYPES_PART, DOCUMENT_RELS_PART] {
            assert_eq!(before.part_digest(part), after.part_digest(part), "{part}");
        }
    }

    #[test]
    fn empty_record_list_leaves_complete_package_untouched() {
        let ct = content_types(true);
        let rels = package_rels();
        let doc = document(&["Only paragraph"]);
        let comments = format!("{XML_DECL}\r\n<w:comments xmlns:w=\"{WML_NS}\"/>");
        let doc_rels = format!(
            r#"<Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments" Target="comments.xml"/></Relationships>"#
        );
        let input = build_zip(&[
            ("[Content_Types].xml", ct.as_str()),
            ("_rels/.rels", rels.as_str()),
            ("word/document.xml", doc.as_str()),
            ("word/comments.xml", comments.as_str()),
            ("word/_rels/document.xml.rels", doc_rels.as_str()),
        ]);
        let out = merger().merge(&input, &[]).expect("merge");
        assert_eq!(out.report, MergeReport::default());

        let before = DocxPackage::from_bytes(&input).expect("open");
        let after = DocxPackage::from_bytes(&out.docx).expect("open");
        assert_eq!(before.entries.len(), after.entries.len());
        for e in &before.entries {
            assert_eq!(before.part_digest(&e.name), after.part_digest(&e.name), "{}", e.name);
        }
    }

    #[test]
    fn empty_record_list_on_bare_package_only_adds_fixups() {
        let input = docx(&["Text"]);
        let out = merger().merge(&input, &[]).expect("merge");
        assert_eq!(out.report.merged_count, 0);
        let before = DocxPackage::from_bytes(&input).expect("open");
        let after = DocxPackage::from_bytes(&out.docx).expect("open");
        assert_eq!(before.part_digest(DOCUMENT_PART), after.part_digest(DOCUMENT_PART));
        assert!(after.has_part(COMMENTS_PART));
        assert!(after.has_part(DOCUMENT_RELS_PART));
    }

    #[test]
    fn unmatched_and_matched_records_are_all_reported() {
        let settings = MergeSettings {
            min_match_score: 70.0,
            fixed_date: Some(FIXED_DATE.to_string()),
            ..MergeSettings::default()
        };
        let m = CommentMerger::new(settings, ConsoleProgress::silent());
        let records = vec![
            record("quarterly revenue", "check numbers"),
            record("zzzz qqqq", "nothing like this"),
            record("", "empty"),
        ];
        let out = m
            .merge(&docx(&["The quarterly revenue grew."]), &records)
            .expect("merge");
        assert_eq!(out.report.total_count, records.len());
        assert_eq!(out.report.merged_count, 1);
        assert!(out.report.merged_count <= out.report.total_count);
        assert!(!out.report.is_complete());
        assert!(out.report.summary().contains("1 of 3"));
    }

    #[test]
    fn label_author_default_and_escaping() {
        let rec = CommentRecord {
            edit_type_label: Some("Grammar".to_string()),
            ..record("fish & chips", "use \"and\" <here>")
        };
        let out = merger()
            .merge(&docx(&["We ate fish &amp; chips."]), &[rec])
            .expect("merge");
        assert_eq!(out.report.details[0].start_method, Some(StartMethod::Substring));
        let comments = read(&out.docx, COMMENTS_PART);
        assert!(comments.contains(r#"w:author="Reviewer""#));
        assert!(comments.contains(r#"w:initials="R""#));
        assert!(comments.contains(">[Grammar] use \"and\" &lt;here&gt;</w:t>"));
    }

    #[test]
    fn control_characters_in_records_never_reach_the_package() {
        let recs = parse_records(
            "[{\"anchor_text\":\"Hello\",\"comment_text\":\"line\\u000bnext\\tcol\\u0001\",\"author\":\"Ka\\u0007te\"}]",
        )
        .expect("parse");
        assert_eq!(recs[0].comment_text, "line\u{B}next\tcol\u{1}");
        let out = merger().merge(&docx(&["Hello there"]), &recs).expect("merge");
        assert_eq!(out.report.merged_count, 1);

        let comments = read(&out.docx, COMMENTS_PART);
        assert!(comments.chars().all(crate::docx::xml::is_xml_char));
        assert!(comments.contains(r#"w:author="Kate""#));
        assert!(comments.contains(
            r#"<w:t xml:space="preserve">line</w:t><w:br/><w:t xml:space="preserve">next</w:t><w:tab/><w:t xml:space="preserve">col</w:t></w:r>"#
        ));
    }

    #[test]
    fn exhausted_ids_are_input_problems() {
        let ct = content_types(true);
        let rels = package_rels();
        let doc = document(&["Hello there"]);
        let comments = format!(
            r#"<w:comments xmlns:w="{WML_NS}"><w:comment w:id="{}" w:author="A"><w:p/></w:comment></w:comments>"#,
            u64::MAX
        );
        let input = build_zip(&[
            ("[Content_Types].xml", ct.as_str()),
            ("_rels/.rels", rels.as_str()),
            ("word/document.xml", doc.as_str()),
            ("word/comments.xml", comments.as_str()),
        ]);
        let err = merger()
            .merge(&input, &[record("Hello", "x")])
            .expect_err("comment ids");
        assert!(matches!(merge_error(&err), Some(MergeError::InvalidPackage(_))));

        let doc_rels = format!(
            r#"<Relationships xmlns="{REL_NS}"><Relationship Id="rId{}" Type="x" Target="styles.xml"/></Relationships>"#,
            u64::MAX
        );
        let input = build_zip(&[
            ("[Content_Types].xml", ct.as_str()),
            ("_rels/.rels", rels.as_str()),
            ("word/document.xml", doc.as_str()),
            ("word/_rels/document.xml.rels", doc_rels.as_str()),
        ]);
        let err = merger()
            .merge(&input, &[record("Hello", "x")])
            .expect_err("relationship ids");
        assert!(merge_error(&err).is_some_and(MergeError::is_input_problem));
    }

    #[test]
    fn near_misses_report_their_best_score() {
        let settings = MergeSettings {
            min_match_score: 95.0,
            ..MergeSettings::default()
        };
        let out = CommentMerger::new(settings, ConsoleProgress::silent())
            .merge(&docx(&["The quick brown fox"]), &[record("brown fax", "x")])
            .expect("merge");
        let d = &out.report.details[0];
        assert!(!d.merged);
        assert_eq!(d.paragraph_index, None);
        assert!(d.score > 80.0 && d.score < 95.0, "{}", d.score);
    }

    #[test]
    fn touched_parts_keep_their_declaration() {
        let out = merger()
            .merge(&docx(&["Keep the header"]), &[record("header", "x")])
            .expect("merge");
        let doc = read(&out.docx, DOCUMENT_PART);
        assert!(doc.starts_with(XML_DECL));
        assert_eq!(count(&doc, "<?xml"), 1);
        let comments = read(&out.docx, COMMENTS_PART);
        assert_eq!(count(&comments, "<?xml"), 1);
    }

    #[test]
    fn missing_required_parts_are_input_problems() {
        let no_doc = build_zip(&[("[Content_Types].xml", "<Types/>")]);
        let err = merger().merge(&no_doc, &[]).expect_err("no document");
        assert_eq!(
            merge_error(&err),
            Some(&MergeError::PartMissing(DOCUMENT_PART.to_string()))
        );

        let doc = document(&["x"]);
        let no_types = build_zip(&[("word/document.xml", doc.as_str())]);
        let err = merger().merge(&no_types, &[]).expect_err("no content types");
        assert_eq!(
            merge_error(&err),
            Some(&MergeError::PartMissing(CONTENT_TYPES_PART.to_string()))
        );

        let err = merger().merge(b"plain text", &[]).expect_err("not a zip");
        assert!(merge_error(&err).is_some_and(MergeError::is_input_problem));
    }

    #[test]
    fn records_json_must_be_an_array() {
        for bad in ["{}", "\"x\"", "not json", "[1, 2]"] {
            let err = parse_records(bad).expect_err(bad);
            assert!(matches!(merge_error(&err), Some(MergeError::InvalidRecords(_))), "{bad}");
        }
        let err = merger()
            .merge_json(&docx(&["x"]), "{\"anchor_text\": \"x\"}")
            .expect_err("object");
        assert!(merge_error(&err).is_some_and(MergeError::is_input_problem));
    }

    #[test]
    fn records_accept_both_spellings_and_nulls() {
        let recs = parse_records(
            r#"[
                {"anchor_text": "a", "comment_text": "b", "author": "K", "edit_type_label": "Style"},
                {"anchorText": "c", "commentText": "d", "editTypeLabel": null},
                {"anchor_text": null},
                {}
            ]"#,
        )
        .expect("parse");
        assert_eq!(recs.len(), 4);
        assert_eq!(recs[0].edit_type_label.as_deref(), Some("Style"));
        assert_eq!(recs[1].anchor_text, "c");
        assert_eq!(recs[1].comment_text, "d");
        assert_eq!(recs[2], CommentRecord::default());
        assert_eq!(recs[3], CommentRecord::default());
    }

    #[test]
    fn report_json_uses_camel_case_and_minus_one() {
        let out = merger()
            .merge(&docx(&["Hello"]), &[record("Hello", "a"), record("", "b")])
            .expect("merge");
        let v: serde_json::Value =
            serde_json::from_str(&out.report.to_json().expect("json")).expect("parse");
        assert_eq!(v["mergedCount"], 1);
        assert_eq!(v["totalCount"], 2);
        assert_eq!(v["details"][0]["startMethod"], "substring");
        assert_eq!(v["details"][0]["anchorNodeIndex"], 0);
        assert_eq!(v["details"][1]["paragraphIndex"], -1);
        assert_eq!(v["details"][1]["method"], "skipped");
    }

    #[test]
    fn independent_merges_run_in_parallel() {
        let m = merger();
        let a = docx(&["First document body"]);
        let b = docx(&["Second document body"]);
        let (ra, rb) = std::thread::scope(|s| {
            let ha = s.spawn(|| m.merge(&a, &[record("First", "a")]));
            let hb = s.spawn(|| m.merge(&b, &[record("Second", "b")]));
            (ha.join().expect("join a"), hb.join().expect("join b"))
        });
        assert_eq!(ra.expect("a").report.merged_count, 1);
        assert_eq!(rb.expect("b").report.merged_count, 1);
    }

    #[test]
    fn later_offsets_use_text_from_before_any_insertion() {
        let text = "Alpha beta gamma delta";
        let out = merger()
            .merge(
                &docx(&[text]),
                &[record("Alpha", "1"), record("gamma delta", "2")],
            )
            .expect("merge");
        assert_eq!(out.report.details[1].approx_start, text.find("gamma"));
        assert_eq!(
            out.report.details[1].target_preview,
            out.report.details[0].target_preview
        );
    }
}

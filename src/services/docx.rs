use crate::models::{FontSettings, RuleSet};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::ops::Range;
use tempfile::NamedTempFile;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Main document part inside a DOCX package
const BODY_PART: &str = "word/document.xml";

/// Errors that can occur while rewriting a DOCX package
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a valid DOCX package: {source}")]
    Package {
        path: Utf8PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("{0} has no {BODY_PART} part")]
    MissingBody(Utf8PathBuf),

    #[error("Part {part} of {path} is not UTF-8 XML")]
    Encoding { path: Utf8PathBuf, part: String },
}

/// Kind of XML part the editor may rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartKind {
    Body,
    Header,
    Footer,
}

impl PartKind {
    fn of(name: &str) -> Option<Self> {
        if name == BODY_PART {
            Some(PartKind::Body)
        } else if name.starts_with("word/header") && name.ends_with(".xml") {
            Some(PartKind::Header)
        } else if name.starts_with("word/footer") && name.ends_with(".xml") {
            Some(PartKind::Footer)
        } else {
            None
        }
    }
}

/// An element located by [`DocxEditor::elements`]
struct Element {
    /// Opening tag through closing tag
    span: Range<usize>,
    /// Between the tags
    content: Range<usize>,
}

impl Element {
    fn shifted(self, offset: usize) -> Self {
        Self {
            span: self.span.start + offset..self.span.end + offset,
            content: self.content.start + offset..self.content.end + offset,
        }
    }
}

/// One `<w:t>` element inside a paragraph
struct TextNode {
    span: Range<usize>,
    open_tag: String,
}

/// Rewrites text runs inside DOCX packages.
///
/// A DOCX file is a ZIP package; only the WordprocessingML parts are
/// rewritten (body, headers, footers) and every other entry is copied
/// untouched in its original order. The output is written to a temporary
/// file beside the destination and renamed into place, so a failure never
/// leaves a partial document behind.
///
/// Paragraphs and runs nest: a text box is a run holding whole paragraphs
/// (`w:pict`/`w:txbxContent`, or both branches of `mc:AlternateContent`).
/// Element boundaries are therefore found by counting open and close tags,
/// never by the nearest closing tag.
///
/// Patterns, compiled once at construction:
///
/// - `tag`: an opening, closing or empty `w:p`, `w:r` or `w:rPr` tag
/// - `text_node`: a `<w:t>` element with its opening tag and escaped text
/// - `empty_props`: an empty `<w:rPr/>` at the start of a run body
/// - `font_props`: `rFonts`, `sz` and `szCs` properties
/// - `style_prop`: `rStyle`, which must stay ahead of `rFonts`
/// - `after_size`: the first run property that schema order places after `szCs`
pub struct DocxEditor {
    tag: Regex,
    text_node: Regex,
    empty_props: Regex,
    font_props: Regex,
    style_prop: Regex,
    after_size: Regex,
}

impl DocxEditor {
    pub fn new() -> Self {
        Self {
            tag: Regex::new(r"<(?P<close>/)?w:(?P<name>rPr|p|r)(?:\s[^>]*?)?(?P<empty>/)?>")
                .expect("Invalid element tag regex"),
            text_node: Regex::new(r"(?P<open><w:t(?:\s[^>]*[^/>])?>)(?P<text>[^<]*)</w:t>")
                .expect("Invalid text node regex"),
            empty_props: Regex::new(r"^\s*<w:rPr\s*/>").expect("Invalid empty properties regex"),
            font_props: Regex::new(r"<w:(?:rFonts|szCs|sz)\b[^>]*/>")
                .expect("Invalid font properties regex"),
            style_prop: Regex::new(r"<w:rStyle\b[^>]*/>").expect("Invalid style regex"),
            after_size: Regex::new(
                r"<w:(?:highlight|u|effect|bdr|shd|fitText|vertAlign|rtl|cs|em|lang|eastAsianLayout|specVanish|oMath)\b",
            )
            .expect("Invalid property order regex"),
        }
    }

    /// Apply `rules` to the text of the body, headers and footers of `source`,
    /// writing the result to `output`
    pub fn replace_text(
        &self,
        source: &Utf8Path,
        output: &Utf8Path,
        rules: &RuleSet,
    ) -> Result<(), DocumentError> {
        self.rewrite_package(source, output, |_, xml| self.replace_in_xml(xml, rules))
    }

    /// Set every run of the body to the body size and every footer run to the
    /// footer size, both in the configured font family. Headers are left as is.
    pub fn normalize_fonts(
        &self,
        source: &Utf8Path,
        output: &Utf8Path,
        font: &FontSettings,
    ) -> Result<(), DocumentError> {
        self.rewrite_package(source, output, |kind, xml| match kind {
            PartKind::Body => self.normalize_fonts_in_xml(xml, &font.family, font.body_half_points()),
            PartKind::Footer => {
                self.normalize_fonts_in_xml(xml, &font.family, font.footer_half_points())
            }
            PartKind::Header => xml.to_string(),
        })
    }

    /// Text replacement on one WordprocessingML part.
    ///
    /// Each paragraph's own text nodes are treated as one string; paragraphs
    /// nested in it (text boxes) are separate strings. Matches inside a
    /// single node are replaced in place; a match spanning several runs is
    /// written into the run where it starts and removed from the following
    /// ones, so surrounding formatting survives. Field codes (`w:instrText`,
    /// `w:fldSimple` instructions) are not text and stay as they are.
    pub fn replace_in_xml(&self, xml: &str, rules: &RuleSet) -> String {
        if rules.is_empty() {
            return xml.to_string();
        }
        self.rewrite_elements(xml, "p", |paragraph, content| {
            self.replace_in_paragraph(paragraph, content, rules)
        })
    }

    fn replace_in_paragraph(&self, paragraph: &str, content: Range<usize>, rules: &RuleSet) -> String {
        let nested: Vec<Element> = self
            .elements(&paragraph[content.clone()], "p")
            .into_iter()
            .map(|e| e.shifted(content.start))
            .collect();

        let mut nodes = Vec::new();
        let mut texts = Vec::new();
        // Text separated by a nested paragraph never joins into one match
        let mut segments: Vec<Range<usize>> = Vec::new();
        let mut segment_of_last = None;
        let mut opaque = 0;
        for caps in self.text_node.captures_iter(paragraph) {
            let (Some(whole), Some(open), Some(text)) =
                (caps.get(0), caps.name("open"), caps.name("text"))
            else {
                continue;
            };
            if nested.iter().any(|e| e.span.contains(&whole.start())) {
                continue;
            }
            // A node we cannot decode is kept byte for byte and splits the text
            let Some(text) = unescape_xml(text.as_str()) else {
                opaque += 1;
                continue;
            };
            let segment = opaque + nested.iter().filter(|e| e.span.end <= whole.start()).count();
            if segment_of_last == Some(segment) {
                if let Some(last) = segments.last_mut() {
                    last.end += 1;
                }
            } else {
                segments.push(nodes.len()..nodes.len() + 1);
                segment_of_last = Some(segment);
            }
            nodes.push(TextNode {
                span: whole.range(),
                open_tag: open.as_str().to_string(),
            });
            texts.push(text);
        }

        let mut changed = vec![false; texts.len()];
        for segment in segments {
            for rule in rules {
                replace_across_nodes(
                    &mut texts[segment.clone()],
                    &mut changed[segment.clone()],
                    rule.old_text(),
                    rule.new_text(),
                );
            }
        }

        let mut edits: Vec<(Range<usize>, String)> = Vec::new();
        for (index, node) in nodes.iter().enumerate() {
            if changed[index] {
                let rewritten = format!(
                    "{}{}</w:t>",
                    preserve_space(&node.open_tag),
                    escape_text(&texts[index])
                );
                edits.push((node.span.clone(), rewritten));
            }
        }
        for element in &nested {
            let original = &paragraph[element.span.clone()];
            let inner = element.content.start - element.span.start
                ..element.content.end - element.span.start;
            let rewritten = self.replace_in_paragraph(original, inner, rules);
            if rewritten != original {
                edits.push((element.span.clone(), rewritten));
            }
        }

        if edits.is_empty() {
            return paragraph.to_string();
        }
        edits.sort_by_key(|(span, _)| span.start);

        let mut out = String::with_capacity(paragraph.len());
        let mut last = 0;
        for (span, text) in edits {
            out.push_str(&paragraph[last..span.start]);
            out.push_str(&text);
            last = span.end;
        }
        out.push_str(&paragraph[last..]);
        out
    }

    /// Font normalization on one WordprocessingML part
    pub fn normalize_fonts_in_xml(&self, xml: &str, family: &str, half_points: u32) -> String {
        let family = escape_attribute(family);
        let fonts = format!(
            r#"<w:rFonts w:ascii="{family}" w:hAnsi="{family}" w:eastAsia="{family}" w:cs="{family}"/>"#
        );
        let size = format!(r#"<w:sz w:val="{half_points}"/><w:szCs w:val="{half_points}"/>"#);

        self.normalize_runs(xml, &fonts, &size)
    }

    fn normalize_runs(&self, xml: &str, fonts: &str, size: &str) -> String {
        self.rewrite_elements(xml, "r", |run, content| {
            self.normalize_run(&run[..content.start], &run[content], fonts, size)
        })
    }

    /// Rewrite a run's own properties, then every run nested in its body
    fn normalize_run(&self, open: &str, body: &str, fonts: &str, size: &str) -> String {
        let indent = body.len() - body.trim_start().len();
        let leading = self
            .elements(body, "rPr")
            .into_iter()
            .next()
            .filter(|props| props.span.start == indent);

        if let Some(props) = leading {
            let rewritten = self.rewrite_properties(&body[props.content.clone()], fonts, size);
            let rest = self.normalize_runs(&body[props.span.end..], fonts, size);
            format!("{open}<w:rPr>{rewritten}</w:rPr>{rest}</w:r>")
        } else if let Some(m) = self.empty_props.find(body) {
            let rest = self.normalize_runs(&body[m.end()..], fonts, size);
            format!("{open}<w:rPr>{fonts}{size}</w:rPr>{rest}</w:r>")
        } else {
            let rest = self.normalize_runs(body, fonts, size);
            format!("{open}<w:rPr>{fonts}{size}</w:rPr>{rest}</w:r>")
        }
    }

    /// Outermost `w:{name}` elements of `xml`, matched by nesting depth.
    /// Empty elements are skipped and an unclosed element is ignored.
    fn elements(&self, xml: &str, name: &str) -> Vec<Element> {
        let mut found = Vec::new();
        let mut depth = 0usize;
        let mut open: Option<Range<usize>> = None;

        for caps in self.tag.captures_iter(xml) {
            let (Some(whole), Some(tag_name)) = (caps.get(0), caps.name("name")) else {
                continue;
            };
            if tag_name.as_str() != name || caps.name("empty").is_some() {
                continue;
            }

            if caps.name("close").is_none() {
                if depth == 0 {
                    open = Some(whole.range());
                }
                depth += 1;
            } else if depth > 0 {
                depth -= 1;
                if depth == 0 {
                    if let Some(tag) = open.take() {
                        found.push(Element {
                            span: tag.start..whole.end(),
                            content: tag.end..whole.start(),
                        });
                    }
                }
            }
        }
        found
    }

    /// Rebuild `xml` with every outermost `w:{name}` element passed through
    /// `edit`, which receives the element and its content range
    fn rewrite_elements<F>(&self, xml: &str, name: &str, edit: F) -> String
    where
        F: Fn(&str, Range<usize>) -> String,
    {
        let elements = self.elements(xml, name);
        if elements.is_empty() {
            return xml.to_string();
        }

        let mut out = String::with_capacity(xml.len());
        let mut last = 0;
        for element in elements {
            out.push_str(&xml[last..element.span.start]);
            let content = element.content.start - element.span.start
                ..element.content.end - element.span.start;
            out.push_str(&edit(&xml[element.span.clone()], content));
            last = element.span.end;
        }
        out.push_str(&xml[last..]);
        out
    }

    /// Replace font family and size inside a run's properties, keeping
    /// schema order (rStyle, rFonts, ..., sz, szCs, ..., rPrChange)
    fn rewrite_properties(&self, props: &str, fonts: &str, size: &str) -> String {
        // rPrChange is always last and describes the previous formatting
        let (head, tail) = match props.find("<w:rPrChange") {
            Some(index) => props.split_at(index),
            None => (props, ""),
        };

        let stripped = self.font_props.replace_all(head, "");

        let with_fonts = match self.style_prop.find(&stripped) {
            Some(m) => format!("{}{}{}", &stripped[..m.end()], fonts, &stripped[m.end()..]),
            None => format!("{fonts}{stripped}"),
        };

        let with_size = match self.after_size.find(&with_fonts) {
            Some(m) => format!("{}{}{}", &with_fonts[..m.start()], size, &with_fonts[m.start()..]),
            None => format!("{with_fonts}{size}"),
        };

        format!("{with_size}{tail}")
    }

    /// Copy `source` to `output`, passing the selected XML parts through `edit`
    fn rewrite_package<F>(
        &self,
        source: &Utf8Path,
        output: &Utf8Path,
        edit: F,
    ) -> Result<(), DocumentError>
    where
        F: Fn(PartKind, &str) -> String,
    {
        let file = File::open(source).map_err(|e| io_error(source, e))?;
        let mut archive =
            ZipArchive::new(BufReader::new(file)).map_err(|e| package_error(source, e))?;

        if archive.by_name(BODY_PART).is_err() {
            return Err(DocumentError::MissingBody(source.to_path_buf()));
        }

        let folder = output
            .parent()
            .filter(|p| !p.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        let mut staged = NamedTempFile::new_in(folder).map_err(|e| io_error(output, e))?;

        {
            let mut writer = ZipWriter::new(&mut staged);

            for index in 0..archive.len() {
                let mut entry = archive
                    .by_index(index)
                    .map_err(|e| package_error(source, e))?;
                let name = entry.name().to_string();

                match PartKind::of(&name) {
                    Some(kind) => {
                        let mut bytes = Vec::new();
                        entry
                            .read_to_end(&mut bytes)
                            .map_err(|e| io_error(source, e))?;
                        let xml = String::from_utf8(bytes).map_err(|_| DocumentError::Encoding {
                            path: source.to_path_buf(),
                            part: name.clone(),
                        })?;

                        let rewritten = edit(kind, &xml);
                        tracing::trace!("Rewrote part {} of {}", name, source);

                        let options = SimpleFileOptions::default()
                            .compression_method(CompressionMethod::Deflated);
                        writer
                            .start_file(name, options)
                            .map_err(|e| package_error(output, e))?;
                        writer
                            .write_all(rewritten.as_bytes())
                            .map_err(|e| io_error(output, e))?;
                    }
                    None => {
                        writer
                            .raw_copy_file(entry)
                            .map_err(|e| package_error(output, e))?;
                    }
                }
            }

            writer.finish().map_err(|e| package_error(output, e))?;
        }

        staged
            .persist(output)
            .map_err(|e| io_error(output, e.error))?;

        tracing::debug!("Wrote {}", output);
        Ok(())
    }
}

impl Default for DocxEditor {
    fn default() -> Self {
        Self::new()
    }
}

fn io_error(path: &Utf8Path, source: std::io::Error) -> DocumentError {
    DocumentError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn package_error(path: &Utf8Path, source: zip::result::ZipError) -> DocumentError {
    DocumentError::Package {
        path: path.to_path_buf(),
        source,
    }
}

/// Replace every non-overlapping match of `old` in the concatenation of
/// `texts`, left to right, without rescanning inserted text
fn replace_across_nodes(texts: &mut [String], changed: &mut [bool], old: &str, new: &str) {
    if old.is_empty() {
        return;
    }

    let mut search_from = 0;
    loop {
        let joined = texts.concat();
        let Some(found) = joined.get(search_from..).and_then(|rest| rest.find(old)) else {
            break;
        };
        let start = search_from + found;
        let end = start + old.len();

        let (Some((first, first_offset)), Some((last, last_offset))) =
            (locate(texts, start), locate(texts, end - 1))
        else {
            break;
        };

        if first == last {
            texts[first].replace_range(first_offset..first_offset + old.len(), new);
        } else {
            texts[first].replace_range(first_offset.., new);
            for index in first + 1..last {
                texts[index].clear();
                changed[index] = true;
            }
            texts[last].replace_range(..last_offset + 1, "");
            changed[last] = true;
        }
        changed[first] = true;

        search_from = start + new.len();
    }
}

/// Node index and byte offset of byte `pos` of the concatenated text
fn locate(texts: &[String], pos: usize) -> Option<(usize, usize)> {
    let mut start = 0;
    for (index, text) in texts.iter().enumerate() {
        if pos < start + text.len() {
            return Some((index, pos - start));
        }
        start += text.len();
    }
    None
}

fn preserve_space(open_tag: &str) -> String {
    if open_tag.contains("xml:space") {
        open_tag.to_string()
    } else {
        format!(r#"<w:t xml:space="preserve"{}"#, &open_tag["<w:t".len()..])
    }
}

/// Decode the escaped text of a `<w:t>` node.
///
/// `None` when the text holds something that cannot be written back as it
/// was: an unknown entity, a stray `&`, or a character reference XML 1.0
/// does not allow (`&#0;`, most control characters).
fn unescape_xml(text: &str) -> Option<String> {
    if !text.contains('&') {
        return Some(text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let semi = tail.find(';')?;
        let entity = &tail[1..semi];
        let ch = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32)
                .filter(|c| is_xml_char(*c))?,
        };
        out.push(ch);
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    Some(out)
}

/// The `Char` production of XML 1.0
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}

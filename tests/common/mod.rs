//! Fixtures shared by the integration tests: scratch folders, minimal DOCX
//! packages, small PDFs and a converter that needs no office suite.

#![allow(dead_code)]

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use docflow::services::{ConversionError, DocumentConverter};
use lopdf::{Document, Object, Stream, dictionary};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const IMAGE_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0, 1, 2, 3, 4, 5];

/// Temporary folder tree removed on drop
pub struct Workspace {
    _guard: TempDir,
    pub root: Utf8PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let guard = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(guard.path().to_path_buf()).unwrap();
        Self {
            _guard: guard,
            root,
        }
    }

    /// Create (if needed) and return a sub-folder
    pub fn dir(&self, name: &str) -> Utf8PathBuf {
        let path = self.root.join(name);
        fs::create_dir_all(&path).unwrap();
        path
    }

    pub fn entries(&self, name: &str) -> usize {
        fs::read_dir(self.root.join(name)).unwrap().count()
    }
}

/// `<w:p>` with one run per text fragment
pub fn paragraph(runs: &[&str]) -> String {
    let runs: String = runs
        .iter()
        .map(|text| format!(r#"<w:r><w:t xml:space="preserve">{text}</w:t></w:r>"#))
        .collect();
    format!("<w:p>{runs}</w:p>")
}

/// `<w:r>` holding a text box with `paragraphs`, in both the drawing and
/// the legacy VML branch the way Word writes it
pub fn text_box(paragraphs: &str) -> String {
    format!(
        concat!(
            r#"<w:r><mc:AlternateContent><mc:Choice Requires="wps"><w:drawing><wp:anchor><a:graphic><a:graphicData>"#,
            r#"<wps:wsp><wps:txbx><w:txbxContent>{0}</w:txbxContent></wps:txbx></wps:wsp>"#,
            r#"</a:graphicData></a:graphic></wp:anchor></w:drawing></mc:Choice><mc:Fallback>"#,
            r#"<w:pict><v:shape><v:textbox><w:txbxContent>{0}</w:txbxContent></v:textbox></v:shape></w:pict>"#,
            r#"</mc:Fallback></mc:AlternateContent></w:r>"#,
        ),
        paragraphs
    )
}

/// Footer paragraph "Page N of M" built from a simple and a complex field
pub fn page_field_footer(label: &str) -> String {
    format!(
        concat!(
            r#"<w:p><w:r><w:t xml:space="preserve">{} </w:t></w:r>"#,
            r#"<w:fldSimple w:instr=" PAGE "><w:r><w:rPr><w:sz w:val="16"/></w:rPr><w:t>1</w:t></w:r></w:fldSimple>"#,
            r#"<w:r><w:t xml:space="preserve"> of </w:t></w:r>"#,
            r#"<w:r><w:fldChar w:fldCharType="begin"/></w:r>"#,
            r#"<w:r><w:instrText xml:space="preserve"> NUMPAGES </w:instrText></w:r>"#,
            r#"<w:r><w:fldChar w:fldCharType="separate"/></w:r>"#,
            r#"<w:r><w:t>2</w:t></w:r>"#,
            r#"<w:r><w:fldChar w:fldCharType="end"/></w:r></w:p>"#,
        ),
        label
    )
}

fn part(root: &str, content: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:{root} xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">{content}</w:{root}>"#
    )
}

/// Write a DOCX package with a body, one header, one footer and an image
pub fn write_docx(path: &Utf8Path, body: &str, header: &str, footer: &str) {
    let file = File::create(path).unwrap();
    let mut writer = ZipWriter::new(file);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    let entries = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#.to_string(),
        ),
        ("word/document.xml", part("document", &format!("<w:body>{body}</w:body>"))),
        ("word/header1.xml", part("hdr", header)),
        ("word/footer1.xml", part("ftr", footer)),
    ];
    for (name, content) in entries {
        writer.start_file(name, deflated).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }

    writer.start_file("word/media/image1.png", stored).unwrap();
    writer.write_all(IMAGE_BYTES).unwrap();
    writer.finish().unwrap();
}

/// Raw bytes of one package entry
pub fn read_entry(path: &Utf8Path, name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).unwrap();
    bytes
}

pub fn read_part(path: &Utf8Path, name: &str) -> String {
    String::from_utf8(read_entry(path, name)).unwrap()
}

pub fn entry_names(path: &Utf8Path) -> Vec<String> {
    let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    archive.file_names().map(str::to_string).collect()
}

/// Minimal PDF with `page_count` pages
pub fn write_pdf(path: &Utf8Path, page_count: usize) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for index in 0..page_count {
        let content = format!("BT /F1 18 Tf 72 720 Td (Page {index}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

pub fn page_count(path: &Utf8Path) -> usize {
    Document::load(path).unwrap().get_pages().len()
}

/// Converter that writes a one-page PDF instead of running an office suite.
///
/// Tracks how many conversions run at once, can fail for one source name and
/// can request cancellation on its first call.
#[derive(Default)]
pub struct FakeConverter {
    pub fail_on: Option<String>,
    pub delay: Duration,
    pub cancel_on_first: Option<watch::Sender<bool>>,
    pub calls: AtomicUsize,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
}

impl FakeConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(name: &str) -> Self {
        Self {
            fail_on: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

#[async_trait]
impl DocumentConverter for FakeConverter {
    async fn ensure_available(&self) -> Result<(), ConversionError> {
        Ok(())
    }

    async fn convert(
        &self,
        source: &Utf8Path,
        out_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, ConversionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if call == 0 {
            if let Some(cancel) = &self.cancel_on_first {
                cancel.send(true).unwrap();
            }
        }

        let name = source.file_name().unwrap_or_default();
        if self.fail_on.as_deref().is_some_and(|fail| name.contains(fail)) {
            return Err(ConversionError::Failed {
                source_name: name.to_string(),
                code: Some(1),
                stderr: "source file could not be loaded".to_string(),
            });
        }

        let pdf = out_dir.join(format!("{}.pdf", source.file_stem().unwrap_or("out")));
        write_pdf(&pdf, 1);
        Ok(pdf)
    }
}

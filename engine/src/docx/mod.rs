//! OOXML document extraction
//!
//! A `.docx` file is a zip package whose body lives in `word/document.xml`.
//! This module walks that XML once and produces two views of the document:
//! the paragraph text in document order, and a per-paragraph formatting
//! report (alignment, font, size) that the grading prompts feed to the
//! model alongside the text.
//!
//! Container-level failures (unreadable archive, missing body part, broken
//! XML) are fatal. Formatting metadata that cannot be decoded is not: the
//! affected field is dropped and a diagnostic line is appended to the
//! report, so one bad attribute never hides the rest of the document.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

/// Errors that make a document unusable as a whole
#[derive(Debug, thiserror::Error)]
pub enum DocxError {
    #[error("Ошибка обработки документа: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ошибка обработки документа: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Ошибка обработки документа: в архиве нет word/document.xml")]
    MissingDocumentPart,

    #[error("Ошибка обработки документа: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// The two views of a document the grading pipeline consumes
#[derive(Debug, Clone, Default)]
pub struct DocumentExtract {
    /// Paragraph texts in document order joined with newlines. Blank
    /// paragraphs stay as empty lines so the model sees the document's
    /// structure.
    pub full_text: String,

    /// One `Текст | Выравнивание | Шрифт | Размер` line per paragraph that
    /// carries text or explicit formatting, plus diagnostic lines for
    /// metadata that failed to decode.
    pub style_report: String,
}

/// Formatting facts collected for a single paragraph
#[derive(Debug, Default)]
struct ParagraphFacts {
    text: String,
    alignment: Option<String>,
    font: Option<String>,
    size_pt: Option<f64>,
}

impl ParagraphFacts {
    /// Render the report line, or `None` when the paragraph contributed
    /// neither text nor formatting.
    fn style_line(&self) -> Option<String> {
        let mut parts = Vec::new();
        if !self.text.is_empty() {
            parts.push(format!("Текст: {}", self.text));
        }
        if let Some(alignment) = &self.alignment {
            parts.push(format!("Выравнивание: {}", alignment));
        }
        if let Some(font) = &self.font {
            parts.push(format!("Шрифт: {}", font));
        }
        if let Some(size) = self.size_pt {
            parts.push(format!("Размер: {}", format_points(size)));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" | "))
        }
    }
}

/// Whole sizes keep a trailing ".0" ("14.0"), halves print as-is ("26.5").
fn format_points(size: f64) -> String {
    if size.fract() == 0.0 {
        format!("{:.1}", size)
    } else {
        format!("{}", size)
    }
}

/// Extract paragraph text and the formatting report from a `.docx` file.
pub fn extract(path: &Path) -> Result<DocumentExtract, DocxError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;

    let mut xml = String::new();
    {
        let mut document = archive.by_name("word/document.xml").map_err(|e| match e {
            zip::result::ZipError::FileNotFound => DocxError::MissingDocumentPart,
            other => DocxError::Archive(other),
        })?;
        document.read_to_string(&mut xml)?;
    }

    extract_from_xml(&xml)
}

fn extract_from_xml(xml: &str) -> Result<DocumentExtract, DocxError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut paragraphs: Vec<String> = Vec::new();
    let mut style_lines: Vec<String> = Vec::new();

    // Walk state. `para` doubles as the "inside <w:p>" flag; `rpr_locked`
    // pins font/size to the first run properties found in the paragraph.
    let mut para: Option<ParagraphFacts> = None;
    let mut in_ppr = false;
    let mut in_run = false;
    let mut in_rpr = false;
    let mut rpr_locked = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"w:p" => {
                    para = Some(ParagraphFacts::default());
                    in_ppr = false;
                    in_run = false;
                    in_rpr = false;
                    rpr_locked = false;
                }
                b"w:pPr" => in_ppr = true,
                b"w:r" if !in_ppr => in_run = true,
                b"w:rPr" if in_run && !rpr_locked => in_rpr = true,
                b"w:t" => in_text = true,
                b"w:tab" => {
                    if let Some(p) = para.as_mut() {
                        p.text.push('\t');
                    }
                }
                b"w:br" => {
                    if let Some(p) = para.as_mut() {
                        p.text.push('\n');
                    }
                }
                other => {
                    if let Some(p) = para.as_mut() {
                        apply_property(e, other, in_ppr, in_rpr, p, &mut style_lines);
                    }
                }
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                // A self-closing paragraph is a complete blank line
                b"w:p" => paragraphs.push(String::new()),
                b"w:rPr" if in_run && !rpr_locked => rpr_locked = true,
                b"w:tab" => {
                    if let Some(p) = para.as_mut() {
                        p.text.push('\t');
                    }
                }
                b"w:br" => {
                    if let Some(p) = para.as_mut() {
                        p.text.push('\n');
                    }
                }
                other => {
                    if let Some(p) = para.as_mut() {
                        apply_property(e, other, in_ppr, in_rpr, p, &mut style_lines);
                    }
                }
            },
            Ok(Event::Text(e)) => {
                if in_text {
                    if let (Some(p), Ok(text)) = (para.as_mut(), e.unescape()) {
                        p.text.push_str(&text);
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:p" => {
                    if let Some(p) = para.take() {
                        paragraphs.push(p.text.clone());
                        if let Some(line) = p.style_line() {
                            style_lines.push(line);
                        }
                    }
                }
                b"w:pPr" => in_ppr = false,
                b"w:r" => in_run = false,
                b"w:rPr" => {
                    if in_rpr {
                        in_rpr = false;
                        rpr_locked = true;
                    }
                }
                b"w:t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(DocxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(DocumentExtract {
        full_text: paragraphs.join("\n"),
        style_report: style_lines.join("\n").trim().to_string(),
    })
}

/// Pick up formatting attributes from property elements. Start and
/// self-closing forms are handled identically.
fn apply_property(
    e: &BytesStart,
    name: &[u8],
    in_ppr: bool,
    in_rpr: bool,
    para: &mut ParagraphFacts,
    style_lines: &mut Vec<String>,
) {
    match name {
        b"w:jc" if in_ppr => {
            if para.alignment.is_none() {
                para.alignment = attr_value(e, b"w:val");
            }
        }
        b"w:rFonts" if in_rpr => {
            if para.font.is_none() {
                para.font = attr_value(e, b"w:ascii");
            }
        }
        b"w:sz" if in_rpr => match attr_value(e, b"w:val").and_then(|v| v.parse::<u32>().ok()) {
            Some(half_points) => para.size_pt = Some(f64::from(half_points) / 2.0),
            None => style_lines.push(
                "Ошибка чтения XML: не удалось разобрать размер шрифта".to_string(),
            ),
        },
        _ => {}
    }
}

fn attr_value(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok())
        .map(|value| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn wrap_body(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        )
    }

    fn write_docx(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("doc.docx");
        let file = File::create(&path).expect("create docx");
        let mut writer = zip::ZipWriter::new(file);
        let options =
            FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        writer
            .start_file("word/document.xml", options)
            .expect("start entry");
        writer
            .write_all(wrap_body(body).as_bytes())
            .expect("write entry");
        writer.finish().expect("finish zip");
        path
    }

    #[test]
    fn test_full_text_keeps_blank_paragraphs() {
        let xml = wrap_body(
            "<w:p><w:r><w:t>Первый</w:t></w:r></w:p><w:p/><w:p><w:r><w:t>Второй</w:t></w:r></w:p>",
        );
        let extract = extract_from_xml(&xml).expect("extract");
        assert_eq!(extract.full_text, "Первый\n\nВторой");
    }

    #[test]
    fn test_run_text_concatenated_in_order() {
        let xml = wrap_body(
            "<w:p><w:r><w:t>Лабораторная </w:t></w:r><w:r><w:t>работа</w:t></w:r></w:p>",
        );
        let extract = extract_from_xml(&xml).expect("extract");
        assert_eq!(extract.full_text, "Лабораторная работа");
        assert_eq!(extract.style_report, "Текст: Лабораторная работа");
    }

    #[test]
    fn test_tabs_and_breaks_inside_runs() {
        let xml = wrap_body("<w:p><w:r><w:t>а</w:t><w:tab/><w:t>б</w:t><w:br/><w:t>в</w:t></w:r></w:p>");
        let extract = extract_from_xml(&xml).expect("extract");
        assert_eq!(extract.full_text, "а\tб\nв");
    }

    #[test]
    fn test_style_line_with_all_components() {
        let xml = wrap_body(
            r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:rPr><w:rFonts w:ascii="Times New Roman"/><w:sz w:val="28"/></w:rPr><w:t>Заголовок</w:t></w:r></w:p>"#,
        );
        let extract = extract_from_xml(&xml).expect("extract");
        assert_eq!(
            extract.style_report,
            "Текст: Заголовок | Выравнивание: center | Шрифт: Times New Roman | Размер: 14.0"
        );
    }

    #[test]
    fn test_half_point_sizes() {
        let xml = wrap_body(
            r#"<w:p><w:r><w:rPr><w:sz w:val="53"/></w:rPr><w:t>х</w:t></w:r></w:p>"#,
        );
        let extract = extract_from_xml(&xml).expect("extract");
        assert_eq!(extract.style_report, "Текст: х | Размер: 26.5");
    }

    #[test]
    fn test_formatting_line_without_text() {
        // Alignment on a blank paragraph still produces a report line,
        // while full_text records the paragraph as an empty line
        let xml = wrap_body(r#"<w:p><w:pPr><w:jc w:val="both"/></w:pPr></w:p>"#);
        let extract = extract_from_xml(&xml).expect("extract");
        assert_eq!(extract.full_text, "");
        assert_eq!(extract.style_report, "Выравнивание: both");
    }

    #[test]
    fn test_first_run_properties_win() {
        let xml = wrap_body(
            r#"<w:p><w:r><w:t>без стиля </w:t></w:r><w:r><w:rPr><w:sz w:val="24"/></w:rPr><w:t>жирный</w:t></w:r><w:r><w:rPr><w:sz w:val="96"/></w:rPr><w:t>!</w:t></w:r></w:p>"#,
        );
        let extract = extract_from_xml(&xml).expect("extract");
        assert_eq!(extract.style_report, "Текст: без стиля жирный! | Размер: 12.0");
    }

    #[test]
    fn test_empty_run_properties_lock_the_paragraph() {
        let xml = wrap_body(
            r#"<w:p><w:r><w:rPr/><w:t>а</w:t></w:r><w:r><w:rPr><w:sz w:val="24"/></w:rPr><w:t>б</w:t></w:r></w:p>"#,
        );
        let extract = extract_from_xml(&xml).expect("extract");
        assert_eq!(extract.style_report, "Текст: аб");
    }

    #[test]
    fn test_paragraph_mark_properties_are_not_run_properties() {
        // w:pPr carries its own w:rPr for the paragraph mark; it must not
        // be mistaken for a run's formatting
        let xml = wrap_body(
            r#"<w:p><w:pPr><w:rPr><w:sz w:val="96"/></w:rPr></w:pPr><w:r><w:rPr><w:sz w:val="24"/></w:rPr><w:t>т</w:t></w:r></w:p>"#,
        );
        let extract = extract_from_xml(&xml).expect("extract");
        assert_eq!(extract.style_report, "Текст: т | Размер: 12.0");
    }

    #[test]
    fn test_malformed_size_degrades_with_diagnostic() {
        let xml = wrap_body(
            r#"<w:p><w:r><w:rPr><w:sz w:val="большой"/></w:rPr><w:t>т</w:t></w:r></w:p><w:p><w:r><w:t>дальше</w:t></w:r></w:p>"#,
        );
        let extract = extract_from_xml(&xml).expect("extract");
        // Extraction continues past the bad attribute
        assert_eq!(extract.full_text, "т\nдальше");
        assert!(extract
            .style_report
            .contains("Ошибка чтения XML: не удалось разобрать размер шрифта"));
        assert!(extract.style_report.contains("Текст: дальше"));
        assert!(!extract.style_report.contains("Размер"));
    }

    #[test]
    fn test_extract_from_zip_package() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_docx(
            dir.path(),
            r#"<w:p><w:pPr><w:jc w:val="right"/></w:pPr><w:r><w:rPr><w:rFonts w:ascii="Arial"/><w:sz w:val="22"/></w:rPr><w:t>Отчет</w:t></w:r></w:p>"#,
        );
        let extract = extract(&path).expect("extract");
        assert_eq!(extract.full_text, "Отчет");
        assert_eq!(
            extract.style_report,
            "Текст: Отчет | Выравнивание: right | Шрифт: Arial | Размер: 11.0"
        );
    }

    #[test]
    fn test_missing_document_part() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.docx");
        let file = File::create(&path).expect("create");
        let mut writer = zip::ZipWriter::new(file);
        let options =
            FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        writer
            .start_file("word/other.xml", options)
            .expect("start entry");
        writer.write_all(b"<x/>").expect("write entry");
        writer.finish().expect("finish zip");

        match extract(&path) {
            Err(DocxError::MissingDocumentPart) => {}
            other => panic!("expected MissingDocumentPart, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_not_a_zip_archive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("plain.docx");
        std::fs::write(&path, b"just text, no archive").expect("write");
        assert!(matches!(extract(&path), Err(DocxError::Archive(_))));
    }

    #[test]
    fn test_format_points() {
        assert_eq!(format_points(14.0), "14.0");
        assert_eq!(format_points(26.5), "26.5");
        assert_eq!(format_points(11.0), "11.0");
    }
}

//! Serializes a [`Deck`] into a `.pptx` package held in memory.

use chrono::{DateTime, Utc};
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::deck::{Deck, Slide};

mod parts;

pub const PPTX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";

/// Suffix of every generated file name.
pub const FILE_SUFFIX: &str = "-AzureUpdates.pptx";

const DOCUMENT_TITLE: &str = "Product updates";

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("zip packaging failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error while packaging: {0}")]
    Io(#[from] std::io::Error),
}

/// A serialized presentation ready for upload.
#[derive(Debug, Clone)]
pub struct RenderedDeck {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// `<YYYY-MM-DD-HH-MM-SS>-AzureUpdates.pptx`
pub fn deck_file_name(generated_at: DateTime<Utc>) -> String {
    format!("{}{}", generated_at.format("%Y-%m-%d-%H-%M-%S"), FILE_SUFFIX)
}

pub fn render(deck: &Deck, generated_at: DateTime<Utc>) -> Result<RenderedDeck, RenderError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, body) in package_parts(deck, generated_at) {
        zip.start_file(name, options)?;
        zip.write_all(body.as_bytes())?;
    }
    let bytes = zip.finish()?.into_inner();

    let file_name = deck_file_name(generated_at);
    debug!(file = %file_name, slides = deck.len(), bytes = bytes.len(), "presentation rendered");

    Ok(RenderedDeck { file_name, bytes })
}

fn package_parts(deck: &Deck, generated_at: DateTime<Utc>) -> Vec<(String, String)> {
    let slides = deck.slides();

    let mut out: Vec<(String, String)> = vec![
        ("[Content_Types].xml".into(), parts::content_types(slides)),
        ("_rels/.rels".into(), parts::root_rels()),
        ("docProps/core.xml".into(), parts::core_props(DOCUMENT_TITLE, generated_at)),
        ("docProps/app.xml".into(), parts::app_props(slides)),
        ("ppt/presentation.xml".into(), parts::presentation(slides.len())),
        ("ppt/_rels/presentation.xml.rels".into(), parts::presentation_rels(slides.len())),
    ];

    let fixed = [
        ("ppt/slideMasters/slideMaster1.xml", parts::SLIDE_MASTER),
        ("ppt/slideMasters/_rels/slideMaster1.xml.rels", parts::SLIDE_MASTER_RELS),
        ("ppt/slideLayouts/slideLayout1.xml", parts::SLIDE_LAYOUT),
        ("ppt/slideLayouts/_rels/slideLayout1.xml.rels", parts::SLIDE_LAYOUT_RELS),
        ("ppt/notesMasters/notesMaster1.xml", parts::NOTES_MASTER),
        ("ppt/notesMasters/_rels/notesMaster1.xml.rels", parts::NOTES_MASTER_RELS),
        ("ppt/theme/theme1.xml", parts::THEME),
        ("ppt/theme/theme2.xml", parts::THEME),
        ("ppt/presProps.xml", parts::PRES_PROPS),
        ("ppt/viewProps.xml", parts::VIEW_PROPS),
        ("ppt/tableStyles.xml", parts::TABLE_STYLES),
    ];
    out.extend(fixed.iter().map(|(name, body)| (name.to_string(), body.to_string())));

    for (i, slide) in slides.iter().enumerate() {
        let n = i + 1;
        out.push((format!("ppt/slides/slide{n}.xml"), parts::slide(slide)));

        match slide {
            Slide::Content(content) => {
                out.push((format!("ppt/slides/_rels/slide{n}.xml.rels"), parts::slide_rels(Some(n))));
                out.push((format!("ppt/notesSlides/notesSlide{n}.xml"), parts::notes_slide(&content.notes)));
                out.push((
                    format!("ppt/notesSlides/_rels/notesSlide{n}.xml.rels"),
                    parts::notes_slide_rels(n),
                ));
            }
            Slide::Empty => {
                out.push((format!("ppt/slides/_rels/slide{n}.xml.rels"), parts::slide_rels(None)));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::{parse_pub_date, Category, UpdateRecord};
    use chrono::TimeZone;
    use std::io::Read;

    fn record(title: &str, link: &str) -> UpdateRecord {
        let raw = "Mon, 01 Jan 2024 00:00:00 Z";
        UpdateRecord {
            title: title.into(),
            link: link.into(),
            published_raw: raw.into(),
            published: parse_pub_date(raw).unwrap(),
            category: Category::classify(title),
        }
    }

    fn read_part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
        let mut file = archive.by_name(name).expect("part present");
        let mut out = String::new();
        file.read_to_string(&mut out).expect("utf-8 part");
        out
    }

    #[test]
    fn file_name_uses_generation_time() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(deck_file_name(at), "2024-03-09-07-05-01-AzureUpdates.pptx");
    }

    #[test]
    fn renders_one_part_per_slide_with_notes_for_content() {
        let deck = Deck::from_records(&[record("Widgets & gadgets GA", "http://x?a=1&b=2")]);
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        let rendered = render(&deck, at).unwrap();
        assert_eq!(rendered.file_name, "2024-01-02-03-04-05-AzureUpdates.pptx");

        let archive = zip::ZipArchive::new(Cursor::new(rendered.bytes.as_slice())).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert!(names.contains(&"ppt/slides/slide1.xml"));
        assert!(names.contains(&"ppt/slides/slide2.xml"));
        assert!(!names.contains(&"ppt/slides/slide3.xml"));
        // empty preview slide has no notes, the GA slide does
        assert!(!names.contains(&"ppt/notesSlides/notesSlide1.xml"));
        assert!(names.contains(&"ppt/notesSlides/notesSlide2.xml"));

        let slide = read_part(&rendered.bytes, "ppt/slides/slide2.xml");
        assert!(slide.contains("<a:t>GA (1)</a:t>"));
        assert!(slide.contains("<a:t>Widgets &amp; gadgets GA</a:t>"));

        let notes = read_part(&rendered.bytes, "ppt/notesSlides/notesSlide2.xml");
        assert!(notes.contains("<a:t>- http://x?a=1&amp;b=2 (Mon, 01 Jan 2024 00:00:00 Z)</a:t>"));

        let types = read_part(&rendered.bytes, "[Content_Types].xml");
        assert!(types.contains("/ppt/notesSlides/notesSlide2.xml"));
        assert!(!types.contains("/ppt/notesSlides/notesSlide1.xml"));
    }
}

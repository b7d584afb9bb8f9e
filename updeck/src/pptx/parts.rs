//! PresentationML part builders. Static parts live in `templates/`.

use chrono::{DateTime, Utc};
use quick_xml::escape::escape;

use crate::deck::{Slide, BULLET_FONT_SIZE_PT};

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const NS_PML: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub const THEME: &str = include_str!("../../templates/theme.xml");
pub const SLIDE_MASTER: &str = include_str!("../../templates/slideMaster1.xml");
pub const SLIDE_MASTER_RELS: &str = include_str!("../../templates/slideMaster1.xml.rels");
pub const SLIDE_LAYOUT: &str = include_str!("../../templates/slideLayout1.xml");
pub const SLIDE_LAYOUT_RELS: &str = include_str!("../../templates/slideLayout1.xml.rels");
pub const NOTES_MASTER: &str = include_str!("../../templates/notesMaster1.xml");
pub const NOTES_MASTER_RELS: &str = include_str!("../../templates/notesMaster1.xml.rels");
pub const PRES_PROPS: &str = include_str!("../../templates/presProps.xml");
pub const VIEW_PROPS: &str = include_str!("../../templates/viewProps.xml");
pub const TABLE_STYLES: &str = include_str!("../../templates/tableStyles.xml");

/// Relationship ids of presentation.xml before the first slide.
const FIXED_PRESENTATION_RELS: usize = 6;

/// Escapes text for element content, dropping characters XML 1.0 cannot carry.
fn xml_text(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| matches!(*c, '\t' | '\n' | '\r') || *c >= ' ')
        .collect();
    escape(cleaned.as_str()).into_owned()
}

pub fn content_types(slides: &[Slide]) -> String {
    let mut out = String::from(XML_DECL);
    out.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
    out.push_str(r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#);
    out.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);

    let fixed = [
        ("/ppt/presentation.xml", "presentationml.presentation.main+xml"),
        ("/ppt/slideMasters/slideMaster1.xml", "presentationml.slideMaster+xml"),
        ("/ppt/slideLayouts/slideLayout1.xml", "presentationml.slideLayout+xml"),
        ("/ppt/notesMasters/notesMaster1.xml", "presentationml.notesMaster+xml"),
        ("/ppt/theme/theme1.xml", "theme+xml"),
        ("/ppt/theme/theme2.xml", "theme+xml"),
        ("/ppt/presProps.xml", "presentationml.presProps+xml"),
        ("/ppt/viewProps.xml", "presentationml.viewProps+xml"),
        ("/ppt/tableStyles.xml", "presentationml.tableStyles+xml"),
        ("/docProps/app.xml", "extended-properties+xml"),
    ];
    for (part, kind) in fixed {
        out.push_str(&format!(
            r#"<Override PartName="{part}" ContentType="application/vnd.openxmlformats-officedocument.{kind}"/>"#
        ));
    }
    out.push_str(r#"<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>"#);

    for (i, slide) in slides.iter().enumerate() {
        let n = i + 1;
        out.push_str(&format!(
            r#"<Override PartName="/ppt/slides/slide{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>"#
        ));
        if matches!(slide, Slide::Content(_)) {
            out.push_str(&format!(
                r#"<Override PartName="/ppt/notesSlides/notesSlide{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.notesSlide+xml"/>"#
            ));
        }
    }

    out.push_str("</Types>");
    out
}

pub fn root_rels() -> String {
    format!(
        r#"{XML_DECL}<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{REL_NS}/officeDocument" Target="ppt/presentation.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/><Relationship Id="rId3" Type="{REL_NS}/extended-properties" Target="docProps/app.xml"/></Relationships>"#
    )
}

pub fn core_props(title: &str, generated_at: DateTime<Utc>) -> String {
    let stamp = generated_at.format("%Y-%m-%dT%H:%M:%SZ");
    let title = xml_text(title);
    format!(
        r#"{XML_DECL}<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:title>{title}</dc:title><dc:creator>updeck</dc:creator><dcterms:created xsi:type="dcterms:W3CDTF">{stamp}</dcterms:created><dcterms:modified xsi:type="dcterms:W3CDTF">{stamp}</dcterms:modified></cp:coreProperties>"#
    )
}

pub fn app_props(slides: &[Slide]) -> String {
    let total = slides.len();
    let notes = slides.iter().filter(|s| matches!(s, Slide::Content(_))).count();
    format!(
        r#"{XML_DECL}<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes"><Application>updeck</Application><Slides>{total}</Slides><Notes>{notes}</Notes></Properties>"#
    )
}

pub fn presentation(slide_count: usize) -> String {
    let ids: String = (0..slide_count)
        .map(|i| {
            format!(
                r#"<p:sldId id="{}" r:id="rId{}"/>"#,
                256 + i,
                FIXED_PRESENTATION_RELS + 1 + i
            )
        })
        .collect();
    format!(
        r#"{XML_DECL}<p:presentation {NS_PML} saveSubsetFonts="1"><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst><p:notesMasterIdLst><p:notesMasterId r:id="rId2"/></p:notesMasterIdLst><p:sldIdLst>{ids}</p:sldIdLst><p:sldSz cx="9144000" cy="6858000" type="screen4x3"/><p:notesSz cx="6858000" cy="9144000"/></p:presentation>"#
    )
}

pub fn presentation_rels(slide_count: usize) -> String {
    let fixed = [
        ("slideMaster", "slideMasters/slideMaster1.xml"),
        ("notesMaster", "notesMasters/notesMaster1.xml"),
        ("theme", "theme/theme1.xml"),
        ("presProps", "presProps.xml"),
        ("viewProps", "viewProps.xml"),
        ("tableStyles", "tableStyles.xml"),
    ];
    debug_assert_eq!(fixed.len(), FIXED_PRESENTATION_RELS);

    let mut out = format!(
        r#"{XML_DECL}<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#
    );
    for (i, (kind, target)) in fixed.iter().enumerate() {
        out.push_str(&relationship(i + 1, kind, target));
    }
    for i in 0..slide_count {
        out.push_str(&relationship(
            FIXED_PRESENTATION_RELS + 1 + i,
            "slide",
            &format!("slides/slide{}.xml", i + 1),
        ));
    }
    out.push_str("</Relationships>");
    out
}

fn relationship(id: usize, kind: &str, target: &str) -> String {
    format!(r#"<Relationship Id="rId{id}" Type="{REL_NS}/{kind}" Target="{target}"/>"#)
}

const GROUP_SHAPE_HEADER: &str = r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#;

fn placeholder(id: u32, name: &str, ph: &str, paragraphs: &str) -> String {
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="{name}"/><p:cNvSpPr><a:spLocks noGrp="1"/></p:cNvSpPr><p:nvPr>{ph}</p:nvPr></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:lstStyle/>{paragraphs}</p:txBody></p:sp>"#
    )
}

fn paragraph(text: &str, size: Option<u32>) -> String {
    let size = size.map(|pt| format!(r#" sz="{}""#, pt * 100)).unwrap_or_default();
    format!(
        r#"<a:p><a:r><a:rPr lang="en-US"{size} dirty="0"/><a:t>{}</a:t></a:r></a:p>"#,
        xml_text(text)
    )
}

const EMPTY_PARAGRAPH: &str = r#"<a:p><a:endParaRPr lang="en-US" dirty="0"/></a:p>"#;

pub fn slide(slide: &Slide) -> String {
    let (title, body) = match slide {
        Slide::Content(content) => (
            paragraph(&content.title, None),
            content
                .bullets
                .iter()
                .map(|b| paragraph(b, Some(BULLET_FONT_SIZE_PT)))
                .collect::<String>(),
        ),
        Slide::Empty => (EMPTY_PARAGRAPH.to_string(), EMPTY_PARAGRAPH.to_string()),
    };

    format!(
        r#"{XML_DECL}<p:sld {NS_PML}><p:cSld><p:spTree>{GROUP_SHAPE_HEADER}{}{}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#,
        placeholder(2, "Title 1", r#"<p:ph type="title"/>"#, &title),
        placeholder(3, "Content Placeholder 2", r#"<p:ph idx="1"/>"#, &body),
    )
}

/// Slide rels; `notes` is the notes-slide number when the slide has notes.
pub fn slide_rels(notes: Option<usize>) -> String {
    let mut out = format!(
        r#"{XML_DECL}<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#
    );
    out.push_str(&relationship(1, "slideLayout", "../slideLayouts/slideLayout1.xml"));
    if let Some(n) = notes {
        out.push_str(&relationship(2, "notesSlide", &format!("../notesSlides/notesSlide{n}.xml")));
    }
    out.push_str("</Relationships>");
    out
}

pub fn notes_slide(lines: &[String]) -> String {
    let paragraphs: String = lines.iter().map(|l| paragraph(l, None)).collect();
    let image = r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="Slide Image Placeholder 1"/><p:cNvSpPr><a:spLocks noGrp="1" noRot="1" noChangeAspect="1"/></p:cNvSpPr><p:nvPr><p:ph type="sldImg"/></p:nvPr></p:nvSpPr><p:spPr/></p:sp>"#;
    format!(
        r#"{XML_DECL}<p:notes {NS_PML}><p:cSld><p:spTree>{GROUP_SHAPE_HEADER}{image}{}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:notes>"#,
        placeholder(3, "Notes Placeholder 2", r#"<p:ph type="body" idx="3"/>"#, &paragraphs),
    )
}

pub fn notes_slide_rels(slide_number: usize) -> String {
    format!(
        r#"{XML_DECL}<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{}{}</Relationships>"#,
        relationship(1, "notesMaster", "../notesMasters/notesMaster1.xml"),
        relationship(2, "slide", &format!("../slides/slide{slide_number}.xml")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_escaped_and_control_chars_dropped() {
        assert_eq!(xml_text("A & <B>\u{1}"), "A &amp; &lt;B&gt;");
    }

    #[test]
    fn presentation_lists_slides_after_fixed_rels() {
        let xml = presentation(2);
        assert!(xml.contains(r#"<p:sldId id="256" r:id="rId7"/>"#));
        assert!(xml.contains(r#"<p:sldId id="257" r:id="rId8"/>"#));

        let rels = presentation_rels(2);
        assert!(rels.contains(r#"Id="rId8""#));
        assert!(rels.contains(r#"Target="slides/slide2.xml""#));
    }

    #[test]
    fn bullets_carry_font_size() {
        let slide = Slide::Content(crate::deck::ContentSlide {
            title: "GA (1)".into(),
            bullets: vec!["One".into()],
            notes: vec!["- http://x (date)".into()],
        });
        let xml = super::slide(&slide);
        assert!(xml.contains(r#"<a:rPr lang="en-US" sz="2400" dirty="0"/><a:t>One</a:t>"#));
        assert!(xml.contains("<a:t>GA (1)</a:t>"));
    }
}

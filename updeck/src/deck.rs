//! Slide pagination: turns update records into titled slides of at most five bullets.

use crate::ingestion::{Category, UpdateRecord};

pub const ITEMS_PER_SLIDE: usize = 5;
/// Bullet font size, in points.
pub const BULLET_FONT_SIZE_PT: u32 = 24;

pub const PREVIEW_SECTION: &str = "Preview";
pub const GA_SECTION: &str = "GA";

/// Up to `ITEMS_PER_SLIDE` consecutive records of one section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideGroup {
    pub section: String,
    /// 1-based position inside the section
    pub number: usize,
    pub records: Vec<UpdateRecord>,
}

impl SlideGroup {
    pub fn title(&self) -> String {
        format!("{} ({})", self.section, self.number)
    }
}

/// Fold state threaded through `paginate`.
struct Pages {
    done: Vec<SlideGroup>,
    current: Vec<UpdateRecord>,
    number: usize,
}

/// Splits `records` into groups of `ITEMS_PER_SLIDE`, preserving order.
/// Every group but the last is full; an empty input yields no groups.
pub fn paginate(section: &str, records: &[UpdateRecord]) -> Vec<SlideGroup> {
    let start = Pages {
        done: Vec::new(),
        current: Vec::with_capacity(ITEMS_PER_SLIDE),
        number: 1,
    };

    let pages = records.iter().fold(start, |mut pages, record| {
        pages.current.push(record.clone());
        if pages.current.len() == ITEMS_PER_SLIDE {
            let records = std::mem::replace(&mut pages.current, Vec::with_capacity(ITEMS_PER_SLIDE));
            pages.done.push(SlideGroup {
                section: section.to_string(),
                number: pages.number,
                records,
            });
            pages.number += 1;
        }
        pages
    });

    let Pages { mut done, current, number } = pages;
    if !current.is_empty() {
        done.push(SlideGroup {
            section: section.to_string(),
            number,
            records: current,
        });
    }
    done
}

/// A titled slide with one bullet and one notes line per record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSlide {
    pub title: String,
    pub bullets: Vec<String>,
    pub notes: Vec<String>,
}

impl From<&SlideGroup> for ContentSlide {
    fn from(group: &SlideGroup) -> Self {
        Self {
            title: group.title(),
            bullets: group.records.iter().map(|r| r.title.clone()).collect(),
            notes: group.records.iter().map(notes_line).collect(),
        }
    }
}

fn notes_line(record: &UpdateRecord) -> String {
    format!("- {} ({})", record.link, record.published_raw)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slide {
    Content(ContentSlide),
    /// Placeholder slide for a section without records
    Empty,
}

/// In-memory presentation, appended to section by section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deck {
    slides: Vec<Slide>,
}

impl Deck {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preview section first, then GA, each in feed order.
    pub fn from_records(records: &[UpdateRecord]) -> Self {
        let (preview, ga): (Vec<UpdateRecord>, Vec<UpdateRecord>) = records
            .iter()
            .cloned()
            .partition(|r| r.category == Category::Preview);

        let mut deck = Self::new();
        deck.add_section(PREVIEW_SECTION, &preview);
        deck.add_section(GA_SECTION, &ga);
        deck
    }

    /// Appends one section and returns how many slides it added.
    pub fn add_section(&mut self, label: &str, records: &[UpdateRecord]) -> usize {
        let groups = paginate(label, records);
        if groups.is_empty() {
            self.slides.push(Slide::Empty);
            return 1;
        }

        let added = groups.len();
        self.slides
            .extend(groups.iter().map(|g| Slide::Content(ContentSlide::from(g))));
        added
    }

    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }
}

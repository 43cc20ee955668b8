use serde::{Deserialize, Serialize};

/// Number of books in the full canon; book indexes are 1-based over this order.
pub const TOTAL_BOOKS: usize = 66;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Testament {
    Old,
    New,
}

impl Testament {
    pub fn tag(self) -> &'static str {
        match self {
            Testament::Old => "OT",
            Testament::New => "NT",
        }
    }

    /// Fixed select color for the Testament property.
    pub fn color(self) -> &'static str {
        match self {
            Testament::Old => "purple",
            Testament::New => "blue",
        }
    }
}

/// Root of the persisted JSON artifact for one Bible version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BibleVersion {
    pub version: String,
    pub ot: Vec<BookRecord>,
    pub nt: Vec<BookRecord>,
}

impl BibleVersion {
    /// All books in global order, old testament first.
    pub fn books(&self) -> impl Iterator<Item = (Testament, &BookRecord)> {
        self.ot
            .iter()
            .map(|b| (Testament::Old, b))
            .chain(self.nt.iter().map(|b| (Testament::New, b)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BookRecord {
    #[serde(rename = "bookName")]
    pub name: String,
    pub chapters: Vec<ChapterRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChapterRecord {
    pub title: String,
    pub verses: Vec<VerseRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerseRecord {
    #[serde(rename = "verse")]
    pub number: u32,
    pub text: String,
}

impl ChapterRecord {
    /// Build a chapter from extracted verse texts, numbering them from 1.
    pub fn from_texts(title: String, texts: Vec<String>) -> Self {
        let verses = texts
            .into_iter()
            .zip(1u32..)
            .map(|(text, number)| VerseRecord { number, text })
            .collect();
        ChapterRecord { title, verses }
    }
}

/// One book as listed on the catalog page.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub testament: Testament,
    pub name: String,
    pub chapter_urls: Vec<String>,
}

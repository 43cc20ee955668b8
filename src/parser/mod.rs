pub mod catalog;
pub mod chapter;
pub mod normalize;

use crate::error::Result;
use crate::model::ChapterRecord;

/// Chapter page → verse texts → normalized verses → chapter record.
pub fn process_chapter(html: &str, book_name: &str, chapter: u32) -> Result<ChapterRecord> {
    let texts = chapter::extract_chapter(html, chapter)?
        .iter()
        .map(|text| normalize::normalize_verse(text))
        .collect();
    Ok(ChapterRecord::from_texts(
        format!("{} {}", book_name, chapter),
        texts,
    ))
}

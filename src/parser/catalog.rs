use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::error::{Error, Result};
use crate::model::{CatalogEntry, Testament, TOTAL_BOOKS};

static OT_BOOK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr.ot-book").unwrap());
static NT_BOOK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr.nt-book").unwrap());
static BOOK_NAME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td.book-name").unwrap());
static NUM_CHAPTERS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.num-chapters").unwrap());
static CHAPTERS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td.chapters").unwrap());
static CHAPTER_LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Resolve the book listing page into catalog entries, old testament first,
/// document order within each testament. Chapter hrefs are returned as found.
pub fn resolve_catalog(html: &str) -> Result<Vec<CatalogEntry>> {
    let document = Html::parse_document(html);
    let mut entries = Vec::with_capacity(TOTAL_BOOKS);

    for (testament, selector) in [(Testament::Old, &*OT_BOOK), (Testament::New, &*NT_BOOK)] {
        for row in document.select(selector) {
            entries.push(parse_book_row(row, testament)?);
        }
    }

    if entries.len() != TOTAL_BOOKS {
        return Err(Error::StructureMismatch(format!(
            "expected {} books in catalog, found {}",
            TOTAL_BOOKS,
            entries.len()
        )));
    }

    Ok(entries)
}

fn parse_book_row(row: ElementRef, testament: Testament) -> Result<CatalogEntry> {
    let name_cell = row.select(&BOOK_NAME).next().ok_or_else(|| {
        Error::StructureMismatch(format!("{} book row without a name cell", testament.tag()))
    })?;
    let name = book_name(name_cell)?;

    let declared = declared_chapters(name_cell, &name)?;

    let chapters_cell = row.select(&CHAPTERS).next().ok_or_else(|| {
        Error::StructureMismatch(format!("{}: no chapter list", name))
    })?;
    let chapter_urls: Vec<String> = chapters_cell
        .select(&CHAPTER_LINK)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
        .collect();

    if chapter_urls.len() != declared {
        return Err(Error::StructureMismatch(format!(
            "{}: declares {} chapters but lists {} links",
            name,
            declared,
            chapter_urls.len()
        )));
    }

    Ok(CatalogEntry {
        testament,
        name,
        chapter_urls,
    })
}

/// The book name is the one non-blank text node directly under the name cell;
/// nested spans (chapter count, icons) are not part of it.
fn book_name(cell: ElementRef) -> Result<String> {
    let texts: Vec<&str> = cell
        .children()
        .filter_map(|node| node.value().as_text())
        .map(|text| text.trim())
        .filter(|text| !text.is_empty())
        .collect();

    match texts.as_slice() {
        [name] => Ok(name.to_string()),
        [] => Err(Error::StructureMismatch("empty book name".into())),
        many => Err(Error::StructureMismatch(format!(
            "ambiguous book name, {} text nodes: {:?}",
            many.len(),
            many
        ))),
    }
}

fn declared_chapters(cell: ElementRef, name: &str) -> Result<usize> {
    let raw: String = cell
        .select(&NUM_CHAPTERS)
        .next()
        .map(|span| span.text().collect())
        .ok_or_else(|| Error::MetadataMissing(format!("{}: no declared chapter count", name)))?;

    raw.trim().parse().map_err(|_| {
        Error::MetadataMissing(format!("{}: unreadable chapter count {:?}", name, raw.trim()))
    })
}

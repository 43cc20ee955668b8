use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::model::{BibleVersion, BookRecord, ChapterRecord, Testament};

pub const MAX_SPANS_PER_BLOCK: usize = 100;
pub const MAX_BLOCKS_PER_REQUEST: usize = 1000;
pub const MAX_SPAN_CHARS: usize = 2000;
pub const MAX_REQUEST_BYTES: usize = 500 * 1024;

// Rough serialized cost of the JSON wrapped around span content, a paragraph
// block, and the page properties.
const SPAN_OVERHEAD_BYTES: usize = 80;
const BLOCK_OVERHEAD_BYTES: usize = 64;
const REQUEST_OVERHEAD_BYTES: usize = 1024;

/// Select colors assigned to books cyclically by book index.
pub const BOOK_PALETTE: [&str; 9] = [
    "gray", "brown", "orange", "yellow", "green", "blue", "purple", "pink", "red",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RichTextSpan {
    pub content: String,
    pub bold: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub spans: Vec<RichTextSpan>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub title: String,
    pub chapter: u32,
    pub book_name: String,
    /// 1-based position in the full book order, old testament first.
    pub book_index: usize,
    pub testament: Testament,
    pub color: &'static str,
    pub blocks: Vec<Block>,
}

/// All requests for one book, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub struct BookBatch {
    pub book_index: usize,
    pub name: String,
    pub requests: Vec<CreateRequest>,
}

#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    pub max_blocks: usize,
    pub max_bytes: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        RequestLimits {
            max_blocks: MAX_BLOCKS_PER_REQUEST,
            max_bytes: MAX_REQUEST_BYTES,
        }
    }
}

pub fn book_color(book_index: usize) -> &'static str {
    BOOK_PALETTE[book_index % BOOK_PALETTE.len()]
}

/// Two spans per verse: the bold number label, then the body. Every body but
/// the chapter's last keeps a trailing space so the paragraph reads as prose.
pub fn verse_spans(chapter: &ChapterRecord) -> Result<Vec<RichTextSpan>> {
    let last = chapter.verses.len().saturating_sub(1);
    let mut spans = Vec::with_capacity(chapter.verses.len() * 2);

    for (i, verse) in chapter.verses.iter().enumerate() {
        let body = if i == last {
            verse.text.clone()
        } else {
            format!("{} ", verse.text)
        };
        if body.chars().count() > MAX_SPAN_CHARS {
            return Err(Error::PayloadLimit(format!(
                "{} verse {} is {} characters, limit is {}",
                chapter.title,
                verse.number,
                body.chars().count(),
                MAX_SPAN_CHARS
            )));
        }
        spans.push(RichTextSpan {
            content: format!("{} ", verse.number),
            bold: true,
        });
        spans.push(RichTextSpan {
            content: body,
            bold: false,
        });
    }

    Ok(spans)
}

pub fn group_blocks(spans: Vec<RichTextSpan>) -> Vec<Block> {
    spans
        .chunks(MAX_SPANS_PER_BLOCK)
        .map(|chunk| Block {
            spans: chunk.to_vec(),
        })
        .collect()
}

/// Partition blocks in order, closing a group when it would exceed either the
/// block count or the estimated payload size.
pub fn group_requests(blocks: Vec<Block>, limits: RequestLimits) -> Vec<Vec<Block>> {
    let mut groups = Vec::new();
    let mut current: Vec<Block> = Vec::new();
    let mut current_bytes = REQUEST_OVERHEAD_BYTES;

    for block in blocks {
        let size = estimated_bytes(&block);
        let full = current.len() >= limits.max_blocks
            || (!current.is_empty() && current_bytes + size > limits.max_bytes);
        if full {
            groups.push(std::mem::take(&mut current));
            current_bytes = REQUEST_OVERHEAD_BYTES;
        }
        current_bytes += size;
        current.push(block);
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

fn estimated_bytes(block: &Block) -> usize {
    BLOCK_OVERHEAD_BYTES
        + block
            .spans
            .iter()
            .map(|s| {
                let escapes = s.content.chars().filter(|c| matches!(c, '"' | '\\')).count();
                s.content.len() + escapes + SPAN_OVERHEAD_BYTES
            })
            .sum::<usize>()
}

pub fn batch_book(
    book: &BookRecord,
    book_index: usize,
    testament: Testament,
    limits: RequestLimits,
) -> Result<Vec<CreateRequest>> {
    let mut requests = Vec::new();

    for (chapter, record) in (1u32..).zip(&book.chapters) {
        let blocks = group_blocks(verse_spans(record)?);
        for group in group_requests(blocks, limits) {
            requests.push(CreateRequest {
                title: record.title.clone(),
                chapter,
                book_name: book.name.clone(),
                book_index,
                testament,
                color: book_color(book_index),
                blocks: group,
            });
        }
    }

    Ok(requests)
}

/// Batch every book of a version. Books are independent so they are batched
/// in parallel; the result keeps global book order.
pub fn batch_version(bible: &BibleVersion, limits: RequestLimits) -> Result<Vec<BookBatch>> {
    let books: Vec<(usize, Testament, &BookRecord)> = bible
        .books()
        .enumerate()
        .map(|(i, (testament, book))| (i + 1, testament, book))
        .collect();

    books
        .par_iter()
        .map(|&(book_index, testament, book)| -> Result<BookBatch> {
            Ok(BookBatch {
                book_index,
                name: book.name.clone(),
                requests: batch_book(book, book_index, testament, limits)?,
            })
        })
        .collect()
}

use std::collections::HashMap;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::error::{Error, Result};

static PASSAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.passage-text").unwrap());
/// Footnote markers, cross references, verse numbers and the drop-cap chapter number.
static DECORATION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("sup, span.chapternum").unwrap());
static SMALL_CAPS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.small-caps").unwrap());
static HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4, h5, h6").unwrap());

const OSIS_ATTR: &str = "data-osis";

#[derive(Debug, Clone, PartialEq)]
pub struct PassageMeta {
    pub abbreviation: String,
    pub verse_count: u32,
}

/// Extract the verse texts of one chapter page, in verse order.
///
/// The returned vector always has exactly `verse_count` entries. A verse with
/// no text fragment fails the chapter rather than leaving a hole.
pub fn extract_chapter(html: &str, chapter: u32) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let container = document
        .select(&PASSAGE)
        .next()
        .ok_or_else(|| Error::StructureMismatch("no passage container on chapter page".into()))?;

    let meta = read_passage_meta(container)?;
    let prefix = format!("{}-{}-", meta.abbreviation, chapter);
    let mut fragments = collect_fragments(container, &prefix);

    (1..=meta.verse_count)
        .map(|verse| {
            let key = format!("{}{}", prefix, verse);
            let parts = fragments.remove(&key).unwrap_or_default();
            let text = parts
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if text.is_empty() {
                Err(Error::StructureMismatch(format!(
                    "no text for verse {} ({} declared)",
                    key, meta.verse_count
                )))
            } else {
                Ok(text)
            }
        })
        .collect()
}

/// Parse the dotted identifier on the passage container, e.g. `Gen.1.31`:
/// the first segment is the book abbreviation, the last the verse count.
pub fn read_passage_meta(container: ElementRef) -> Result<PassageMeta> {
    let id = container.value().attr(OSIS_ATTR).ok_or_else(|| {
        Error::MetadataMissing(format!("passage container has no {} attribute", OSIS_ATTR))
    })?;

    let mut segments = id.split('.').map(str::trim);
    let abbreviation = segments.next().unwrap_or_default().to_string();
    if abbreviation.is_empty() {
        return Err(Error::MetadataMissing(format!(
            "empty book abbreviation in {:?}",
            id
        )));
    }

    let verse_count = segments
        .last()
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|&n| n > 0)
        .ok_or_else(|| Error::MetadataMissing(format!("no verse count in {:?}", id)))?;

    Ok(PassageMeta {
        abbreviation,
        verse_count,
    })
}

/// Group fragment texts by their `{abbrev}-{chapter}-{verse}` class token,
/// keeping document order within each verse.
fn collect_fragments(container: ElementRef, prefix: &str) -> HashMap<String, Vec<String>> {
    let mut fragments: HashMap<String, Vec<String>> = HashMap::new();

    for element in container.descendants().filter_map(ElementRef::wrap) {
        let Some(key) = element.value().classes().find(|c| c.starts_with(prefix)) else {
            continue;
        };
        if inside_excluded(element, key) {
            continue;
        }
        let mut text = String::new();
        collect_text(element, SMALL_CAPS.matches(&element), &mut text);
        fragments.entry(key.to_string()).or_default().push(text);
    }

    fragments
}

/// Headings and decorations never contribute verse text, and a fragment nested
/// in another fragment of the same verse was already read with its parent.
fn inside_excluded(element: ElementRef, key: &str) -> bool {
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .any(|el| HEADING.matches(&el) || DECORATION.matches(&el))
        || element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|el| el.value().classes().any(|c| c == key))
}

fn collect_text(element: ElementRef, upper: bool, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            if upper {
                out.push_str(&text.to_uppercase());
            } else {
                out.push_str(text);
            }
        } else if let Some(child) = ElementRef::wrap(child) {
            if DECORATION.matches(&child) {
                continue;
            }
            collect_text(child, upper || SMALL_CAPS.matches(&child), out);
        }
    }
}

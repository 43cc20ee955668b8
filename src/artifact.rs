use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::error::Error;
use crate::model::{BibleVersion, BookRecord, ChapterRecord};

pub fn artifact_path(data_dir: &Path, version: &str) -> PathBuf {
    data_dir.join(format!("{}.json", version))
}

pub fn save(path: &Path, bible: &BibleVersion) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(bible)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Saved {} ({} books) to {}", bible.version, bible.ot.len() + bible.nt.len(), path.display());
    Ok(())
}

/// Read and validate an artifact. Any schema violation is fatal.
pub fn load(path: &Path) -> Result<BibleVersion> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let bible = parse(&json).with_context(|| format!("Invalid artifact {}", path.display()))?;
    Ok(bible)
}

pub fn parse(json: &str) -> Result<BibleVersion, Error> {
    let bible: BibleVersion =
        serde_json::from_str(json).map_err(|e| Error::SchemaValidation(e.to_string()))?;
    validate(&bible)?;
    Ok(bible)
}

pub fn validate(bible: &BibleVersion) -> Result<(), Error> {
    if bible.version.trim().is_empty() {
        return Err(Error::SchemaValidation("empty version".into()));
    }
    for (testament, book) in bible.books() {
        validate_book(book)
            .map_err(|m| Error::SchemaValidation(format!("{} {:?}: {}", testament.tag(), book.name, m)))?;
    }
    Ok(())
}

fn validate_book(book: &BookRecord) -> Result<(), String> {
    if book.name.trim().is_empty() {
        return Err("empty book name".into());
    }
    if book.chapters.is_empty() {
        return Err("no chapters".into());
    }
    for (i, chapter) in book.chapters.iter().enumerate() {
        validate_chapter(chapter).map_err(|m| format!("chapter {}: {}", i + 1, m))?;
    }
    Ok(())
}

fn validate_chapter(chapter: &ChapterRecord) -> Result<(), String> {
    if chapter.title.trim().is_empty() {
        return Err("empty title".into());
    }
    if chapter.verses.is_empty() {
        return Err("no verses".into());
    }
    for (expected, verse) in (1u32..).zip(&chapter.verses) {
        if verse.number != expected {
            return Err(format!("verse {} found where {} expected", verse.number, expected));
        }
        if verse.text.trim().is_empty() {
            return Err(format!("verse {} has no text", verse.number));
        }
    }
    Ok(())
}

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use crate::artifact;
use crate::config::Config;
use crate::model::{BibleVersion, BookRecord, CatalogEntry, Testament};
use crate::parser;
use crate::source::{fetch_catalog, PageSource};

/// Scrape each version into its artifact. A version that fails is logged and
/// skipped; the others still run, and the call fails at the end naming them.
pub async fn scrape_versions<S>(source: &S, config: &Config, versions: &[String]) -> Result<()>
where
    S: PageSource + ?Sized,
{
    let mut failed = Vec::new();

    for version in versions {
        let catalog_url = config.catalog_url(version);
        println!("Scraping {} from {}...", version, catalog_url);
        match scrape_version(source, version, &catalog_url).await {
            Ok(bible) => {
                let path = artifact::artifact_path(&config.data_dir, version);
                artifact::save(&path, &bible)?;
                println!("Saved {} to {}", version, path.display());
            }
            Err(e) => {
                error!("Scraping {} failed: {:#}", version, e);
                failed.push(version.as_str());
            }
        }
    }

    if !failed.is_empty() {
        bail!(
            "{} of {} versions failed: {}",
            failed.len(),
            versions.len(),
            failed.join(", ")
        );
    }
    Ok(())
}

/// Scrape one Bible version: catalog first, then every chapter of every book,
/// strictly in order. Any extraction failure aborts this version.
pub async fn scrape_version<S>(source: &S, version: &str, catalog_url: &str) -> Result<BibleVersion>
where
    S: PageSource + ?Sized,
{
    let catalog = fetch_catalog(source, catalog_url).await?;
    let total_chapters: usize = catalog.iter().map(|e| e.chapter_urls.len()).sum();

    let pb = ProgressBar::new(total_chapters as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut bible = BibleVersion {
        version: version.to_string(),
        ot: Vec::new(),
        nt: Vec::new(),
    };

    for entry in &catalog {
        pb.set_message(entry.name.clone());
        let book = scrape_book(source, entry, &pb).await?;
        match entry.testament {
            Testament::Old => bible.ot.push(book),
            Testament::New => bible.nt.push(book),
        }
    }

    pb.finish_and_clear();
    info!(
        "Scraped {}: {} books, {} chapters",
        version,
        bible.ot.len() + bible.nt.len(),
        total_chapters
    );
    Ok(bible)
}

async fn scrape_book<S>(source: &S, entry: &CatalogEntry, pb: &ProgressBar) -> Result<BookRecord>
where
    S: PageSource + ?Sized,
{
    let mut chapters = Vec::with_capacity(entry.chapter_urls.len());

    for (number, url) in (1u32..).zip(&entry.chapter_urls) {
        let html = source.fetch_html(url).await?;
        let chapter = parser::process_chapter(&html, &entry.name, number)
            .with_context(|| format!("{} chapter {} ({})", entry.name, number, url))?;
        chapters.push(chapter);
        pb.inc(1);
    }

    Ok(BookRecord {
        name: entry.name.clone(),
        chapters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use anyhow::anyhow;
    use async_trait::async_trait;

    const SITE: &str = "https://bible.test";

    /// Serves canned pages by URL.
    struct CannedSite {
        pages: HashMap<String, String>,
    }

    #[async_trait]
    impl PageSource for CannedSite {
        async fn fetch_html(&self, url: &str) -> Result<String> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow!("HTTP 404 Not Found: GET {}", url))
        }
    }

    /// A 66-book catalog for `version`, one chapter per book, plus its chapter pages.
    fn add_version(pages: &mut HashMap<String, String>, version: &str) {
        let mut rows = String::new();
        for i in 1..=66 {
            let class = if i <= 39 { "ot-book" } else { "nt-book" };
            let href = format!("/passage/{}/b{}/1", version, i);
            rows.push_str(&format!(
                r#"<tr class="{class}"><td class="book-name">Book {i}<span class="num-chapters">1</span></td><td class="chapters"><a href="{href}">1</a></td></tr>"#
            ));
            pages.insert(
                format!("{}{}", SITE, href),
                format!(
                    r#"<div class="passage-text" data-osis="B{i}.1.2"><span class="text B{i}-1-1">First of book {i}.</span> <span class="text B{i}-1-2">Second.</span></div>"#
                ),
            );
        }
        pages.insert(
            format!("{}/versions/{}/", SITE, version),
            format!("<table><tbody>{}</tbody></table>", rows),
        );
    }

    fn config(dir: &std::path::Path) -> Config {
        Config {
            catalog_url_template: format!("{}/versions/{{version}}/", SITE),
            data_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn failed_version_does_not_stop_the_next() {
        let mut pages = HashMap::new();
        add_version(&mut pages, "KJV");
        // catalog exists but lists no books
        pages.insert(
            format!("{}/versions/BROKEN/", SITE),
            "<html><body><p>Page moved</p></body></html>".to_string(),
        );
        let site = CannedSite { pages };
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let versions = vec!["BROKEN".to_string(), "KJV".to_string()];
        let err = scrape_versions(&site, &config, &versions).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("1 of 2 versions failed"), "{}", message);
        assert!(message.contains("BROKEN"), "{}", message);
        assert!(!message.contains("KJV"), "{}", message);

        let kjv = artifact::load(&artifact::artifact_path(dir.path(), "KJV")).unwrap();
        assert_eq!(kjv.ot.len(), 39);
        assert_eq!(kjv.nt.len(), 27);
        assert_eq!(kjv.nt[0].name, "Book 40");
        assert_eq!(kjv.ot[0].chapters[0].title, "Book 1 1");
        assert_eq!(kjv.ot[0].chapters[0].verses[1].text, "Second.");
        assert!(!artifact::artifact_path(dir.path(), "BROKEN").exists());
    }

    #[tokio::test]
    async fn all_versions_succeed() {
        let mut pages = HashMap::new();
        add_version(&mut pages, "KJV");
        add_version(&mut pages, "ASV");
        let site = CannedSite { pages };
        let dir = tempfile::tempdir().unwrap();

        let versions = vec!["KJV".to_string(), "ASV".to_string()];
        scrape_versions(&site, &config(dir.path()), &versions)
            .await
            .unwrap();
        assert!(artifact::artifact_path(dir.path(), "ASV").exists());
    }

    #[tokio::test]
    async fn missing_chapter_page_fails_the_version() {
        let mut pages = HashMap::new();
        add_version(&mut pages, "KJV");
        pages.remove(&format!("{}/passage/KJV/b12/1", SITE));
        let site = CannedSite { pages };

        let err = scrape_version(&site, "KJV", &format!("{}/versions/KJV/", SITE))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/passage/KJV/b12/1"));
    }
}

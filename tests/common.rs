//! Common test utilities and fixtures
//!
//! Shared functionality used across all test modules.
// Common test utilities and fixtures - all must be public

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tempfile::TempDir;

use hondana::prelude::*;

/// Creates a throwaway store root; removed when the returned guard drops.
#[allow(dead_code)]
pub fn temp_root() -> TempDir {
    tempfile::tempdir().unwrap()
}

/// Builds a metadata document with the given title and finished flag.
#[allow(dead_code)]
pub fn metadata(title: &str, finished: bool) -> MangaMetadata {
    MangaMetadata {
        title: title.to_string(),
        is_finished: finished,
        ..Default::default()
    }
}

/// Writes `count` page images named 1..=count into a chapter.
#[allow(dead_code)]
pub async fn put_pages(chapter: &Chapter, count: usize) {
    for page in 1..=count {
        chapter
            .put_image(&page.to_string(), "png", format!("page-{}", page).as_bytes())
            .await
            .unwrap();
    }
}

/// Polls a condition every 10ms and panics after five seconds.
#[allow(dead_code)]
pub async fn wait_for<F>(mut condition: F, what: &str)
where
    F: FnMut() -> bool,
{
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Polls an async condition every 10ms and panics after five seconds.
#[allow(dead_code)]
pub async fn wait_for_async<F, Fut>(mut condition: F, what: &str)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// A fully scripted in-memory source for driving the download engine.
///
/// Listings, page lists and image bytes are registered up front; failures
/// and delays can be injected per manga or per image URL. Every fetch is
/// counted so tests can assert how often the engine really called out.
/// Clones share the same script.
#[allow(dead_code)]
#[derive(Clone)]
pub struct ScriptedSource {
    inner: Arc<ScriptedInner>,
}

struct ScriptedInner {
    id: String,
    mangas: Mutex<HashMap<String, SourceManga>>,
    pages: Mutex<HashMap<(String, String), Vec<String>>>,
    images: Mutex<HashMap<String, Bytes>>,
    failing_listings: Mutex<HashSet<String>>,
    image_failures: Mutex<HashMap<String, usize>>,
    image_delay: Mutex<Duration>,
    listing_fetches: Mutex<HashMap<String, usize>>,
    content_fetches: Mutex<HashMap<(String, String), usize>>,
    image_fetches: Mutex<HashMap<String, usize>>,
}

#[allow(dead_code)]
impl ScriptedSource {
    pub fn new(id: &str) -> Self {
        Self {
            inner: Arc::new(ScriptedInner {
                id: id.to_string(),
                mangas: Mutex::new(HashMap::new()),
                pages: Mutex::new(HashMap::new()),
                images: Mutex::new(HashMap::new()),
                failing_listings: Mutex::new(HashSet::new()),
                image_failures: Mutex::new(HashMap::new()),
                image_delay: Mutex::new(Duration::ZERO),
                listing_fetches: Mutex::new(HashMap::new()),
                content_fetches: Mutex::new(HashMap::new()),
                image_fetches: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Registers a manga listing with no chapters and no cover.
    pub fn add_manga(&self, manga_id: &str, title: &str) {
        self.inner.mangas.lock().insert(
            manga_id.to_string(),
            SourceManga {
                id: manga_id.to_string(),
                title: title.to_string(),
                ..Default::default()
            },
        );
    }

    /// Gives a registered manga a cover URL and bytes behind it.
    pub fn add_cover(&self, manga_id: &str) -> String {
        let url = format!("scripted://{}/{}/cover.jpg", self.inner.id, manga_id);
        if let Some(manga) = self.inner.mangas.lock().get_mut(manga_id) {
            manga.cover_url = Some(url.clone());
        }
        self.inner
            .images
            .lock()
            .insert(url.clone(), Bytes::from_static(b"cover-bytes"));
        url
    }

    /// Appends a chapter with `page_count` pages to a registered manga and
    /// returns the page URLs.
    pub fn add_chapter(
        &self,
        manga_id: &str,
        collection: &str,
        chapter_id: &str,
        page_count: usize,
    ) -> Vec<String> {
        if let Some(manga) = self.inner.mangas.lock().get_mut(manga_id) {
            manga.chapters.push(SourceChapter {
                id: chapter_id.to_string(),
                collection: collection.to_string(),
                title: format!("Chapter {}", chapter_id),
            });
        }

        let urls: Vec<String> = (1..=page_count)
            .map(|page| {
                format!(
                    "scripted://{}/{}/{}/{}.png",
                    self.inner.id, manga_id, chapter_id, page
                )
            })
            .collect();

        {
            let mut images = self.inner.images.lock();
            for url in &urls {
                images.insert(url.clone(), Bytes::from(format!("img:{}", url)));
            }
        }
        self.inner
            .pages
            .lock()
            .insert((manga_id.to_string(), chapter_id.to_string()), urls.clone());
        urls
    }

    /// Makes every listing fetch for the manga fail.
    pub fn fail_listing(&self, manga_id: &str) {
        self.inner
            .failing_listings
            .lock()
            .insert(manga_id.to_string());
    }

    /// Makes the next `times` fetches of an image URL fail.
    pub fn fail_image_times(&self, url: &str, times: usize) {
        self.inner
            .image_failures
            .lock()
            .insert(url.to_string(), times);
    }

    /// Delays every image fetch, to keep a download in flight while the
    /// test pokes at the queue.
    pub fn set_image_delay(&self, delay: Duration) {
        *self.inner.image_delay.lock() = delay;
    }

    pub fn listing_fetches(&self, manga_id: &str) -> usize {
        *self
            .inner
            .listing_fetches
            .lock()
            .get(manga_id)
            .unwrap_or(&0)
    }

    pub fn content_fetches(&self, manga_id: &str, chapter_id: &str) -> usize {
        *self
            .inner
            .content_fetches
            .lock()
            .get(&(manga_id.to_string(), chapter_id.to_string()))
            .unwrap_or(&0)
    }

    pub fn image_fetches(&self, url: &str) -> usize {
        *self.inner.image_fetches.lock().get(url).unwrap_or(&0)
    }

    pub fn total_image_fetches(&self) -> usize {
        self.inner.image_fetches.lock().values().sum()
    }
}

#[async_trait]
impl Source for ScriptedSource {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn lang(&self) -> &str {
        "en"
    }

    async fn manga(&self, manga_id: &str) -> Result<SourceManga> {
        *self
            .inner
            .listing_fetches
            .lock()
            .entry(manga_id.to_string())
            .or_insert(0) += 1;

        if self.inner.failing_listings.lock().contains(manga_id) {
            return Err(Error::source(
                self.inner.id.clone(),
                format!("listing unavailable for {}", manga_id),
            ));
        }

        self.inner
            .mangas
            .lock()
            .get(manga_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Manga {}", manga_id)))
    }

    async fn content(&self, manga_id: &str, chapter_id: &str) -> Result<Vec<String>> {
        *self
            .inner
            .content_fetches
            .lock()
            .entry((manga_id.to_string(), chapter_id.to_string()))
            .or_insert(0) += 1;

        self.inner
            .pages
            .lock()
            .get(&(manga_id.to_string(), chapter_id.to_string()))
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Chapter {}/{}", manga_id, chapter_id)))
    }

    async fn image(&self, url: &str) -> Result<SourceImage> {
        let delay = *self.inner.image_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        *self
            .inner
            .image_fetches
            .lock()
            .entry(url.to_string())
            .or_insert(0) += 1;

        {
            let mut failures = self.inner.image_failures.lock();
            if let Some(remaining) = failures.get_mut(url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(Error::source(
                        self.inner.id.clone(),
                        format!("injected failure for {}", url),
                    ));
                }
            }
        }

        let bytes = self
            .inner
            .images
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Image {}", url)))?;

        Ok(SourceImage {
            mime: "image/png".to_string(),
            bytes,
        })
    }
}

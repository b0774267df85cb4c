//! Background download engine for tracked manga.
//!
//! The [`Downloader`] owns one queue per registered source and routes every
//! call by source id. Each queue downloads one manga at a time; within a
//! manga, chapters run sequentially and the images of a chapter are fetched
//! with bounded parallelism. Queue state lives in memory only, so a restart
//! starts with empty queues until [`Downloader::update_library`] repopulates
//! them from disk.
//!
//! # Examples
//!
//! ```rust
//! use hondana::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let manager = LibraryManager::new("/var/lib/hondana");
//! let mut sources = Sources::new();
//! // sources.add(MangaDexSource::new());
//!
//! let downloader = Downloader::new(&sources, &manager).await?;
//! downloader.add_manga("mangadex", "manga-id").await?;
//!
//! for task in downloader.tasks() {
//!     println!("{}: {:?}", task.title, task.state);
//! }
//! # Ok(())
//! # }
//! ```

mod worker;

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::fsutil;
use crate::source::Sources;
use crate::store::LibraryManager;

use worker::Worker;

/// State of one tracked manga inside its source's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Queued behind other mangas of the same source.
    Waiting,
    /// Currently at the head of the queue and being downloaded.
    Downloading,
    /// Withdrawn from the queue, either explicitly or after a failure.
    Paused,
}

/// State of one chapter inside a manga's download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterState {
    /// Not reached yet by the chapter loop.
    Waiting,
    /// Images are being fetched right now.
    Downloading,
    /// Every image of the chapter is on disk and the chapter is finished.
    Done,
    /// At least one image could not be fetched.
    Failed,
    /// Excluded from the download by the caller.
    Cancelled,
}

/// Live progress of one chapter within a download task.
///
/// # Fields
///
/// * `collection_id` - Collection the chapter belongs to, empty for flat mangas
/// * `id` - Chapter id as reported by the source
/// * `title` - Human-readable chapter title
/// * `state` - Current chapter state
/// * `fetched` - Number of images already on disk
/// * `total` - Number of images the chapter has, 0 until the page list is known
#[derive(Debug, Clone, Serialize)]
pub struct ChapterProgress {
    pub collection_id: String,
    pub id: String,
    pub title: String,
    pub state: ChapterState,
    pub fetched: usize,
    pub total: usize,
}

/// Snapshot of one tracked manga, as exposed by [`Downloader::tasks`].
///
/// # Fields
///
/// * `source_id` - Source the manga is downloaded from
/// * `manga_id` - Manga id within that source
/// * `title` - Title from the source listing, the manga id until it is known
/// * `cover_url` - Remote cover URL once the listing has been fetched
/// * `state` - Queue state of the manga
/// * `chapters` - Per-chapter progress, empty until the listing is known
#[derive(Debug, Clone, Serialize)]
pub struct DownloadTask {
    pub source_id: String,
    pub manga_id: String,
    pub title: String,
    pub cover_url: Option<String>,
    pub state: TaskState,
    pub chapters: Vec<ChapterProgress>,
}

/// Tuning knobs for the download engine.
///
/// The defaults match the intended production behavior: five images in
/// flight per chapter, three attempts per image with a fixed one-second
/// backoff between attempts.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Maximum number of concurrent image fetches within one chapter.
    pub parallel_images: usize,
    /// Total attempts per image before it counts as failed.
    pub image_attempts: u32,
    /// Fixed delay between attempts for the same image.
    pub retry_backoff: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            parallel_images: 5,
            image_attempts: 3,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Extracts an image file extension from a URL.
///
/// Query parameters and fragments are ignored. Only known image extensions
/// are accepted; anything else returns `None` so the caller can fall back to
/// the response content type.
///
/// # Parameters
///
/// * `url` - The URL to extract the extension from
///
/// # Examples
///
/// ```rust
/// use hondana::download::extract_extension;
///
/// assert_eq!(
///     extract_extension("https://cdn.example.com/pages/1.jpg"),
///     Some("jpg".to_string())
/// );
/// assert_eq!(
///     extract_extension("https://cdn.example.com/pages/1.PNG?v=2"),
///     Some("png".to_string())
/// );
/// assert_eq!(extract_extension("https://cdn.example.com/pages/1"), None);
/// ```
pub fn extract_extension(url: &str) -> Option<String> {
    // Remove query parameters and fragments
    let clean_url = url.split('?').next()?.split('#').next()?;
    let name = clean_url.rsplit('/').next()?;

    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }

    let ext = ext.to_lowercase();
    if fsutil::IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(ext)
    } else {
        None
    }
}

/// The download engine: one queue per registered source.
///
/// `Downloader` is constructed once from the registered [`Sources`] and a
/// [`LibraryManager`], creating each source's library directory on the way.
/// Every operation is routed by source id and is a no-op when the source is
/// unknown; none of them blocks on network work.
///
/// # Examples
///
/// ```rust
/// use hondana::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let manager = LibraryManager::new("/var/lib/hondana");
/// let sources = Sources::new();
///
/// let downloader = Downloader::new(&sources, &manager).await?;
/// downloader.add_manga("mangadex", "manga-id").await?;
/// downloader.cancel_manga("mangadex", "manga-id");
/// # Ok(())
/// # }
/// ```
pub struct Downloader {
    workers: HashMap<String, Worker>,
}

impl Downloader {
    /// Creates a downloader with default options.
    ///
    /// # Parameters
    ///
    /// * `sources` - The registered sources, one worker is created per source
    /// * `manager` - The library store the workers download into
    ///
    /// # Errors
    ///
    /// * [`Error::Io`] - If a source's library directory cannot be created
    pub async fn new(sources: &Sources, manager: &LibraryManager) -> Result<Self> {
        Self::with_options(sources, manager, DownloadOptions::default()).await
    }

    /// Creates a downloader with custom options.
    ///
    /// # Parameters
    ///
    /// * `sources` - The registered sources, one worker is created per source
    /// * `manager` - The library store the workers download into
    /// * `options` - Parallelism and retry tuning shared by all workers
    ///
    /// # Errors
    ///
    /// * [`Error::Io`] - If a source's library directory cannot be created
    pub async fn with_options(
        sources: &Sources,
        manager: &LibraryManager,
        options: DownloadOptions,
    ) -> Result<Self> {
        let mut workers = HashMap::new();
        for source in sources.iter() {
            let library = manager.create_library(source.id()).await?;
            workers.insert(
                source.id().to_string(),
                Worker::new(source.clone(), library, options.clone()),
            );
        }

        Ok(Self { workers })
    }

    /// Starts tracking a manga for download.
    ///
    /// The local manga directory is created immediately, the download itself
    /// runs in the background. Adding a manga that is already tracked does
    /// nothing. Unknown source ids are ignored.
    ///
    /// # Parameters
    ///
    /// * `source_id` - The source to download from
    /// * `manga_id` - The manga id within that source
    ///
    /// # Errors
    ///
    /// * [`Error::IllegalId`] - If the manga id is not usable as a directory name
    /// * [`Error::Io`] - If the manga directory cannot be created
    pub async fn add_manga(&self, source_id: &str, manga_id: &str) -> Result<()> {
        if let Some(worker) = self.workers.get(source_id) {
            worker.add(manga_id).await?;
        }
        Ok(())
    }

    /// Stops tracking a manga, cancelling its download if one is running.
    ///
    /// Already downloaded content stays on disk. Unknown source ids are
    /// ignored.
    pub fn remove_manga(&self, source_id: &str, manga_id: &str) {
        if let Some(worker) = self.workers.get(source_id) {
            worker.remove(manga_id);
        }
    }

    /// Resumes one paused manga of a source.
    pub fn start_manga(&self, source_id: &str, manga_id: &str) {
        if let Some(worker) = self.workers.get(source_id) {
            worker.start(manga_id);
        }
    }

    /// Pauses one manga of a source, cancelling its download if it is the
    /// one currently running.
    pub fn cancel_manga(&self, source_id: &str, manga_id: &str) {
        if let Some(worker) = self.workers.get(source_id) {
            worker.pause(manga_id);
        }
    }

    /// Resumes every paused manga of a source.
    pub fn start_all(&self, source_id: &str) {
        if let Some(worker) = self.workers.get(source_id) {
            worker.start_all();
        }
    }

    /// Pauses every manga of a source, cancelling the running download.
    pub fn cancel_all(&self, source_id: &str) {
        if let Some(worker) = self.workers.get(source_id) {
            worker.pause_all();
        }
    }

    /// Re-includes a previously cancelled chapter of a tracked manga.
    pub fn start_chapter(&self, source_id: &str, manga_id: &str, chapter_id: &str) {
        if let Some(worker) = self.workers.get(source_id) {
            worker.start_chapter(manga_id, chapter_id);
        }
    }

    /// Excludes a chapter of a tracked manga from being downloaded.
    ///
    /// The chapter keeps whatever images it already has; the chapter loop
    /// skips it as long as it stays cancelled.
    pub fn cancel_chapter(&self, source_id: &str, manga_id: &str, chapter_id: &str) {
        if let Some(worker) = self.workers.get(source_id) {
            worker.cancel_chapter(manga_id, chapter_id);
        }
    }

    /// Rescans one source's library and enqueues every unfinished manga.
    ///
    /// Mangas whose cached metadata marks them finished are skipped, as are
    /// paused ones. Unknown source ids are ignored.
    ///
    /// # Errors
    ///
    /// * [`Error::Io`] - If the library directory cannot be listed
    pub async fn update_library(&self, source_id: &str) -> Result<()> {
        if let Some(worker) = self.workers.get(source_id) {
            worker.update_library().await?;
        }
        Ok(())
    }

    /// Runs [`update_library`](Downloader::update_library) for every source.
    ///
    /// # Errors
    ///
    /// * [`Error::Io`] - If a library directory cannot be listed
    pub async fn update_all_libraries(&self) -> Result<()> {
        for worker in self.workers.values() {
            worker.update_library().await?;
        }
        Ok(())
    }

    /// Returns a snapshot of every tracked manga across all sources.
    ///
    /// The snapshot is ordered by source id, then manga id, so successive
    /// calls render stably.
    pub fn tasks(&self) -> Vec<DownloadTask> {
        let mut tasks: Vec<DownloadTask> = self
            .workers
            .values()
            .flat_map(|worker| worker.tasks())
            .collect();
        tasks.sort_by(|a, b| {
            a.source_id
                .cmp(&b.source_id)
                .then_with(|| a.manga_id.cmp(&b.manga_id))
        });
        tasks
    }

    /// Deletes a manga from the store, cancelling its download first.
    ///
    /// The worker shares the manga directory with the store, so the deletion
    /// order matters: the task is removed before the directory goes away.
    ///
    /// # Parameters
    ///
    /// * `source_id` - The source whose library holds the manga
    /// * `manga_id` - The manga to delete
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`] - If the source is not registered or the manga
    ///   does not exist
    /// * [`Error::Io`] - If the directory cannot be removed
    pub async fn delete_manga(&self, source_id: &str, manga_id: &str) -> Result<()> {
        let worker = self.workers.get(source_id).ok_or_else(|| {
            Error::not_found(format!("Source {:?} is not registered", source_id))
        })?;

        worker.remove(manga_id);
        worker.library().delete_manga(manga_id).await
    }
}

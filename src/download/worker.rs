//! Per-source download queue and its run loop.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::source::Source;
use crate::store::{Chapter, Library, Manga};
use crate::types::{MangaMetadata, SourceChapter, SourceImage, SourceManga};

use super::{
    ChapterProgress, ChapterState, DownloadOptions, DownloadTask, TaskState, extract_extension,
};

/// One download queue, bound to a single source and its library.
///
/// `Worker` is a cheap clonable handle; clones share the queue. All
/// structural state sits behind one mutex and no lock is ever held across
/// an await, so every queue mutation is serialized with the run loop's own
/// bookkeeping. The run loop is at most one spawned task; it exits when the
/// queue drains and is relaunched lazily.
#[derive(Clone)]
pub(crate) struct Worker {
    inner: Arc<WorkerInner>,
}

struct WorkerInner {
    source: Arc<dyn Source>,
    library: Library,
    options: DownloadOptions,
    state: Mutex<QueueState>,
}

struct QueueState {
    waiting: VecDeque<String>,
    paused: HashSet<String>,
    active: Option<ActiveDownload>,
    loop_running: bool,
    tasks: HashMap<String, DownloadTask>,
}

struct ActiveDownload {
    manga_id: String,
    /// Set once the download task is spawned; a cancel that arrives in the
    /// window before that only flips `cancel_requested`.
    abort: Option<AbortHandle>,
    cancel_requested: bool,
}

enum DownloadOutcome {
    /// Every chapter that was not skipped succeeded.
    Completed,
    /// The manga directory disappeared locally; the task is dropped.
    Vanished,
}

impl Worker {
    pub(crate) fn new(source: Arc<dyn Source>, library: Library, options: DownloadOptions) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                source,
                library,
                options,
                state: Mutex::new(QueueState {
                    waiting: VecDeque::new(),
                    paused: HashSet::new(),
                    active: None,
                    loop_running: false,
                    tasks: HashMap::new(),
                }),
            }),
        }
    }

    pub(crate) fn library(&self) -> &Library {
        &self.inner.library
    }

    fn source_id(&self) -> &str {
        self.inner.source.id()
    }

    /// Starts tracking a manga: upserts its local directory and queues it.
    ///
    /// No-op when the manga is already tracked in any state. When the new
    /// entry is not the queue head, a best-effort metadata/cover prefetch is
    /// spawned so listing data shows up before the queue reaches it.
    pub(crate) async fn add(&self, manga_id: &str) -> Result<()> {
        if self.inner.state.lock().tasks.contains_key(manga_id) {
            return Ok(());
        }

        // Validates the id and creates the directory before any queue change
        self.inner.library.create_manga(manga_id).await?;

        let prefetch = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if state.tasks.contains_key(manga_id) {
                return Ok(());
            }
            state.waiting.push_back(manga_id.to_string());
            state
                .tasks
                .insert(manga_id.to_string(), self.new_task(manga_id));
            state.active.is_some() || state.waiting.len() > 1
        };

        self.ensure_running();
        if prefetch {
            let worker = self.clone();
            let id = manga_id.to_string();
            tokio::spawn(async move {
                worker.prefetch(&id).await;
            });
        }

        Ok(())
    }

    /// Moves a paused manga back to the tail of the queue.
    pub(crate) fn start(&self, manga_id: &str) {
        {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if !state.paused.remove(manga_id) {
                return;
            }
            state.waiting.push_back(manga_id.to_string());
            if let Some(task) = state.tasks.get_mut(manga_id) {
                task.state = TaskState::Waiting;
            }
        }
        self.ensure_running();
    }

    /// Moves every paused manga back to the queue, in id order.
    pub(crate) fn start_all(&self) {
        {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let mut ids: Vec<String> = state.paused.drain().collect();
            ids.sort();
            for id in ids {
                if let Some(task) = state.tasks.get_mut(&id) {
                    task.state = TaskState::Waiting;
                }
                state.waiting.push_back(id);
            }
        }
        self.ensure_running();
    }

    /// Pauses a manga, aborting its download if it is the active one.
    pub(crate) fn pause(&self, manga_id: &str) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        if let Some(pos) = state.waiting.iter().position(|id| id == manga_id) {
            state.waiting.remove(pos);
            state.paused.insert(manga_id.to_string());
            if let Some(task) = state.tasks.get_mut(manga_id) {
                task.state = TaskState::Paused;
            }
            return;
        }

        if let Some(active) = state.active.as_mut() {
            if active.manga_id == manga_id {
                active.cancel_requested = true;
                if let Some(abort) = active.abort.take() {
                    abort.abort();
                }
                state.paused.insert(manga_id.to_string());
                if let Some(task) = state.tasks.get_mut(manga_id) {
                    task.state = TaskState::Paused;
                }
            }
        }
    }

    /// Pauses everything: drains the queue and aborts the active download.
    pub(crate) fn pause_all(&self) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        while let Some(id) = state.waiting.pop_front() {
            if let Some(task) = state.tasks.get_mut(&id) {
                task.state = TaskState::Paused;
            }
            state.paused.insert(id);
        }

        if let Some(active) = state.active.as_mut() {
            active.cancel_requested = true;
            if let Some(abort) = active.abort.take() {
                abort.abort();
            }
            if let Some(task) = state.tasks.get_mut(&active.manga_id) {
                task.state = TaskState::Paused;
            }
            state.paused.insert(active.manga_id.clone());
        }
    }

    /// Drops a manga from the queue, the paused set and the task views,
    /// aborting its download if it is the active one.
    pub(crate) fn remove(&self, manga_id: &str) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        if let Some(pos) = state.waiting.iter().position(|id| id == manga_id) {
            state.waiting.remove(pos);
        }
        state.paused.remove(manga_id);
        state.tasks.remove(manga_id);

        if let Some(active) = state.active.as_mut() {
            if active.manga_id == manga_id {
                active.cancel_requested = true;
                if let Some(abort) = active.abort.take() {
                    abort.abort();
                }
            }
        }
    }

    /// Re-includes a cancelled chapter in the download.
    pub(crate) fn start_chapter(&self, manga_id: &str, chapter_id: &str) {
        self.update_chapter(manga_id, chapter_id, |chapter| {
            if chapter.state == ChapterState::Cancelled {
                chapter.state = ChapterState::Waiting;
            }
        });
    }

    /// Excludes a chapter from the download. Chapters already done or in
    /// flight are left alone.
    pub(crate) fn cancel_chapter(&self, manga_id: &str, chapter_id: &str) {
        self.update_chapter(manga_id, chapter_id, |chapter| {
            if matches!(chapter.state, ChapterState::Waiting | ChapterState::Failed) {
                chapter.state = ChapterState::Cancelled;
            }
        });
    }

    /// Rescans the library and queues every manga not marked finished,
    /// skipping paused and already tracked ones.
    pub(crate) async fn update_library(&self) -> Result<()> {
        let mangas = self.inner.library.mangas().await?;

        let mut enqueued = 0usize;
        for manga in mangas {
            match manga.metadata().await {
                Ok(metadata) if metadata.is_finished => continue,
                Ok(_) => {}
                Err(error) if error.is_not_found() => {}
                Err(error) => {
                    debug!(
                        source = self.source_id(),
                        manga = manga.id(),
                        %error,
                        "unreadable metadata, treating manga as unfinished"
                    );
                }
            }

            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if state.paused.contains(manga.id()) || state.tasks.contains_key(manga.id()) {
                continue;
            }
            state.waiting.push_back(manga.id().to_string());
            state
                .tasks
                .insert(manga.id().to_string(), self.new_task(manga.id()));
            enqueued += 1;
        }

        if enqueued > 0 {
            debug!(
                source = self.source_id(),
                enqueued, "library update queued unfinished mangas"
            );
        }
        self.ensure_running();
        Ok(())
    }

    /// Snapshot of this worker's task views.
    pub(crate) fn tasks(&self) -> Vec<DownloadTask> {
        self.inner.state.lock().tasks.values().cloned().collect()
    }

    fn new_task(&self, manga_id: &str) -> DownloadTask {
        DownloadTask {
            source_id: self.source_id().to_string(),
            manga_id: manga_id.to_string(),
            title: manga_id.to_string(),
            cover_url: None,
            state: TaskState::Waiting,
            chapters: Vec::new(),
        }
    }

    /// Spawns the run loop unless it is already running or has nothing to do.
    fn ensure_running(&self) {
        {
            let mut guard = self.inner.state.lock();
            if guard.loop_running || guard.waiting.is_empty() {
                return;
            }
            guard.loop_running = true;
        }

        let worker = self.clone();
        tokio::spawn(async move {
            worker.run().await;
        });
    }

    async fn run(&self) {
        loop {
            let manga_id = {
                let mut guard = self.inner.state.lock();
                let state = &mut *guard;
                match state.waiting.pop_front() {
                    Some(id) => {
                        // The active slot is claimed in the same critical
                        // section that pops the head, so a pause arriving now
                        // already sees the manga as active.
                        state.active = Some(ActiveDownload {
                            manga_id: id.clone(),
                            abort: None,
                            cancel_requested: false,
                        });
                        if let Some(task) = state.tasks.get_mut(&id) {
                            task.state = TaskState::Downloading;
                        }
                        id
                    }
                    None => {
                        state.loop_running = false;
                        return;
                    }
                }
            };

            debug!(source = self.source_id(), manga = %manga_id, "download starting");

            let worker = self.clone();
            let id = manga_id.clone();
            let handle = tokio::spawn(async move { worker.download_manga(&id).await });

            {
                let mut guard = self.inner.state.lock();
                if let Some(active) = guard.active.as_mut() {
                    if active.cancel_requested {
                        handle.abort();
                    } else {
                        active.abort = Some(handle.abort_handle());
                    }
                }
            }

            let outcome = handle.await;

            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            state.active = None;
            match outcome {
                Ok(Ok(DownloadOutcome::Completed)) => {
                    debug!(source = self.source_id(), manga = %manga_id, "download finished");
                    state.paused.remove(&manga_id);
                    state.tasks.remove(&manga_id);
                }
                Ok(Ok(DownloadOutcome::Vanished)) => {
                    debug!(
                        source = self.source_id(),
                        manga = %manga_id,
                        "manga no longer exists locally, dropping task"
                    );
                    state.paused.remove(&manga_id);
                    state.tasks.remove(&manga_id);
                }
                Ok(Err(error)) => {
                    warn!(
                        source = self.source_id(),
                        manga = %manga_id,
                        %error,
                        "download failed, pausing manga"
                    );
                    if let Some(task) = state.tasks.get_mut(&manga_id) {
                        task.state = TaskState::Paused;
                        state.paused.insert(manga_id.clone());
                    }
                }
                Err(join_error) if join_error.is_cancelled() => {
                    // Pause or removal already recorded the new state
                }
                Err(join_error) => {
                    warn!(
                        source = self.source_id(),
                        manga = %manga_id,
                        %join_error,
                        "download task panicked, pausing manga"
                    );
                    if let Some(task) = state.tasks.get_mut(&manga_id) {
                        task.state = TaskState::Paused;
                        state.paused.insert(manga_id.clone());
                    }
                }
            }
        }
    }

    /// Best-effort listing fetch for a queued manga: caches metadata and
    /// cover if absent and fills the task view. Failures are logged and
    /// otherwise ignored.
    async fn prefetch(&self, manga_id: &str) {
        let listing = match self.inner.source.manga(manga_id).await {
            Ok(listing) => listing,
            Err(error) => {
                debug!(
                    source = self.source_id(),
                    manga = manga_id,
                    %error,
                    "listing prefetch failed"
                );
                return;
            }
        };

        match self.inner.library.manga(manga_id).await {
            Ok(manga) => {
                if let Err(error) = self.cache_listing(&manga, &listing).await {
                    debug!(
                        source = self.source_id(),
                        manga = manga_id,
                        %error,
                        "prefetch cache write failed"
                    );
                }
            }
            // Removed in the meantime
            Err(_) => return,
        }

        let mut guard = self.inner.state.lock();
        if let Some(task) = guard.tasks.get_mut(manga_id) {
            task.title = listing.title.clone();
            task.cover_url = listing.cover_url.clone();
            if task.state == TaskState::Waiting && task.chapters.is_empty() {
                task.chapters = listing.chapters.iter().map(chapter_progress).collect();
            }
        }
    }

    /// Downloads one manga: listing, metadata/cover cache, then every
    /// chapter in listing order. Chapter failures are collected so the rest
    /// of the manga still downloads; the first failure is reported at the
    /// end.
    async fn download_manga(&self, manga_id: &str) -> Result<DownloadOutcome> {
        let manga = match self.inner.library.manga(manga_id).await {
            Ok(manga) => manga,
            Err(error) if error.is_not_found() => return Ok(DownloadOutcome::Vanished),
            Err(error) => return Err(error),
        };

        let listing = self.inner.source.manga(manga_id).await?;
        self.cache_listing(&manga, &listing).await?;

        {
            let mut guard = self.inner.state.lock();
            if let Some(task) = guard.tasks.get_mut(manga_id) {
                task.title = listing.title.clone();
                task.cover_url = listing.cover_url.clone();
                merge_chapter_list(&mut task.chapters, &listing.chapters);
            }
        }

        let mut first_failure: Option<Error> = None;

        for info in &listing.chapters {
            if self.chapter_cancelled(manga_id, &info.id) {
                debug!(
                    source = self.source_id(),
                    manga = manga_id,
                    chapter = %info.id,
                    "chapter cancelled, skipping"
                );
                continue;
            }

            if let Err(error) = self.download_chapter(&manga, manga_id, info).await {
                warn!(
                    source = self.source_id(),
                    manga = manga_id,
                    chapter = %info.id,
                    %error,
                    "chapter download failed"
                );
                self.set_chapter_state(manga_id, &info.id, ChapterState::Failed);
                if first_failure.is_none() {
                    first_failure = Some(error);
                }
            }
        }

        match first_failure {
            None => Ok(DownloadOutcome::Completed),
            Some(error) => Err(error),
        }
    }

    /// Downloads the missing images of one chapter and marks it finished
    /// when all of them are on disk. Chapters already finished are skipped
    /// without touching the source.
    async fn download_chapter(
        &self,
        manga: &Manga,
        manga_id: &str,
        info: &SourceChapter,
    ) -> Result<()> {
        let chapter = manga.create_chapter(&info.collection, &info.id).await?;

        if chapter.is_finished().await? {
            self.set_chapter_state(manga_id, &info.id, ChapterState::Done);
            return Ok(());
        }

        let urls = self.inner.source.content(manga_id, &info.id).await?;
        let existing: HashSet<String> = chapter.image_ids().await?.into_iter().collect();

        // Pages are named by their 1-based position in the URL list
        let missing: Vec<(usize, String)> = urls
            .iter()
            .enumerate()
            .map(|(index, url)| (index + 1, url.clone()))
            .filter(|(page, _)| !existing.contains(&page.to_string()))
            .collect();

        self.update_chapter(manga_id, &info.id, |progress| {
            progress.state = ChapterState::Downloading;
            progress.total = urls.len();
            progress.fetched = urls.len() - missing.len();
        });

        let chapter_ref = &chapter;
        let results: Vec<(usize, Result<()>)> = stream::iter(missing)
            .map(|(page, url)| async move {
                let result = self
                    .download_image(manga_id, chapter_ref, &info.id, page, &url)
                    .await;
                (page, result)
            })
            .buffer_unordered(self.inner.options.parallel_images)
            .collect()
            .await;

        let mut first_error: Option<Error> = None;
        for (page, result) in results {
            if let Err(error) = result {
                warn!(
                    source = self.source_id(),
                    manga = manga_id,
                    chapter = %info.id,
                    page,
                    %error,
                    "image download failed"
                );
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }

        chapter.mark_finished().await?;
        self.set_chapter_state(manga_id, &info.id, ChapterState::Done);
        Ok(())
    }

    /// Fetches one image and writes it into the chapter directory.
    async fn download_image(
        &self,
        manga_id: &str,
        chapter: &Chapter,
        chapter_id: &str,
        page: usize,
        url: &str,
    ) -> Result<()> {
        let image = self.fetch_with_retry(url).await?;
        let extension = image_extension(url, &image);
        chapter
            .put_image(&page.to_string(), &extension, &image.bytes)
            .await?;
        self.update_chapter(manga_id, chapter_id, |progress| progress.fetched += 1);
        Ok(())
    }

    /// Fetches an image with a fixed number of attempts and a fixed delay
    /// between them. Only the final error is returned.
    async fn fetch_with_retry(&self, url: &str) -> Result<SourceImage> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.inner.source.image(url).await {
                Ok(image) => return Ok(image),
                Err(error) => {
                    if attempt >= self.inner.options.image_attempts {
                        return Err(error);
                    }
                    debug!(
                        source = self.source_id(),
                        url,
                        attempt,
                        %error,
                        "image fetch failed, retrying"
                    );
                    tokio::time::sleep(self.inner.options.retry_backoff).await;
                }
            }
        }
    }

    /// Writes listing metadata and cover into the store, but only where the
    /// store has nothing yet. Caller edits are never overwritten.
    async fn cache_listing(&self, manga: &Manga, listing: &SourceManga) -> Result<()> {
        if !manga.has_metadata().await? {
            manga.set_metadata(&MangaMetadata::from(listing)).await?;
        }

        if !manga.has_cover().await? {
            if let Some(url) = listing.cover_url.as_deref() {
                let image = self.fetch_with_retry(url).await?;
                let extension = image_extension(url, &image);
                manga.set_cover(&extension, &image.bytes).await?;
            }
        }

        Ok(())
    }

    fn chapter_cancelled(&self, manga_id: &str, chapter_id: &str) -> bool {
        self.inner
            .state
            .lock()
            .tasks
            .get(manga_id)
            .and_then(|task| task.chapters.iter().find(|c| c.id == chapter_id))
            .is_some_and(|chapter| chapter.state == ChapterState::Cancelled)
    }

    fn set_chapter_state(&self, manga_id: &str, chapter_id: &str, state: ChapterState) {
        self.update_chapter(manga_id, chapter_id, |chapter| chapter.state = state);
    }

    fn update_chapter<F>(&self, manga_id: &str, chapter_id: &str, update: F)
    where
        F: FnOnce(&mut ChapterProgress),
    {
        let mut guard = self.inner.state.lock();
        if let Some(chapter) = guard
            .tasks
            .get_mut(manga_id)
            .and_then(|task| task.chapters.iter_mut().find(|c| c.id == chapter_id))
        {
            update(chapter);
        }
    }
}

fn chapter_progress(info: &SourceChapter) -> ChapterProgress {
    ChapterProgress {
        collection_id: info.collection.clone(),
        id: info.id.clone(),
        title: info.title.clone(),
        state: ChapterState::Waiting,
        fetched: 0,
        total: 0,
    }
}

/// Rebuilds a task's chapter list from a fresh listing, keeping the state
/// of chapters that were already tracked so cancellations survive.
fn merge_chapter_list(chapters: &mut Vec<ChapterProgress>, listing: &[SourceChapter]) {
    let merged = listing
        .iter()
        .map(|info| match chapters.iter().find(|c| c.id == info.id) {
            Some(existing) => existing.clone(),
            None => chapter_progress(info),
        })
        .collect();
    *chapters = merged;
}

/// Picks the stored file extension for a fetched image: the URL's own
/// extension wins, then the response content type, then `jpg`.
fn image_extension(url: &str, image: &SourceImage) -> String {
    extract_extension(url)
        .or_else(|| image.extension().map(str::to_string))
        .unwrap_or_else(|| "jpg".to_string())
}

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use serde_json::Value;
use tokio::fs;
use tracing::warn;

use crate::error::{Error, Result};
use crate::filter::SearchEntry;
use crate::fsutil;
use crate::types::{
    ChapterOverrides, ChapterSummary, Collection, Depth, Image, MangaDetail, MangaMetadata,
};

use super::chapter::Chapter;
use super::{CHAPTER_METADATA_FILE, COVER_STEM, METADATA_FILE, UNFINISHED_MARKER};

/// Handle to one manga directory.
///
/// A manga owns a `metadata.json` document, an optional cover image, an
/// optional `chapters.json` override document, and its chapter directories.
/// The chapter layout is not declared anywhere; [`Manga::detail`] infers it
/// from what is on disk.
///
/// # Examples
///
/// ```rust,no_run
/// use hondana::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let manager = LibraryManager::new("/data/manga");
/// let manga = manager.manga("mangadex", "one-piece").await?;
///
/// let detail = manga.detail().await?;
/// println!("{}: {} collections", detail.title, detail.collections.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Manga {
    library_id: String,
    id: String,
    path: PathBuf,
}

impl Manga {
    pub(crate) fn new(library_id: String, id: String, path: PathBuf) -> Self {
        Self {
            library_id,
            id,
            path,
        }
    }

    /// Directory name of this manga.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Owning library id.
    pub fn library_id(&self) -> &str {
        &self.library_id
    }

    /// Absolute path of the manga directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stable pagination key, `<library>/<manga>`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.library_id, self.id)
    }

    /// Reads the persisted metadata document.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`] - If no `metadata.json` exists
    /// * [`Error::Json`] - If the document is malformed
    pub async fn metadata(&self) -> Result<MangaMetadata> {
        match self.try_metadata().await? {
            Some(metadata) => Ok(metadata),
            None => Err(Error::not_found(format!(
                "Metadata for manga {:?} in library {:?}",
                self.id, self.library_id
            ))),
        }
    }

    /// Reads the metadata document if one exists.
    async fn try_metadata(&self) -> Result<Option<MangaMetadata>> {
        let bytes = match fs::read(self.path.join(METADATA_FILE)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Whether a `metadata.json` exists.
    pub async fn has_metadata(&self) -> Result<bool> {
        Ok(fs::try_exists(self.path.join(METADATA_FILE)).await?)
    }

    /// Writes the metadata document atomically.
    pub async fn set_metadata(&self, metadata: &MangaMetadata) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(metadata)?;
        fsutil::write_atomic(&self.path.join(METADATA_FILE), &bytes).await
    }

    /// Reads the cover image.
    ///
    /// A file with the stem `cover` wins; without one, the naturally-first
    /// image in the manga directory serves as the cover.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`] - If the directory holds no image at all
    pub async fn cover(&self) -> Result<Image> {
        let files = fsutil::list_sorted_images(&self.path).await?;
        let name = files
            .iter()
            .find(|f| fsutil::file_stem(f) == COVER_STEM)
            .or_else(|| files.first())
            .ok_or_else(|| {
                Error::not_found(format!(
                    "Cover for manga {:?} in library {:?}",
                    self.id, self.library_id
                ))
            })?;

        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        let bytes = fs::read(self.path.join(name)).await?;

        Ok(Image {
            extension,
            bytes: Bytes::from(bytes),
        })
    }

    /// Whether [`Manga::cover`] would find something to serve.
    pub async fn has_cover(&self) -> Result<bool> {
        Ok(!fsutil::list_sorted_images(&self.path).await?.is_empty())
    }

    /// Writes the cover image atomically, replacing any previous cover file.
    ///
    /// # Parameters
    ///
    /// * `extension` - File extension, with or without the leading dot
    /// * `bytes` - The image content
    pub async fn set_cover(&self, extension: &str, bytes: &[u8]) -> Result<()> {
        let files = fsutil::list_sorted_images(&self.path).await?;
        for file in &files {
            if fsutil::file_stem(file) == COVER_STEM {
                fs::remove_file(self.path.join(file)).await?;
            }
        }

        let extension = fsutil::normalize_extension(extension);
        let name = format!("{}.{}", COVER_STEM, extension);
        let path = fsutil::resolve_child(&self.path, &name)?;
        fsutil::write_atomic(&path, bytes).await
    }

    /// Reads the chapter override document if one exists.
    ///
    /// # Errors
    ///
    /// * [`Error::Json`] / [`Error::Parse`] - If the document is malformed
    pub async fn chapter_overrides(&self) -> Result<Option<ChapterOverrides>> {
        let bytes = match fs::read(self.path.join(CHAPTER_METADATA_FILE)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value: Value = serde_json::from_slice(&bytes)?;
        Ok(Some(ChapterOverrides::from_value(value)?))
    }

    /// Writes the chapter override document atomically.
    pub async fn set_chapter_overrides(&self, overrides: &ChapterOverrides) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&overrides.to_value()?)?;
        fsutil::write_atomic(&self.path.join(CHAPTER_METADATA_FILE), &bytes).await
    }

    /// Resolves an existing chapter.
    ///
    /// Both ids may be empty: see [`Depth`] for the three layouts.
    ///
    /// # Errors
    ///
    /// * [`Error::IllegalId`] - If an id is rejected, or a collection id comes
    ///   without a chapter id
    /// * [`Error::NotFound`] - If the chapter directory does not exist
    pub async fn chapter(&self, collection_id: &str, chapter_id: &str) -> Result<Chapter> {
        let (depth, path) = self.chapter_path(collection_id, chapter_id)?;
        if !fs::try_exists(&path).await? {
            return Err(Error::not_found(format!(
                "Chapter {:?} in manga {:?}",
                chapter_id, self.id
            )));
        }
        Ok(self.make_chapter(collection_id, chapter_id, depth, path))
    }

    /// Creates a chapter, or returns it if the directory already exists.
    ///
    /// A newly created chapter starts out marked unfinished.
    pub async fn create_chapter(&self, collection_id: &str, chapter_id: &str) -> Result<Chapter> {
        let (depth, path) = self.chapter_path(collection_id, chapter_id)?;
        let chapter = self.make_chapter(collection_id, chapter_id, depth, path);

        if fs::try_exists(chapter.path()).await? {
            return Ok(chapter);
        }

        fs::create_dir_all(chapter.path()).await?;
        chapter.mark_unfinished().await?;
        Ok(chapter)
    }

    /// Maps collection/chapter ids to a depth and directory.
    fn chapter_path(&self, collection_id: &str, chapter_id: &str) -> Result<(Depth, PathBuf)> {
        match (collection_id.is_empty(), chapter_id.is_empty()) {
            (true, true) => Ok((Depth::Flat, self.path.clone())),
            (true, false) => {
                fsutil::validate_id(chapter_id)?;
                Ok((Depth::OneLevel, self.path.join(chapter_id)))
            }
            (false, false) => {
                fsutil::validate_id(collection_id)?;
                fsutil::validate_id(chapter_id)?;
                Ok((
                    Depth::TwoLevel,
                    self.path.join(collection_id).join(chapter_id),
                ))
            }
            // a collection id without a chapter id addresses nothing
            (false, true) => Err(Error::illegal_id(chapter_id)),
        }
    }

    fn make_chapter(
        &self,
        collection_id: &str,
        chapter_id: &str,
        depth: Depth,
        path: PathBuf,
    ) -> Chapter {
        Chapter::new(
            self.library_id.clone(),
            self.id.clone(),
            collection_id.to_string(),
            chapter_id.to_string(),
            depth,
            path,
        )
    }

    fn flat_chapter(&self) -> Chapter {
        self.make_chapter("", "", Depth::Flat, self.path.clone())
    }

    /// Assembles the full view of this manga.
    ///
    /// The chapter layout is resolved in priority order:
    ///
    /// 1. A non-empty `chapters.json` dictates collections and order
    /// 2. Two directory levels, each chapter holding images
    /// 3. One directory level of chapters holding images
    /// 4. Otherwise the manga is flat and its images become previews
    ///
    /// # Errors
    ///
    /// * [`Error::Json`] / [`Error::Parse`] - If a present document is malformed
    /// * [`Error::Io`] - If the directory tree cannot be read
    pub async fn detail(&self) -> Result<MangaDetail> {
        let metadata = self.try_metadata().await?;
        let title = metadata
            .as_ref()
            .map(|m| m.title.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.id.clone());

        if let Some(overrides) = self.chapter_overrides().await? {
            if !overrides.is_empty() {
                let collections = self.collections_from_overrides(&overrides).await?;
                return Ok(self.assemble(title, metadata, collections, Vec::new()));
            }
        }

        let collections = self.detect_two_level().await?;
        if !collections.is_empty() {
            return Ok(self.assemble(title, metadata, collections, Vec::new()));
        }

        let chapters = self.detect_one_level().await?;
        if !chapters.is_empty() {
            let collections = vec![Collection {
                id: String::new(),
                chapters,
            }];
            return Ok(self.assemble(title, metadata, collections, Vec::new()));
        }

        let previews = self.flat_chapter().image_ids().await?;
        Ok(self.assemble(title, metadata, Vec::new(), previews))
    }

    fn assemble(
        &self,
        title: String,
        metadata: Option<MangaMetadata>,
        collections: Vec<Collection>,
        previews: Vec<String>,
    ) -> MangaDetail {
        MangaDetail {
            library_id: self.library_id.clone(),
            id: self.id.clone(),
            title,
            metadata,
            collections,
            previews,
        }
    }

    /// Builds collections from the override document, in file order.
    async fn collections_from_overrides(
        &self,
        overrides: &ChapterOverrides,
    ) -> Result<Vec<Collection>> {
        let mut collections = Vec::new();
        for (collection_id, chapters) in &overrides.0 {
            let mut summaries = Vec::new();
            for (chapter_id, meta) in chapters {
                let finished = match self.chapter_path(collection_id, chapter_id) {
                    Ok((_, dir)) => dir_finished(&dir).await?,
                    Err(err) => {
                        warn!(
                            manga = %self.id,
                            chapter = %chapter_id,
                            error = %err,
                            "skipping override entry with unusable id"
                        );
                        continue;
                    }
                };

                summaries.push(ChapterSummary {
                    collection_id: collection_id.clone(),
                    id: chapter_id.clone(),
                    name: if meta.name.is_empty() {
                        chapter_id.clone()
                    } else {
                        meta.name.clone()
                    },
                    title: meta.title.clone(),
                    finished,
                });
            }
            collections.push(Collection {
                id: collection_id.clone(),
                chapters: summaries,
            });
        }
        Ok(collections)
    }

    /// Detects the `manga/collection/chapter` layout.
    async fn detect_two_level(&self) -> Result<Vec<Collection>> {
        let mut collections = Vec::new();
        for collection_id in fsutil::list_sorted_dirs(&self.path).await? {
            let collection_path = self.path.join(&collection_id);

            let mut summaries = Vec::new();
            for chapter_id in fsutil::list_sorted_dirs(&collection_path).await? {
                let chapter_path = collection_path.join(&chapter_id);
                if fsutil::list_sorted_images(&chapter_path).await?.is_empty() {
                    continue;
                }

                let finished = dir_finished(&chapter_path).await?;
                summaries.push(ChapterSummary {
                    collection_id: collection_id.clone(),
                    id: chapter_id.clone(),
                    name: chapter_id,
                    title: String::new(),
                    finished,
                });
            }

            if !summaries.is_empty() {
                collections.push(Collection {
                    id: collection_id,
                    chapters: summaries,
                });
            }
        }
        Ok(collections)
    }

    /// Detects the `manga/chapter` layout.
    async fn detect_one_level(&self) -> Result<Vec<ChapterSummary>> {
        let mut summaries = Vec::new();
        for chapter_id in fsutil::list_sorted_dirs(&self.path).await? {
            let chapter_path = self.path.join(&chapter_id);
            if fsutil::list_sorted_images(&chapter_path).await?.is_empty() {
                continue;
            }

            let finished = dir_finished(&chapter_path).await?;
            summaries.push(ChapterSummary {
                collection_id: String::new(),
                id: chapter_id.clone(),
                name: chapter_id,
                title: String::new(),
                finished,
            });
        }
        Ok(summaries)
    }

    /// Removes this manga and everything below it.
    pub async fn delete(&self) -> Result<()> {
        fs::remove_dir_all(&self.path).await?;
        Ok(())
    }

    /// Last modification time of the manga directory.
    pub async fn last_updated(&self) -> Result<SystemTime> {
        fsutil::modified(&self.path).await
    }

    /// Builds the searchable view of this manga.
    ///
    /// Missing or unreadable metadata degrades to an entry that only carries
    /// the manga id as its title, so one broken document never breaks a
    /// whole listing.
    pub async fn search_entry(&self) -> SearchEntry {
        let metadata = match self.try_metadata().await {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(
                    library = %self.library_id,
                    manga = %self.id,
                    error = %err,
                    "unreadable metadata, searching by id only"
                );
                None
            }
        };

        match metadata {
            Some(metadata) => {
                let title = if metadata.title.trim().is_empty() {
                    self.id.clone()
                } else {
                    metadata.title
                };
                SearchEntry {
                    title,
                    authors: metadata.authors,
                    tags: metadata.tags,
                }
            }
            None => SearchEntry {
                title: self.id.clone(),
                ..Default::default()
            },
        }
    }
}

/// Finished state of a chapter directory: present and without the marker.
async fn dir_finished(dir: &Path) -> Result<bool> {
    if !fs::try_exists(dir).await? {
        return Ok(false);
    }
    Ok(!fs::try_exists(dir.join(UNFINISHED_MARKER)).await?)
}

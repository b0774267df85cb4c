//! Core data types for the content store and the download engine.
//!
//! This module defines the fundamental data structures used throughout
//! Hondana:
//!
//! - [`MangaMetadata`] - The persisted `metadata.json` document of a manga
//! - [`ChapterMeta`] / [`ChapterOverrides`] - Display overrides from `chapters.json`
//! - [`MangaDetail`] - The assembled view of a manga with its chapters
//! - [`Depth`] - How deep a chapter nests below its manga directory
//! - [`SourceManga`] / [`SourceChapter`] / [`SourceImage`] - Remote source payloads
//! - [`SearchQuery`] - Parameters for searching across libraries
//!
//! # Examples
//!
//! ```rust
//! use hondana::types::MangaMetadata;
//!
//! let mut metadata = MangaMetadata {
//!     title: "One Piece".to_string(),
//!     authors: vec!["Oda Eiichiro".to_string()],
//!     ..Default::default()
//! };
//! metadata.tags.insert(
//!     "Genre".to_string(),
//!     vec!["Action".to_string(), "Adventure".to_string()],
//! );
//! ```

use std::collections::BTreeMap;

use bytes::Bytes;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Persisted metadata document of a manga (`metadata.json`).
///
/// The document lives directly in the manga directory and uses camelCase
/// field names on disk. Unknown fields are ignored on read, missing fields
/// fall back to their defaults, so hand-edited documents stay loadable.
///
/// # Fields
///
/// * `title` - Display title of the manga
/// * `authors` - List of author names
/// * `is_finished` - Whether the series is completed (stored as `isFinished`)
/// * `description` - Plot summary or description
/// * `tags` - Tag name to values, e.g. `Genre` to `["Action"]`
///
/// # Examples
///
/// ```rust
/// use hondana::types::MangaMetadata;
///
/// let metadata: MangaMetadata =
///     serde_json::from_str(r#"{"title":"Berserk","isFinished":false}"#).unwrap();
/// assert_eq!(metadata.title, "Berserk");
/// assert!(!metadata.is_finished);
/// assert!(metadata.tags.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MangaMetadata {
    /// Display title
    #[serde(default)]
    pub title: String,

    /// List of authors
    #[serde(default)]
    pub authors: Vec<String>,

    /// Whether the series is completed
    #[serde(default)]
    pub is_finished: bool,

    /// Description/summary
    #[serde(default)]
    pub description: String,

    /// Tag name to the list of values
    #[serde(default)]
    pub tags: BTreeMap<String, Vec<String>>,
}

/// Display overrides for one chapter, as stored in `chapters.json`.
///
/// # Fields
///
/// * `name` - Display name replacing the directory name
/// * `title` - Optional longer chapter title
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterMeta {
    /// Display name replacing the directory name
    #[serde(default)]
    pub name: String,

    /// Chapter title
    #[serde(default)]
    pub title: String,
}

/// The ordered chapter override document of a manga (`chapters.json`).
///
/// The document maps collection ids to chapters to their [`ChapterMeta`].
/// Order is significant: chapters are displayed in the order the file lists
/// them, which is why this is a vector of pairs rather than a map. A manga
/// without collections uses the empty string as its single collection id.
///
/// # Examples
///
/// ```rust
/// use hondana::types::{ChapterMeta, ChapterOverrides};
///
/// let overrides = ChapterOverrides(vec![(
///     "Volume 1".to_string(),
///     vec![(
///         "ch-1".to_string(),
///         ChapterMeta {
///             name: "Chapter 1".to_string(),
///             title: "Romance Dawn".to_string(),
///         },
///     )],
/// )]);
///
/// let value = overrides.to_value().unwrap();
/// let parsed = ChapterOverrides::from_value(value).unwrap();
/// assert_eq!(parsed, overrides);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChapterOverrides(pub Vec<(String, Vec<(String, ChapterMeta)>)>);

impl ChapterOverrides {
    /// Parses the document from its JSON form, keeping file order.
    ///
    /// # Errors
    ///
    /// * [`Error::Parse`] - If the document is not an object of objects
    /// * [`Error::Json`] - If a chapter entry has the wrong shape
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(collections) = value else {
            return Err(Error::parse("chapter overrides must be a JSON object"));
        };

        let mut document = Vec::new();
        for (collection_id, chapters_value) in collections {
            let Value::Object(chapters) = chapters_value else {
                return Err(Error::parse(format!(
                    "chapter overrides for {:?} must be a JSON object",
                    collection_id
                )));
            };

            let mut list = Vec::new();
            for (chapter_id, meta_value) in chapters {
                let meta: ChapterMeta = serde_json::from_value(meta_value)?;
                list.push((chapter_id, meta));
            }
            document.push((collection_id, list));
        }

        Ok(ChapterOverrides(document))
    }

    /// Serializes the document to its JSON form, keeping list order.
    pub fn to_value(&self) -> Result<Value> {
        let mut collections = serde_json::Map::new();
        for (collection_id, chapters) in &self.0 {
            let mut chapter_map = serde_json::Map::new();
            for (chapter_id, meta) in chapters {
                chapter_map.insert(chapter_id.clone(), serde_json::to_value(meta)?);
            }
            collections.insert(collection_id.clone(), Value::Object(chapter_map));
        }
        Ok(Value::Object(collections))
    }

    /// Returns `true` if the document lists no chapters at all.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|(_, chapters)| chapters.is_empty())
    }
}

/// How deep a chapter nests below its manga directory.
///
/// The three depths correspond to the three directory layouts a manga can
/// have: images directly in the manga directory, one directory of chapters,
/// or collection directories each holding chapter directories.
///
/// # Variants
///
/// * `Flat` - The manga directory itself holds the images
/// * `OneLevel` - `manga/chapter/image`
/// * `TwoLevel` - `manga/collection/chapter/image`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Flat,
    OneLevel,
    TwoLevel,
}

/// One chapter row inside a [`MangaDetail`].
///
/// # Fields
///
/// * `collection_id` - Owning collection, empty for single-level mangas
/// * `id` - Directory name of the chapter
/// * `name` - Display name (override or directory name)
/// * `title` - Chapter title from overrides, empty otherwise
/// * `finished` - Whether the chapter download completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub collection_id: String,
    pub id: String,
    pub name: String,
    pub title: String,
    pub finished: bool,
}

/// A named group of chapters inside a [`MangaDetail`].
///
/// Mangas without collection directories report a single collection with an
/// empty id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub chapters: Vec<ChapterSummary>,
}

/// The assembled view of one manga.
///
/// Either `collections` or `previews` is populated, never both: a manga with
/// chapter structure lists its collections, a flat manga lists the image ids
/// found directly in its directory.
///
/// # Fields
///
/// * `library_id` - Owning library
/// * `id` - Manga directory name
/// * `title` - Metadata title, falling back to the id
/// * `metadata` - The parsed `metadata.json`, if present
/// * `collections` - Chapters grouped by collection
/// * `previews` - Image ids for flat mangas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MangaDetail {
    pub library_id: String,
    pub id: String,
    pub title: String,
    pub metadata: Option<MangaMetadata>,
    pub collections: Vec<Collection>,
    pub previews: Vec<String>,
}

/// A stored image payload served from the content store.
///
/// # Fields
///
/// * `extension` - File extension without the dot, for content type mapping
/// * `bytes` - The raw file content
#[derive(Debug, Clone)]
pub struct Image {
    pub extension: String,
    pub bytes: Bytes,
}

/// A manga as reported by a remote source.
///
/// This is the source-side counterpart of [`MangaMetadata`] plus the chapter
/// listing needed to drive a download.
///
/// # Fields
///
/// * `id` - Identifier of the manga within the source
/// * `title` - Display title
/// * `cover_url` - Optional URL of the cover image
/// * `authors` - List of author names
/// * `description` - Optional plot summary
/// * `tags` - Tag name to values
/// * `is_finished` - Whether the series is completed upstream
/// * `chapters` - Chapters in source order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceManga {
    pub id: String,
    pub title: String,
    pub cover_url: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub is_finished: bool,
    #[serde(default)]
    pub chapters: Vec<SourceChapter>,
}

/// One chapter as reported by a remote source.
///
/// # Fields
///
/// * `id` - Identifier of the chapter within the source
/// * `collection` - Owning collection id, empty when the source has none
/// * `title` - Chapter title, may be empty
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceChapter {
    pub id: String,
    #[serde(default)]
    pub collection: String,
    #[serde(default)]
    pub title: String,
}

/// An image fetched from a remote source.
///
/// # Fields
///
/// * `mime` - The reported content type, e.g. `image/jpeg`
/// * `bytes` - The raw image content
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub mime: String,
    pub bytes: Bytes,
}

impl SourceImage {
    /// Maps the reported content type to a file extension.
    ///
    /// Returns `None` for unknown content types; callers usually fall back
    /// to the extension found in the image URL.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bytes::Bytes;
    /// use hondana::types::SourceImage;
    ///
    /// let image = SourceImage {
    ///     mime: "image/jpeg; charset=utf-8".to_string(),
    ///     bytes: Bytes::new(),
    /// };
    /// assert_eq!(image.extension(), Some("jpg"));
    /// ```
    pub fn extension(&self) -> Option<&'static str> {
        let mime = self.mime.split(';').next().unwrap_or("").trim();
        match mime {
            "image/jpeg" | "image/jpg" => Some("jpg"),
            "image/png" => Some("png"),
            "image/gif" => Some("gif"),
            "image/webp" => Some("webp"),
            "image/bmp" => Some("bmp"),
            "image/avif" => Some("avif"),
            _ => None,
        }
    }
}

/// A reader comment attached to a chapter on a remote source.
///
/// # Fields
///
/// * `author` - Name of the commenter
/// * `body` - The comment text
/// * `posted_at` - Source-formatted timestamp, if reported
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub body: String,
    #[serde(default)]
    pub posted_at: Option<String>,
}

impl From<&SourceManga> for MangaMetadata {
    /// Builds the persisted metadata from a source listing.
    fn from(manga: &SourceManga) -> Self {
        MangaMetadata {
            title: manga.title.clone(),
            authors: manga.authors.clone(),
            is_finished: manga.is_finished,
            description: manga.description.clone().unwrap_or_default(),
            tags: manga.tags.clone(),
        }
    }
}

/// Search parameters for querying mangas across libraries.
///
/// This struct contains all the parameters that can be used to page through
/// the merged manga list. It uses the builder pattern (via `derive_builder`)
/// to provide a fluent API for constructing queries.
///
/// # Builder Usage
///
/// The `derive_builder` crate automatically generates a `SearchQueryBuilder`
/// that can be used for constructing queries:
///
/// ```rust
/// use hondana::types::SearchQueryBuilder;
///
/// let query = SearchQueryBuilder::default()
///     .keywords("one piece; -tag:horror")
///     .limit(Some(20))
///     .build()
///     .unwrap();
/// ```
///
/// # Fields
///
/// * `keywords` - The filter string, see [`crate::filter`]
/// * `from_key` - Pagination cursor: the key of the last manga already seen
/// * `limit` - Maximum number of results, capped at the page size
#[derive(Debug, Clone, Default, Builder)]
#[builder(setter(into))]
pub struct SearchQuery {
    #[builder(default)]
    pub keywords: String,
    #[builder(default)]
    pub from_key: Option<String>,
    #[builder(default)]
    pub limit: Option<usize>,
}

impl From<String> for SearchQuery {
    /// Creates a query from a keyword string.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hondana::types::SearchQuery;
    ///
    /// let query: SearchQuery = "one piece".to_string().into();
    /// assert_eq!(query.keywords, "one piece");
    /// assert_eq!(query.limit, None);
    /// ```
    fn from(keywords: String) -> Self {
        SearchQuery {
            keywords,
            ..Default::default()
        }
    }
}

impl From<&str> for SearchQuery {
    /// Creates a query from a keyword string slice.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hondana::types::SearchQuery;
    ///
    /// let query: SearchQuery = "author:oda".into();
    /// assert_eq!(query.keywords, "author:oda");
    /// assert_eq!(query.from_key, None);
    /// ```
    fn from(keywords: &str) -> Self {
        SearchQuery {
            keywords: keywords.to_string(),
            ..Default::default()
        }
    }
}

//! Source trait and collection for managing remote manga sources.
//!
//! This module defines the core [`Source`] trait that all manga sources must
//! implement, and the [`Sources`] collection for managing multiple sources.
//! Optional abilities (account login, reader comments) are separate
//! capability traits; a source advertises them by returning `Some` from the
//! corresponding accessor.
//!
//! # Examples
//!
//! ```rust
//! use hondana::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let mut sources = Sources::new();
//! // sources.add(MangaDexSource::new());
//! // sources.add(MangaSeeSource::new());
//!
//! if let Some(source) = sources.get("mangadex") {
//!     let listing = source.manga("manga-id").await?;
//!     println!("{}: {} chapters", listing.title, listing.chapters.len());
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;

use crate::error::Result;
use crate::types::{Comment, SourceImage, SourceManga};

/// Global HTTP client instance with optimized configuration.
///
/// This client is configured with:
/// - 30-second timeout
/// - Connection pooling (10 idle connections per host)
/// - Compression support (gzip, brotli)
/// - Custom User-Agent header
///
/// The client is created lazily on first use and shared by every source that
/// relies on the default [`Source::image`] implementation.
static CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent("Hondana/0.1.0")
        .pool_max_idle_per_host(10)
        .gzip(true)
        .brotli(true)
        .build()
        .expect("Failed to build HTTP client")
});

/// Trait that all manga sources must implement.
///
/// The `Source` trait defines the interface the download engine drives: one
/// call for the manga listing, one for the page URLs of a chapter, and one
/// for fetching a single image. Each implementation handles the specifics of
/// communicating with its respective manga website or API.
///
/// # Required Methods
///
/// * [`id()`](Source::id) - Unique identifier for the source
/// * [`lang()`](Source::lang) - Language the source serves
/// * [`manga()`](Source::manga) - Fetch the listing of one manga
/// * [`content()`](Source::content) - Fetch the page URLs of one chapter
///
/// # Capabilities
///
/// * [`login()`](Source::login) - Account login, for sources that need one
/// * [`comments()`](Source::comments) - Reader comments, where the site has them
///
/// Both default to `None`; the engine never requires them.
///
/// # Examples
///
/// ```rust
/// use hondana::prelude::*;
/// use async_trait::async_trait;
///
/// struct MySource;
///
/// #[async_trait]
/// impl Source for MySource {
///     fn id(&self) -> &str {
///         "my-source"
///     }
///
///     fn lang(&self) -> &str {
///         "en"
///     }
///
///     async fn manga(&self, manga_id: &str) -> Result<SourceManga> {
///         // fetch and map the site's listing here
/// #       let _ = manga_id;
/// #       Ok(SourceManga::default())
///     }
///
///     async fn content(&self, manga_id: &str, chapter_id: &str) -> Result<Vec<String>> {
///         // fetch and map the page URLs here
/// #       let _ = (manga_id, chapter_id);
/// #       Ok(vec![])
///     }
/// }
/// ```
#[async_trait]
pub trait Source: Send + Sync {
    /// Returns the unique identifier for this source.
    ///
    /// The ID should be a lowercase, hyphen-separated string. It doubles as
    /// the name of the library the source downloads into.
    fn id(&self) -> &str;

    /// Returns the language this source serves, as a BCP 47 tag like `en`.
    fn lang(&self) -> &str;

    /// Fetches the listing of one manga.
    ///
    /// # Parameters
    ///
    /// * `manga_id` - The unique identifier of the manga within this source
    ///
    /// # Returns
    ///
    /// The manga's metadata together with its chapters in source order.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`](crate::Error::NotFound) - If the manga does not exist
    /// * [`Error::Source`](crate::Error::Source) - For source-specific errors
    /// * [`Error::Network`](crate::Error::Network) - For network/connection issues
    async fn manga(&self, manga_id: &str) -> Result<SourceManga>;

    /// Fetches the page image URLs of one chapter, in reading order.
    ///
    /// # Parameters
    ///
    /// * `manga_id` - The unique identifier of the manga within this source
    /// * `chapter_id` - The unique identifier of the chapter within this source
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`](crate::Error::NotFound) - If the chapter does not exist
    /// * [`Error::Source`](crate::Error::Source) - For source-specific errors
    /// * [`Error::Network`](crate::Error::Network) - For network/connection issues
    async fn content(&self, manga_id: &str, chapter_id: &str) -> Result<Vec<String>>;

    /// Fetches one image by URL.
    ///
    /// # Default Implementation
    ///
    /// The default implementation performs a plain GET on the shared HTTP
    /// client and reports the response content type alongside the bytes.
    /// Sources that need referer headers, signed URLs, or descrambling
    /// override this.
    ///
    /// # Errors
    ///
    /// * [`Error::Source`](crate::Error::Source) - For non-success HTTP statuses
    /// * [`Error::Network`](crate::Error::Network) - For network/connection issues
    async fn image(&self, url: &str) -> Result<SourceImage> {
        let response = CLIENT.get(url).send().await?;
        if !response.status().is_success() {
            return Err(crate::Error::source(
                self.id(),
                format!("HTTP {} for {}", response.status(), url),
            ));
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();
        let bytes = response.bytes().await?;

        Ok(SourceImage { mime, bytes })
    }

    /// Returns the login capability of this source, if it has one.
    fn login(&self) -> Option<&dyn LoginFeature> {
        None
    }

    /// Returns the comment capability of this source, if it has one.
    fn comments(&self) -> Option<&dyn CommentFeature> {
        None
    }
}

/// Account login capability of a [`Source`].
///
/// Sources behind an account wall implement this next to [`Source`] and
/// expose it through [`Source::login`].
#[async_trait]
pub trait LoginFeature: Send + Sync {
    /// Logs in with the given credentials.
    ///
    /// # Errors
    ///
    /// * [`Error::Source`](crate::Error::Source) - If the credentials are rejected
    async fn login(&self, username: &str, password: &str) -> Result<()>;

    /// Whether a login session is currently active.
    fn is_logged_in(&self) -> bool;
}

/// Reader comment capability of a [`Source`].
#[async_trait]
pub trait CommentFeature: Send + Sync {
    /// Fetches one page of reader comments for a chapter.
    ///
    /// # Parameters
    ///
    /// * `manga_id` - The unique identifier of the manga within this source
    /// * `chapter_id` - The unique identifier of the chapter
    /// * `page` - Zero-based comment page index
    async fn comments(&self, manga_id: &str, chapter_id: &str, page: usize)
    -> Result<Vec<Comment>>;
}

/// A collection of manga sources with convenience methods for management.
///
/// `Sources` manages multiple [`Source`] implementations behind shared
/// handles, so the download engine can hold onto a source while the
/// collection stays borrowable.
///
/// # Examples
///
/// ```rust
/// use hondana::prelude::*;
///
/// let mut sources = Sources::new();
/// // sources.add(MangaDexSource::new());
/// // sources.add(MangaSeeSource::new());
///
/// println!("Available sources: {:?}", sources.list_ids());
/// println!("Total sources: {}", sources.len());
/// ```
pub struct Sources {
    sources: Vec<Arc<dyn Source>>,
    by_id: HashMap<String, usize>,
}

impl Sources {
    /// Creates a new empty source collection.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hondana::prelude::*;
    ///
    /// let sources = Sources::new();
    /// assert_eq!(sources.len(), 0);
    /// assert!(sources.is_empty());
    /// ```
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// Adds a source to the collection.
    ///
    /// The source is indexed by its ID for fast retrieval. Returns a mutable
    /// reference to self for chaining.
    ///
    /// # Parameters
    ///
    /// * `source` - Any type implementing the [`Source`] trait
    pub fn add(&mut self, source: impl Source + 'static) -> &mut Self {
        let id = source.id().to_string();
        let index = self.sources.len();
        self.sources.push(Arc::new(source));
        self.by_id.insert(id, index);
        self
    }

    /// Retrieves a source by its ID.
    ///
    /// # Parameters
    ///
    /// * `id` - The unique identifier of the source
    ///
    /// # Returns
    ///
    /// * `Some(&dyn Source)` - Reference to the source if found
    /// * `None` - If no source with the given ID exists
    pub fn get(&self, id: &str) -> Option<&dyn Source> {
        self.get_arc(id).map(|source| source.as_ref())
    }

    /// Retrieves a shared handle to a source by its ID.
    pub fn get_arc(&self, id: &str) -> Option<&Arc<dyn Source>> {
        self.by_id.get(id).and_then(|&index| self.sources.get(index))
    }

    /// Iterates over shared handles to all sources, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.sources.iter()
    }

    /// Returns a list of all source IDs in the collection.
    pub fn list_ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.id()).collect()
    }

    /// Returns the number of sources in the collection.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Returns `true` if the collection contains no sources.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for Sources {
    fn default() -> Self {
        Self::new()
    }
}

//! # Hondana - Filesystem-backed manga library server core
//!
//! Hondana is an async library core for self-hosted manga servers. It manages
//! manga as plain directories and images on disk, layers searchable metadata
//! and chapter structure on top, and keeps the collection growing through a
//! per-source background download engine. Everything a transport layer needs
//! is here; HTTP routing, auth and rendering stay out.
//!
//! ## Features
//!
//! - **Plain Filesystem Storage**: libraries, mangas and chapters are
//!   ordinary directories you can rsync, back up, or edit by hand
//! - **Structure Detection**: collection/chapter layouts are inferred from
//!   the directory tree, with an optional `chapters.json` override file
//! - **Search & Filtering**: `;`-separated keyword filters with tag keys,
//!   exclusion and exact matching
//! - **Merged Browsing**: cross-library search sorted by update time, with
//!   cursor pagination and a random pick
//! - **Background Downloads**: one queue per source with pause, resume,
//!   removal and per-chapter cancellation
//! - **Bounded Parallelism**: five concurrent image fetches per chapter,
//!   three attempts per image
//! - **Async/Await Support**: built on tokio for concurrent operation
//! - **Robust Error Handling**: comprehensive error types with detailed context
//!
//! ## Quick Start
//!
//! ### Browsing the library
//!
//! ```rust,no_run
//! use hondana::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = LibraryManager::new("/var/lib/hondana");
//!
//!     // Merged search across every library, newest first
//!     let query = SearchQuery::from("fantasy;-tag:ecchi");
//!     for manga in manager.search(&query).await? {
//!         println!("{}", manga.key());
//!     }
//!
//!     // Full detail view of one manga
//!     let manga = manager.manga("mangadex", "one-piece").await?;
//!     let detail = manga.detail().await?;
//!     println!("{}: {} collections", detail.title, detail.collections.len());
//!     Ok(())
//! }
//! ```
//!
//! ### Tracking downloads
//!
//! ```rust,no_run
//! use hondana::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = LibraryManager::new("/var/lib/hondana");
//!     let mut sources = Sources::new();
//!     // sources.add(MangaDexSource::new());
//!
//!     let downloader = Downloader::new(&sources, &manager).await?;
//!     downloader.add_manga("mangadex", "one-piece").await?;
//!
//!     // Downloads run in the background; poll the task feed
//!     for task in downloader.tasks() {
//!         println!("{} [{:?}]", task.title, task.state);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - [`store`]: libraries, mangas and chapters on disk
//! - [`filter`]: the keyword filter language behind search
//! - [`source`]: the trait remote sources implement, and their registry
//! - [`download`]: the background download engine
//! - [`types`]: core data structures for metadata, listings and views
//! - [`fsutil`]: path validation, natural ordering and atomic writes
//! - [`error`]: comprehensive error handling

pub mod download;
pub mod error;
pub mod filter;
pub mod fsutil;
pub mod source;
pub mod store;
pub mod types;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and traits, allowing you to
/// import everything you need with a single `use hondana::prelude::*;` statement.
///
/// # Example
///
/// ```rust
/// use hondana::prelude::*;
///
/// // Now you have access to:
/// // - LibraryManager, Library, Manga, Chapter
/// // - Source trait, Sources, Downloader
/// // - MangaMetadata, MangaDetail, SearchQuery
/// // - Error, Result
/// ```
pub mod prelude {
    pub use crate::{
        download::{DownloadOptions, DownloadTask, Downloader},
        error::{Error, Result},
        source::{Source, Sources},
        store::{Chapter, Library, LibraryManager, Manga},
        types::{
            MangaDetail, MangaMetadata, SearchQuery, SearchQueryBuilder, SourceChapter,
            SourceImage, SourceManga,
        },
    };
}

// Re-export main types at crate root for direct access
pub use download::{DownloadOptions, DownloadTask, Downloader};
pub use error::{Error, Result};
pub use source::{Source, Sources};
pub use store::{Chapter, Library, LibraryManager, Manga};
pub use types::{MangaDetail, MangaMetadata, SearchQuery};

//! The filesystem-backed content store.
//!
//! A store is a directory tree with a fixed shape; the types in this module
//! are handles onto its levels:
//!
//! ```text
//! <root>/<library>/<manga>/metadata.json
//!                         /cover.jpg
//!                         /chapters.json
//!                         /[<collection>/]<chapter>/<index>.<ext>
//!                         /[<collection>/]<chapter>/.unfinished
//! ```
//!
//! - [`LibraryManager`] - The store root: libraries, merged search, random pick
//! - [`Library`] - One library directory holding mangas
//! - [`Manga`] - One manga directory: metadata, cover, chapters, detail view
//! - [`Chapter`] - One chapter directory: images and the finished marker
//!
//! Handles are cheap to clone and hold no open files; every operation goes
//! back to the filesystem, which is the single source of truth.

mod chapter;
mod library;
mod manga;

pub use chapter::Chapter;
pub use library::{Library, LibraryManager, PAGE_SIZE};
pub use manga::Manga;

/// File name of the persisted manga metadata document.
pub(crate) const METADATA_FILE: &str = "metadata.json";

/// File name of the chapter override document.
pub(crate) const CHAPTER_METADATA_FILE: &str = "chapters.json";

/// Marker file present while a chapter still has pages missing.
pub(crate) const UNFINISHED_MARKER: &str = ".unfinished";

/// File stem of the explicit cover image.
pub(crate) const COVER_STEM: &str = "cover";

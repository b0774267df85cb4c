//! Error types and result handling for Hondana operations.
//!
//! This module defines the error handling system used throughout Hondana.
//! All operations return a [`Result<T>`] which is a type alias for
//! `std::result::Result<T, Error>`.
//!
//! # Error Categories
//!
//! Hondana errors are categorized into several types:
//!
//! - **Identifier Errors**: Ids or path segments that could escape the library root
//! - **Not Found**: Missing libraries, mangas, chapters, or images
//! - **Parse Errors**: Documents or values with an unexpected shape
//! - **Network Errors**: Connection issues, timeouts, HTTP errors
//! - **Source Errors**: Remote-source-specific errors with context
//! - **IO Errors**: File system operations on the content store
//! - **JSON Errors**: Metadata serialization/deserialization failures
//!
//! # Examples
//!
//! ```rust
//! use hondana::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let manager = LibraryManager::new("/data/manga");
//!
//! match manager.library("missing").await {
//!     Ok(library) => println!("Found library {}", library.id()),
//!     Err(Error::NotFound(msg)) => println!("No such library: {}", msg),
//!     Err(Error::Io(e)) => println!("Store unreadable: {}", e),
//!     Err(e) => println!("Other error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

/// Type alias for Results with Hondana errors.
///
/// This is a convenience type alias that represents the standard Result type
/// with Hondana's [`enum@Error`] as the error type. All public APIs in Hondana
/// return this Result type.
///
/// # Examples
///
/// ```rust
/// use hondana::{Result, Error};
///
/// fn example_operation() -> Result<String> {
///     Ok("Success".to_string())
/// }
///
/// fn example_with_error() -> Result<()> {
///     Err(Error::illegal_id(".."))
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all Hondana operations.
///
/// This enum covers all possible error conditions that can occur while
/// operating on the content store or running downloads, from rejected
/// identifiers to network failures. Each variant provides specific context
/// about what went wrong.
///
/// # Variants
///
/// * [`IllegalId`](Error::IllegalId) - Rejected library/manga/chapter ids
/// * [`IllegalChildPath`](Error::IllegalChildPath) - Rejected file name segments
/// * [`NotFound`](Error::NotFound) - Missing resources
/// * [`Parse`](Error::Parse) - Data shape and format errors
/// * [`Network`](Error::Network) - HTTP client and connection errors
/// * [`Source`](Error::Source) - Source-specific errors with context
/// * [`Io`](Error::Io) - File system errors
/// * [`Json`](Error::Json) - JSON serialization errors
/// * [`Join`](Error::Join) - Background task failures
/// * [`Other`](Error::Other) - Generic error messages
#[derive(Error, Debug)]
pub enum Error {
    /// Rejected identifier for a library, manga, collection, or chapter.
    ///
    /// Ids become directory names, so anything empty, `.`, `..`, or containing
    /// a path separator is refused before it ever reaches the file system.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hondana::Error;
    ///
    /// let error = Error::illegal_id("../../etc");
    /// let error = Error::illegal_id("");
    /// ```
    #[error("Illegal id: {0:?}")]
    IllegalId(String),

    /// Rejected file name inside a store directory.
    ///
    /// Raised when a name that should address a single child entry (an image
    /// file, a metadata file) does not stay inside its parent directory.
    #[error("Illegal child path: {0:?}")]
    IllegalChildPath(String),

    /// Resource not found errors.
    ///
    /// This variant is used when a requested resource (library, manga, chapter,
    /// image, source, etc.) cannot be found. It provides a descriptive message
    /// about what was not found.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hondana::Error;
    ///
    /// let error = Error::not_found("Manga with ID 'invalid-id'");
    /// let error = Error::not_found("Cover for manga 'one-piece'");
    /// ```
    #[error("Not found: {0}")]
    NotFound(String),

    /// Data shape and format errors.
    ///
    /// This variant is used when a document parses as JSON but does not have
    /// the expected structure, such as a chapter override file whose top
    /// level is not an object.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hondana::Error;
    ///
    /// let error = Error::parse("chapter overrides must be a JSON object");
    /// let error = Error::parse("unknown content type");
    /// ```
    #[error("Parse error: {0}")]
    Parse(String),

    /// Network-related errors from HTTP operations.
    ///
    /// This variant wraps errors from the underlying HTTP client (reqwest),
    /// including connection timeouts, DNS resolution failures, and HTTP
    /// transport errors.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Source-specific errors with contextual information.
    ///
    /// This variant provides detailed error information when a specific manga
    /// source encounters an error. It includes both the source identifier and
    /// a descriptive error message.
    ///
    /// # Fields
    ///
    /// * `src` - The identifier of the source that encountered the error
    /// * `message` - Descriptive error message explaining what went wrong
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hondana::Error;
    ///
    /// let error = Error::source("mangadex", "API rate limit exceeded");
    /// let error = Error::source("mangasee", "Invalid chapter ID");
    /// ```
    #[error("Source error [{src}]: {message}")]
    Source { src: String, message: String },

    /// File system and IO operation errors.
    ///
    /// This variant wraps standard IO errors that may occur while reading or
    /// writing the content store, such as listing a library directory or
    /// persisting a downloaded page.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization and deserialization errors.
    ///
    /// This variant wraps errors from serde_json when parsing metadata or
    /// chapter override documents, or when serializing them back to disk.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Join errors.
    ///
    /// This variant wraps errors from tokio tasks.
    #[error("Join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Generic error messages.
    ///
    /// This variant is used for errors that don't fit into other specific
    /// categories. It contains a descriptive error message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hondana::Error;
    ///
    /// let error = Error::Other("Unexpected error condition".to_string());
    /// ```
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Creates an illegal-id error for the given identifier.
    ///
    /// This is a convenience method for creating [`Error::IllegalId`] variants
    /// carrying the identifier that was rejected.
    ///
    /// # Parameters
    ///
    /// * `id` - The identifier that failed validation
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hondana::Error;
    ///
    /// let error = Error::illegal_id("..");
    /// let error = Error::illegal_id("a/b");
    /// ```
    pub fn illegal_id(id: impl Into<String>) -> Self {
        Error::IllegalId(id.into())
    }

    /// Creates an illegal-child-path error for the given file name.
    ///
    /// This is a convenience method for creating [`Error::IllegalChildPath`]
    /// variants carrying the name that was rejected.
    ///
    /// # Parameters
    ///
    /// * `name` - The child entry name that failed validation
    pub fn illegal_child(name: impl Into<String>) -> Self {
        Error::IllegalChildPath(name.into())
    }

    /// Creates a not found error with the given message.
    ///
    /// This is a convenience method for creating [`Error::NotFound`] variants
    /// with a descriptive message about what resource was not found.
    ///
    /// # Parameters
    ///
    /// * `msg` - A message describing what was not found
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hondana::Error;
    ///
    /// let error = Error::not_found("Manga with ID 'abc123'");
    /// let error = Error::not_found("Chapter 999 for manga 'one-piece'");
    /// ```
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Creates a parse error with the given message.
    ///
    /// This is a convenience method for creating [`Error::Parse`] variants
    /// with a descriptive message about what shape check failed.
    ///
    /// # Parameters
    ///
    /// * `msg` - A message describing the parsing error
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hondana::Error;
    ///
    /// let error = Error::parse("Invalid override document");
    /// let error = Error::parse(format!("Expected {} pages, found {}", 10, 5));
    /// ```
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    /// Creates a source-specific error with source ID and message.
    ///
    /// This is a convenience method for creating [`Error::Source`] variants
    /// with both the source identifier and a descriptive error message.
    ///
    /// # Parameters
    ///
    /// * `src` - The identifier of the source that encountered the error
    /// * `msg` - A message describing what went wrong
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hondana::Error;
    ///
    /// let error = Error::source("mangadex", "API endpoint not found");
    /// let error = Error::source("mangasee", "Invalid response format");
    /// ```
    pub fn source(src: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::Source {
            src: src.into(),
            message: msg.into(),
        }
    }

    /// Returns `true` if this error is a [`Error::NotFound`].
    ///
    /// Useful for callers that treat a missing resource as an expected state,
    /// such as checking whether a manga already has a cached cover.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

use std::path::{Path, PathBuf};

use futures::future;
use rand::seq::IndexedRandom;
use tokio::fs;
use tracing::debug;

use crate::error::{Error, Result};
use crate::filter::{Filter, parse_query};
use crate::fsutil;
use crate::types::SearchQuery;

use super::manga::Manga;

/// Maximum number of mangas one search page returns.
pub const PAGE_SIZE: usize = 100;

/// Handle to one library directory.
///
/// A library groups mangas; download workers use one library per source,
/// named by the source id, and purely local content can live in any other
/// library.
#[derive(Debug, Clone)]
pub struct Library {
    id: String,
    path: PathBuf,
}

impl Library {
    pub(crate) fn new(id: String, path: PathBuf) -> Self {
        Self { id, path }
    }

    /// Directory name of this library.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Absolute path of the library directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lists the manga ids of this library in natural order.
    pub async fn manga_ids(&self) -> Result<Vec<String>> {
        fsutil::list_sorted_dirs(&self.path).await
    }

    /// Resolves an existing manga.
    ///
    /// # Errors
    ///
    /// * [`Error::IllegalId`] - If the id is rejected
    /// * [`Error::NotFound`] - If the manga directory does not exist
    pub async fn manga(&self, id: &str) -> Result<Manga> {
        fsutil::validate_id(id)?;
        let path = self.path.join(id);
        if !fs::try_exists(&path).await? {
            return Err(Error::not_found(format!(
                "Manga {:?} in library {:?}",
                id, self.id
            )));
        }
        Ok(Manga::new(self.id.clone(), id.to_string(), path))
    }

    /// Creates a manga directory, or returns the existing one.
    pub async fn create_manga(&self, id: &str) -> Result<Manga> {
        fsutil::validate_id(id)?;
        let path = self.path.join(id);
        fs::create_dir_all(&path).await?;
        Ok(Manga::new(self.id.clone(), id.to_string(), path))
    }

    /// Removes a manga and everything below it.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`] - If the manga does not exist
    pub async fn delete_manga(&self, id: &str) -> Result<()> {
        self.manga(id).await?.delete().await
    }

    /// Returns handles to every manga in this library, in natural order.
    pub async fn mangas(&self) -> Result<Vec<Manga>> {
        Ok(self
            .manga_ids()
            .await?
            .into_iter()
            .map(|id| {
                let path = self.path.join(&id);
                Manga::new(self.id.clone(), id, path)
            })
            .collect())
    }

    /// Lists the mangas of this library matching a keyword string.
    ///
    /// See [`crate::filter`] for the token grammar. An empty keyword string
    /// matches everything.
    pub async fn search(&self, keywords: &str) -> Result<Vec<Manga>> {
        let filters = parse_query(keywords);
        let mangas = self.mangas().await?;
        if filters.is_empty() {
            return Ok(mangas);
        }

        let entries = future::join_all(mangas.iter().map(|m| m.search_entry())).await;
        Ok(mangas
            .into_iter()
            .zip(entries)
            .filter(|(_, entry)| Filter::matches_all(&filters, entry))
            .map(|(manga, _)| manga)
            .collect())
    }
}

/// The root of a content store.
///
/// The manager creates and resolves libraries and answers queries that span
/// all of them. It holds nothing but the root path; cloning is free and all
/// state lives on disk.
///
/// # Examples
///
/// ```rust,no_run
/// use hondana::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let manager = LibraryManager::new("/data/manga");
///
/// let library = manager.create_library("local").await?;
/// library.create_manga("my-scans").await?;
///
/// let page = manager.search(&SearchQuery::from("tag:action")).await?;
/// for manga in &page {
///     println!("{}", manga.key());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LibraryManager {
    root: PathBuf,
}

impl LibraryManager {
    /// Creates a manager rooted at the given directory.
    ///
    /// The directory does not have to exist yet; it appears with the first
    /// created library.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute path of the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a library directory, or returns the existing one.
    ///
    /// # Errors
    ///
    /// * [`Error::IllegalId`] - If the id is rejected
    pub async fn create_library(&self, id: &str) -> Result<Library> {
        fsutil::validate_id(id)?;
        let path = self.root.join(id);
        fs::create_dir_all(&path).await?;
        Ok(Library::new(id.to_string(), path))
    }

    /// Resolves an existing library.
    ///
    /// # Errors
    ///
    /// * [`Error::IllegalId`] - If the id is rejected
    /// * [`Error::NotFound`] - If the library directory does not exist
    pub async fn library(&self, id: &str) -> Result<Library> {
        fsutil::validate_id(id)?;
        let path = self.root.join(id);
        if !fs::try_exists(&path).await? {
            return Err(Error::not_found(format!("Library {:?}", id)));
        }
        Ok(Library::new(id.to_string(), path))
    }

    /// Returns handles to every library, in natural order.
    ///
    /// A missing store root is an empty store, not an error.
    pub async fn libraries(&self) -> Result<Vec<Library>> {
        if !fs::try_exists(&self.root).await? {
            return Ok(Vec::new());
        }
        Ok(fsutil::list_sorted_dirs(&self.root)
            .await?
            .into_iter()
            .map(|id| {
                let path = self.root.join(&id);
                Library::new(id, path)
            })
            .collect())
    }

    /// Resolves a manga across libraries.
    pub async fn manga(&self, library_id: &str, manga_id: &str) -> Result<Manga> {
        self.library(library_id).await?.manga(manga_id).await
    }

    /// Pages through the merged manga list of all libraries.
    ///
    /// Mangas are ordered by directory modification time, newest first, so
    /// recently downloaded content surfaces at the top. The cursor in
    /// [`SearchQuery::from_key`] names the last key of the previous page;
    /// the result starts after it. An unknown cursor starts from the top.
    /// Results are capped at [`PAGE_SIZE`] even when `limit` asks for more.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<Manga>> {
        let mut candidates = Vec::new();
        for library in self.libraries().await? {
            for manga in library.mangas().await? {
                match manga.last_updated().await {
                    Ok(updated) => candidates.push((updated, manga)),
                    Err(err) => {
                        // racing deletion; the manga just stops being listed
                        debug!(manga = %manga.key(), error = %err, "mtime unavailable");
                    }
                }
            }
        }
        candidates.sort_by(|(ta, ma), (tb, mb)| tb.cmp(ta).then_with(|| ma.key().cmp(&mb.key())));

        let mut mangas: Vec<Manga> = candidates.into_iter().map(|(_, manga)| manga).collect();

        if let Some(from_key) = &query.from_key {
            if let Some(pos) = mangas.iter().position(|m| &m.key() == from_key) {
                mangas.drain(..=pos);
            }
        }

        let page_size = query.limit.unwrap_or(PAGE_SIZE).min(PAGE_SIZE);
        let filters = parse_query(&query.keywords);
        if filters.is_empty() {
            mangas.truncate(page_size);
            return Ok(mangas);
        }

        let entries = future::join_all(mangas.iter().map(|m| m.search_entry())).await;
        Ok(mangas
            .into_iter()
            .zip(entries)
            .filter(|(_, entry)| Filter::matches_all(&filters, entry))
            .map(|(manga, _)| manga)
            .take(page_size)
            .collect())
    }

    /// Picks one manga uniformly at random across all libraries.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`] - If the store holds no manga at all
    pub async fn random_manga(&self) -> Result<Manga> {
        let mut all = Vec::new();
        for library in self.libraries().await? {
            all.extend(library.mangas().await?);
        }

        all.choose(&mut rand::rng())
            .cloned()
            .ok_or_else(|| Error::not_found("No mangas in any library"))
    }
}

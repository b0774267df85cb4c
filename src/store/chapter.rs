use std::collections::HashSet;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;

use crate::error::{Error, Result};
use crate::fsutil;
use crate::types::{Depth, Image};

use super::UNFINISHED_MARKER;

/// Handle to one chapter directory.
///
/// A chapter stores its pages as image files named by a bare index (`1.jpg`,
/// `2.png`, ...) and carries a hidden `.unfinished` marker while pages are
/// still missing. Depending on [`Depth`], the directory is the manga
/// directory itself, a direct child, or nested below a collection.
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
/// let chapter = manga.chapter("Volume 1", "ch-1").await?;
/// for id in chapter.image_ids().await? {
///     let image = chapter.image(&id).await?;
///     println!("{}: {} bytes", id, image.bytes.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Chapter {
    library_id: String,
    manga_id: String,
    collection_id: String,
    id: String,
    depth: Depth,
    path: PathBuf,
}

impl Chapter {
    pub(crate) fn new(
        library_id: String,
        manga_id: String,
        collection_id: String,
        id: String,
        depth: Depth,
        path: PathBuf,
    ) -> Self {
        Self {
            library_id,
            manga_id,
            collection_id,
            id,
            depth,
            path,
        }
    }

    /// Directory name of this chapter; empty for flat mangas.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Owning collection id; empty below [`Depth::TwoLevel`].
    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    /// Owning manga id.
    pub fn manga_id(&self) -> &str {
        &self.manga_id
    }

    /// Owning library id.
    pub fn library_id(&self) -> &str {
        &self.library_id
    }

    /// How deep this chapter nests below its manga directory.
    pub fn depth(&self) -> Depth {
        self.depth
    }

    /// Absolute path of the chapter directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn marker_path(&self) -> PathBuf {
        self.path.join(UNFINISHED_MARKER)
    }

    /// Whether this chapter has all its pages.
    ///
    /// A chapter is finished exactly when the `.unfinished` marker is absent.
    pub async fn is_finished(&self) -> Result<bool> {
        Ok(!fs::try_exists(self.marker_path()).await?)
    }

    /// Places the `.unfinished` marker. Idempotent.
    pub async fn mark_unfinished(&self) -> Result<()> {
        fs::write(self.marker_path(), b"").await?;
        Ok(())
    }

    /// Removes the `.unfinished` marker. Idempotent.
    pub async fn mark_finished(&self) -> Result<()> {
        match fs::remove_file(self.marker_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists the image ids of this chapter in natural order.
    ///
    /// Ids are file stems: `2.jpg` yields `2`. When several files share a
    /// stem the id is reported once.
    pub async fn image_ids(&self) -> Result<Vec<String>> {
        let files = fsutil::list_sorted_images(&self.path).await?;

        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for file in files {
            let stem = fsutil::file_stem(&file).to_string();
            if seen.insert(stem.clone()) {
                ids.push(stem);
            }
        }
        Ok(ids)
    }

    /// Reads one image by id.
    ///
    /// When several files share the stem, the naturally-first one wins.
    ///
    /// # Errors
    ///
    /// * [`Error::IllegalId`] - If the id is not a valid path segment
    /// * [`Error::NotFound`] - If no image file carries this stem
    pub async fn image(&self, id: &str) -> Result<Image> {
        fsutil::validate_id(id)?;

        let files = fsutil::list_sorted_images(&self.path).await?;
        let Some(name) = files.into_iter().find(|f| fsutil::file_stem(f) == id) else {
            return Err(Error::not_found(format!(
                "Image {:?} in chapter {:?} of manga {:?}",
                id, self.id, self.manga_id
            )));
        };

        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        let bytes = fs::read(self.path.join(&name)).await?;

        Ok(Image {
            extension,
            bytes: Bytes::from(bytes),
        })
    }

    /// Writes one image atomically, creating the chapter directory if needed.
    ///
    /// # Parameters
    ///
    /// * `id` - The image id, usually a 1-based page index
    /// * `extension` - File extension, with or without the leading dot
    /// * `bytes` - The image content
    ///
    /// # Errors
    ///
    /// * [`Error::IllegalId`] - If the id is not a valid path segment
    /// * [`Error::IllegalChildPath`] - If id and extension do not form a file name
    pub async fn put_image(&self, id: &str, extension: &str, bytes: &[u8]) -> Result<()> {
        fsutil::validate_id(id)?;

        let extension = fsutil::normalize_extension(extension);
        let name = format!("{}.{}", id, extension);
        let path = fsutil::resolve_child(&self.path, &name)?;

        fsutil::write_atomic(&path, bytes).await
    }
}

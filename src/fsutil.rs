//! Filesystem plumbing shared by the content store.
//!
//! Every path the store touches is built through this module, including:
//!
//! - **Path safety**: Child paths are joined from validated single segments only
//! - **Natural ordering**: Directory listings sort digit runs numerically
//! - **Image detection**: Page and cover files are recognized by extension
//! - **Atomic writes**: Files are written to a sibling and renamed into place
//!
//! # Examples
//!
//! ```rust
//! use std::path::Path;
//! use hondana::fsutil::{alphanumeric_cmp, resolve_child};
//!
//! # fn example() -> hondana::Result<()> {
//! let chapter = resolve_child(Path::new("/data/manga/one-piece"), "ch-10")?;
//! assert!(chapter.ends_with("ch-10"));
//!
//! let mut pages = vec!["10.jpg", "2.jpg", "1.jpg"];
//! pages.sort_by(|a, b| alphanumeric_cmp(a, b));
//! assert_eq!(pages, vec!["1.jpg", "2.jpg", "10.jpg"]);
//! # Ok(())
//! # }
//! ```

use std::cmp::Ordering;
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::str::Chars;
use std::time::SystemTime;

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

/// File extensions recognized as page or cover images (lowercase, without dot).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "avif"];

/// Checks whether a name is usable as a single path segment.
///
/// A segment must be non-empty, must not be `.` or `..`, and must not contain
/// a path separator. Everything that passes stays inside its parent directory
/// when joined.
///
/// # Parameters
///
/// * `name` - The candidate segment
///
/// # Examples
///
/// ```rust
/// use hondana::fsutil::is_valid_segment;
///
/// assert!(is_valid_segment("one-piece"));
/// assert!(is_valid_segment("Vol. 1"));
/// assert!(!is_valid_segment(""));
/// assert!(!is_valid_segment(".."));
/// assert!(!is_valid_segment("a/b"));
/// ```
pub fn is_valid_segment(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/') && !name.contains('\\')
}

/// Validates an id that will become a directory name.
///
/// # Parameters
///
/// * `id` - The library, manga, collection, or chapter id to validate
///
/// # Errors
///
/// * [`Error::IllegalId`] - If the id is not a valid path segment
pub fn validate_id(id: &str) -> Result<()> {
    if is_valid_segment(id) {
        Ok(())
    } else {
        Err(Error::illegal_id(id))
    }
}

/// Joins a validated child name onto a parent directory.
///
/// This is the only way store code derives paths from external input. The
/// name is checked with [`is_valid_segment`] first, so the result is always
/// a direct child of `parent`.
///
/// # Parameters
///
/// * `parent` - The directory to join onto
/// * `name` - The child entry name
///
/// # Errors
///
/// * [`Error::IllegalChildPath`] - If the name could escape the parent
///
/// # Examples
///
/// ```rust
/// use std::path::Path;
/// use hondana::fsutil::resolve_child;
///
/// let path = resolve_child(Path::new("/library"), "manga-1");
/// assert!(path.is_ok());
///
/// let escape = resolve_child(Path::new("/library"), "../secrets");
/// assert!(escape.is_err());
/// ```
pub fn resolve_child(parent: &Path, name: &str) -> Result<PathBuf> {
    if is_valid_segment(name) {
        Ok(parent.join(name))
    } else {
        Err(Error::illegal_child(name))
    }
}

/// Checks whether a file name carries a known image extension.
///
/// The comparison is case-insensitive. Names without a stem (dot files) are
/// never treated as images.
///
/// # Examples
///
/// ```rust
/// use hondana::fsutil::is_image_file;
///
/// assert!(is_image_file("1.jpg"));
/// assert!(is_image_file("cover.PNG"));
/// assert!(!is_image_file("metadata.json"));
/// assert!(!is_image_file("12"));
/// ```
pub fn is_image_file(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

/// Normalizes a file extension to lowercase without a leading dot.
///
/// # Examples
///
/// ```rust
/// use hondana::fsutil::normalize_extension;
///
/// assert_eq!(normalize_extension(".JPG"), "jpg");
/// assert_eq!(normalize_extension("png"), "png");
/// ```
pub fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

/// Returns the file name without its extension.
///
/// Image ids are extension-less, so `1.jpg` and `1.png` both resolve to the
/// id `1`. Names without an extension are returned unchanged.
///
/// # Examples
///
/// ```rust
/// use hondana::fsutil::file_stem;
///
/// assert_eq!(file_stem("12.jpg"), "12");
/// assert_eq!(file_stem("cover.webp"), "cover");
/// assert_eq!(file_stem("notes"), "notes");
/// ```
pub fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Compares two names with digit runs ordered numerically.
///
/// Non-digit characters compare case-insensitively; maximal runs of ASCII
/// digits compare by numeric value, so `ch-2` sorts before `ch-10`. Runs that
/// differ only in leading zeros fall back to run length to keep the ordering
/// total.
///
/// # Examples
///
/// ```rust
/// use std::cmp::Ordering;
/// use hondana::fsutil::alphanumeric_cmp;
///
/// assert_eq!(alphanumeric_cmp("ch-2", "ch-10"), Ordering::Less);
/// assert_eq!(alphanumeric_cmp("Alpha", "alpha"), Ordering::Equal);
/// assert_eq!(alphanumeric_cmp("vol-1-ch-3", "vol-1-ch-12"), Ordering::Less);
/// ```
pub fn alphanumeric_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let run_left = digit_run(&mut left);
                let run_right = digit_run(&mut right);
                let ordering = compare_digit_runs(&run_left, &run_right);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(x), Some(y)) => {
                let lx = x.to_lowercase().next().unwrap_or(x);
                let ly = y.to_lowercase().next().unwrap_or(y);
                if lx != ly {
                    return lx.cmp(&ly);
                }
                left.next();
                right.next();
            }
        }
    }
}

/// Consumes and returns the maximal run of ASCII digits at the cursor.
fn digit_run(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(&c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        chars.next();
    }
    run
}

/// Compares digit runs by magnitude, with run length as the tie breaker.
fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let stripped_a = a.trim_start_matches('0');
    let stripped_b = b.trim_start_matches('0');
    stripped_a
        .len()
        .cmp(&stripped_b.len())
        .then_with(|| stripped_a.cmp(stripped_b))
        .then_with(|| a.len().cmp(&b.len()))
}

/// Lists the subdirectories of a path in natural order.
///
/// Hidden entries (names starting with `.`) and non-directories are skipped.
/// Names that are not valid UTF-8 are skipped as well, since ids are strings.
///
/// # Parameters
///
/// * `path` - The directory to list
///
/// # Errors
///
/// * [`Error::Io`] - If the directory cannot be read
pub async fn list_sorted_dirs(path: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            if !name.starts_with('.') {
                names.push(name);
            }
        }
    }
    names.sort_by(|a, b| alphanumeric_cmp(a, b));
    Ok(names)
}

/// Lists the image files of a path in natural order.
///
/// Only plain files with a recognized image extension are returned; hidden
/// files and in-flight `.part` writes never qualify.
///
/// # Parameters
///
/// * `path` - The directory to list
///
/// # Errors
///
/// * [`Error::Io`] - If the directory cannot be read
pub async fn list_sorted_images(path: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            if !name.starts_with('.') && is_image_file(&name) {
                names.push(name);
            }
        }
    }
    names.sort_by(|a, b| alphanumeric_cmp(a, b));
    Ok(names)
}

/// Writes a file atomically by staging a `.part` sibling and renaming it.
///
/// Readers never observe a half-written file: the content lands under a
/// temporary name first and the rename replaces any previous version in one
/// step. The parent directory is created if it does not exist yet.
///
/// # Parameters
///
/// * `path` - The final file path
/// * `bytes` - The content to write
///
/// # Errors
///
/// * [`Error::Io`] - If the staging write or the rename fails
///
/// # Examples
///
/// ```rust,no_run
/// use std::path::Path;
/// use hondana::fsutil::write_atomic;
///
/// # async fn example() -> hondana::Result<()> {
/// write_atomic(Path::new("/library/manga/metadata.json"), b"{}").await?;
/// # Ok(())
/// # }
/// ```
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let staging = part_path(path);
    let mut file = fs::File::create(&staging).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    fs::rename(&staging, path).await?;
    Ok(())
}

/// Builds the staging path used by [`write_atomic`].
fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Returns the last modification time of a path.
///
/// # Errors
///
/// * [`Error::Io`] - If the path does not exist or metadata is unavailable
pub async fn modified(path: &Path) -> Result<SystemTime> {
    Ok(fs::metadata(path).await?.modified()?)
}

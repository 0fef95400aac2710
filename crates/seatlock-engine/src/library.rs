//! File catalog browsing.
//!
//! The gated content behind a session is a media library. This module
//! provides the provider-independent browsing layer: typed entries, kind
//! detection from MIME types, the grid's sort orders, and a breadcrumb
//! navigator over a [`FileCatalog`]. Talking to an actual storage provider
//! is left to catalog implementations.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while browsing a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The requested folder does not exist in the catalog.
    #[error("folder not found: {0}")]
    FolderNotFound(String),

    /// `open_folder` was called with a non-folder entry.
    #[error("not a folder: {0}")]
    NotAFolder(String),

    /// The storage provider reported an error.
    #[error("catalog provider error: {0}")]
    Provider(String),
}

/// Identifier of a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// Creates a file id from its raw form.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provider links for viewing or downloading an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLinks {
    /// Link for viewing the entry in the provider's UI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_url: Option<String>,
    /// Direct download link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

/// One entry in a catalog listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Provider-assigned identifier.
    pub id: FileId,
    /// Display name.
    pub name: String,
    /// MIME type as reported by the provider.
    pub mime_type: String,
    /// Size in bytes; folders and some provider formats have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Provider links.
    #[serde(default)]
    pub links: FileLinks,
}

impl FileEntry {
    /// The kind this entry renders as.
    pub fn kind(&self) -> FileKind {
        FileKind::from_mime(&self.mime_type)
    }

    /// True when this entry can be opened as a folder.
    pub fn is_folder(&self) -> bool {
        self.kind() == FileKind::Folder
    }
}

/// Coarse entry kinds, derived from the MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Folder,
    Video,
    Pdf,
    Image,
    Audio,
    Archive,
    Other,
}

impl FileKind {
    /// Maps a MIME type to a kind by substring, the way providers report
    /// their vendor types (`application/vnd.google-apps.folder` and such).
    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type.contains("folder") {
            FileKind::Folder
        } else if mime_type.contains("video") {
            FileKind::Video
        } else if mime_type.contains("pdf") {
            FileKind::Pdf
        } else if mime_type.contains("image") {
            FileKind::Image
        } else if mime_type.contains("audio") {
            FileKind::Audio
        } else if mime_type.contains("zip")
            || mime_type.contains("tar")
            || mime_type.contains("compressed")
        {
            FileKind::Archive
        } else {
            FileKind::Other
        }
    }

    /// Stable label, used for kind-ordered sorting.
    pub fn label(&self) -> &'static str {
        match self {
            FileKind::Folder => "folder",
            FileKind::Video => "video",
            FileKind::Pdf => "pdf",
            FileKind::Image => "image",
            FileKind::Audio => "audio",
            FileKind::Archive => "archive",
            FileKind::Other => "other",
        }
    }
}

/// Sort orders for a catalog listing. Folders always come first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Case-insensitive name, with numeric runs compared as numbers so
    /// "Episode 2" sorts before "Episode 10".
    #[default]
    Name,
    /// Ascending size, ties broken by name.
    Size,
    /// Kind label, ties broken by name.
    Kind,
}

/// Formats a size for display, in the grid's units.
pub fn format_size(size: Option<u64>) -> String {
    let Some(size) = size else {
        return "Unknown size".to_string();
    };
    if size == 0 {
        return "0 Bytes".to_string();
    }

    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let exponent = (((size as f64).ln() / 1024_f64.ln()).floor() as usize).min(UNITS.len() - 1);
    let value = (size as f64 / 1024_f64.powi(exponent as i32) * 100.0).round() / 100.0;
    format!("{} {}", value, UNITS[exponent])
}

/// First run of digits in `s`, if any.
fn first_number(s: &str) -> Option<u64> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let digits: String = s[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Name comparison: numeric when both names carry a number, otherwise
/// case-insensitive lexicographic.
fn compare_names(a: &str, b: &str) -> Ordering {
    let a = a.to_lowercase();
    let b = b.to_lowercase();

    match (first_number(&a), first_number(&b)) {
        (Some(x), Some(y)) if x != y => x.cmp(&y),
        _ => a.cmp(&b),
    }
}

/// Sorts entries in place: folders first, then by the requested order.
fn sort_entries(entries: &mut [FileEntry], order: SortOrder) {
    entries.sort_by(|a, b| {
        match (a.is_folder(), b.is_folder()) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }

        match order {
            SortOrder::Name => compare_names(&a.name, &b.name),
            SortOrder::Size => a
                .size
                .unwrap_or(0)
                .cmp(&b.size.unwrap_or(0))
                .then_with(|| compare_names(&a.name, &b.name)),
            SortOrder::Kind => a
                .kind()
                .label()
                .cmp(b.kind().label())
                .then_with(|| compare_names(&a.name, &b.name)),
        }
    });
}

/// A browsable file catalog.
///
/// This trait abstracts the storage provider. `list` returns the direct
/// children of a folder; `None` means the catalog root.
pub trait FileCatalog: Send + Sync {
    /// Lists the children of `folder`, or of the root when `None`.
    fn list<'a>(
        &'a self,
        folder: Option<&'a FileId>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<FileEntry>, CatalogError>> + Send + 'a>>;
}

/// A catalog backed by fixed listings. Intended for tests and demos.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    root: Vec<FileEntry>,
    folders: HashMap<FileId, Vec<FileEntry>>,
}

impl StaticCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the root listing.
    pub fn with_root(mut self, entries: Vec<FileEntry>) -> Self {
        self.root = entries;
        self
    }

    /// Sets the listing of one folder.
    pub fn with_folder(mut self, id: FileId, entries: Vec<FileEntry>) -> Self {
        self.folders.insert(id, entries);
        self
    }
}

impl FileCatalog for StaticCatalog {
    fn list<'a>(
        &'a self,
        folder: Option<&'a FileId>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<FileEntry>, CatalogError>> + Send + 'a>> {
        Box::pin(async move {
            match folder {
                None => Ok(self.root.clone()),
                Some(id) => self
                    .folders
                    .get(id)
                    .cloned()
                    .ok_or_else(|| CatalogError::FolderNotFound(id.to_string())),
            }
        })
    }
}

/// One step of the breadcrumb trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crumb {
    /// Folder id this crumb navigates to.
    pub id: FileId,
    /// Folder name as shown in the trail.
    pub name: String,
}

/// Navigation state over a [`FileCatalog`].
///
/// Tracks the folder trail from the root and keeps the current listing
/// sorted. Navigation methods re-list from the catalog, so a browser is
/// always showing live data for its current folder.
pub struct CatalogBrowser {
    catalog: Arc<dyn FileCatalog>,
    trail: Vec<Crumb>,
    entries: Vec<FileEntry>,
    sort: SortOrder,
}

impl CatalogBrowser {
    /// Creates a browser over `catalog`, positioned nowhere.
    ///
    /// Call [`CatalogBrowser::open_root`] to load the first listing.
    pub fn new(catalog: Arc<dyn FileCatalog>) -> Self {
        Self {
            catalog,
            trail: Vec::new(),
            entries: Vec::new(),
            sort: SortOrder::default(),
        }
    }

    /// The breadcrumb trail, root first.
    pub fn trail(&self) -> &[Crumb] {
        &self.trail
    }

    /// The current listing, sorted.
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Changes the sort order and re-sorts the current listing.
    pub fn set_sort(&mut self, order: SortOrder) {
        self.sort = order;
        sort_entries(&mut self.entries, order);
    }

    /// Opens the catalog root, clearing the trail.
    pub async fn open_root(&mut self) -> Result<(), CatalogError> {
        self.trail.clear();
        self.reload().await
    }

    /// Descends into `entry`, appending it to the trail.
    pub async fn open_folder(&mut self, entry: &FileEntry) -> Result<(), CatalogError> {
        if !entry.is_folder() {
            return Err(CatalogError::NotAFolder(entry.name.clone()));
        }

        self.trail.push(Crumb {
            id: entry.id.clone(),
            name: entry.name.clone(),
        });

        if let Err(e) = self.reload().await {
            self.trail.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Goes up one folder. At the root this is a no-op reload.
    pub async fn up(&mut self) -> Result<(), CatalogError> {
        self.trail.pop();
        self.reload().await
    }

    /// Jumps to a trail depth: 0 is the root, `n` keeps the first `n`
    /// crumbs. Depths past the end of the trail stay where they are.
    pub async fn jump(&mut self, depth: usize) -> Result<(), CatalogError> {
        if depth < self.trail.len() {
            self.trail.truncate(depth);
        }
        self.reload().await
    }

    /// Re-lists the current folder.
    pub async fn refresh(&mut self) -> Result<(), CatalogError> {
        self.reload().await
    }

    async fn reload(&mut self) -> Result<(), CatalogError> {
        let folder = self.trail.last().map(|crumb| crumb.id.clone());
        let mut entries = self.catalog.list(folder.as_ref()).await?;
        sort_entries(&mut entries, self.sort);
        self.entries = entries;
        Ok(())
    }
}

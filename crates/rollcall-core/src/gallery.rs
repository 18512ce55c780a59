//! Reference store: a directory tree of labeled face photos.
//!
//! Layout is either `images/<NAME>/<any>.jpg` (identity from the folder) or
//! `images/<name>.jpg` (identity from the file stem). Labels are uppercased.
//! Embeddings are cached in memory and recomputed only for new or modified
//! files.

use crate::types::{Embedding, ReferenceFace};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

/// Leftovers from other face-search tools that must not outlive a restart.
const CACHE_EXTENSIONS: &[&str] = &["pkl"];

const UNKNOWN_IDENTITY: &str = "UNKNOWN";

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("reference directory not found: {0}")]
    NotFound(String),
    #[error("failed to read reference directory {path}: {source}")]
    Walk {
        path: String,
        #[source]
        source: walkdir::Error,
    },
    #[error("filesystem error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A reference photo on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceImage {
    pub path: PathBuf,
    pub identity: String,
    pub modified: Option<SystemTime>,
}

/// Derive the identity label for a reference photo.
///
/// Photos inside a sub-folder take the folder name (`images/katrina/1.jpg`
/// → `KATRINA`); photos directly under `root` take the stem up to the first
/// dot (`images/amir.front.jpg` → `AMIR`).
pub fn identity_label(root: &Path, path: &Path) -> String {
    let label = match path.parent() {
        Some(dir) if dir != root && dir.file_name().is_some() => {
            dir.file_name().and_then(|name| name.to_str())
        }
        _ => path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.split('.').next()),
    };

    label
        .filter(|name| !name.is_empty())
        .map(str::to_uppercase)
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Create the reference directory if missing. Returns `true` if it was created.
pub fn ensure_dir(root: &Path) -> Result<bool, GalleryError> {
    if root.is_dir() {
        return Ok(false);
    }
    std::fs::create_dir_all(root).map_err(|source| GalleryError::Io {
        path: root.display().to_string(),
        source,
    })?;
    Ok(true)
}

/// Delete cache artifacts from the top level of the reference directory.
pub fn purge_cache_artifacts(root: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    let mut removed = Vec::new();

    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|source| GalleryError::Walk {
            path: root.display().to_string(),
            source,
        })?;
        let path = entry.path();
        if entry.file_type().is_file() && has_extension(path, CACHE_EXTENSIONS) {
            std::fs::remove_file(path).map_err(|source| GalleryError::Io {
                path: path.display().to_string(),
                source,
            })?;
            tracing::info!(path = %path.display(), "removed stale reference cache");
            removed.push(path.to_path_buf());
        }
    }

    Ok(removed)
}

/// List reference photos under `root`, sorted by path.
pub fn scan(root: &Path) -> Result<Vec<ReferenceImage>, GalleryError> {
    if !root.is_dir() {
        return Err(GalleryError::NotFound(root.display().to_string()));
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|source| GalleryError::Walk {
            path: root.display().to_string(),
            source,
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || !has_extension(path, IMAGE_EXTENSIONS) {
            continue;
        }
        images.push(ReferenceImage {
            identity: identity_label(root, path),
            modified: entry.metadata().ok().and_then(|m| m.modified().ok()),
            path: path.to_path_buf(),
        });
    }

    Ok(images)
}

/// In-memory embedding cache over the reference directory.
pub struct Gallery {
    root: PathBuf,
    /// Every scanned photo; `None` when no face could be embedded.
    entries: Vec<(ReferenceImage, Option<Embedding>)>,
    faces: Vec<ReferenceFace>,
}

impl Gallery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: Vec::new(),
            faces: Vec::new(),
        }
    }

    /// Embedded reference faces, in path order.
    pub fn faces(&self) -> &[ReferenceFace] {
        &self.faces
    }

    /// Number of photos on disk at the last refresh, embedded or not.
    pub fn photo_count(&self) -> usize {
        self.entries.len()
    }

    /// Rescan the directory and embed new or modified photos with `embed`.
    /// Returns `true` if the set of photos changed.
    ///
    /// Nothing is updated unless every new photo was embedded; on error the
    /// previous cache stays intact.
    pub fn refresh<E>(
        &mut self,
        mut embed: impl FnMut(&ReferenceImage) -> Result<Option<Embedding>, E>,
    ) -> Result<bool, E>
    where
        E: From<GalleryError>,
    {
        let scanned = scan(&self.root)?;

        let cached: HashMap<&Path, &ReferenceImage> = self
            .entries
            .iter()
            .map(|(image, _)| (image.path.as_path(), image))
            .collect();

        let mut embedded: HashMap<PathBuf, Option<Embedding>> = HashMap::new();
        for image in &scanned {
            if cached.get(image.path.as_path()) == Some(&image) {
                continue;
            }
            let embedding = embed(image)?;
            if embedding.is_none() {
                tracing::warn!(path = %image.path.display(), "no face found in reference photo; skipping");
            }
            embedded.insert(image.path.clone(), embedding);
        }

        // Every scanned photo is cached now, so only removals remain.
        let changed = !embedded.is_empty() || scanned.len() != self.entries.len();
        if !changed {
            return Ok(false);
        }

        let mut previous: HashMap<PathBuf, Option<Embedding>> = self
            .entries
            .drain(..)
            .map(|(image, embedding)| (image.path, embedding))
            .collect();
        self.entries = scanned
            .into_iter()
            .map(|image| {
                let embedding = match embedded.remove(&image.path) {
                    Some(fresh) => fresh,
                    None => previous.remove(&image.path).flatten(),
                };
                (image, embedding)
            })
            .collect();

        self.faces = self
            .entries
            .iter()
            .filter_map(|(image, embedding)| {
                embedding.as_ref().map(|embedding| ReferenceFace {
                    identity: image.identity.clone(),
                    path: image.path.clone(),
                    embedding: embedding.clone(),
                })
            })
            .collect();
        tracing::info!(
            photos = self.entries.len(),
            faces = self.faces.len(),
            root = %self.root.display(),
            "reference gallery updated"
        );

        Ok(true)
    }
}

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use reqwest::Url;

use crate::error::{Error, Result};

/// A local image picked for the next upload.
#[derive(Debug, Clone)]
pub struct SelectedImage {
    path: PathBuf,
    index: usize,
    preview: OnceLock<String>,
}

impl SelectedImage {
    fn new(path: PathBuf, index: usize) -> Self {
        Self {
            path,
            index,
            preview: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Position in the selection list.
    pub fn index(&self) -> usize {
        self.index
    }

    /// File name sent with the upload.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// A resolvable reference to the local file, computed once and reused.
    pub fn preview(&self) -> &str {
        self.preview.get_or_init(|| preview_reference(&self.path))
    }
}

fn preview_reference(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    Url::from_file_path(&absolute)
        .map(String::from)
        .unwrap_or_else(|_| absolute.display().to_string())
}

/// Ordered images chosen by the user but not yet uploaded.
#[derive(Debug, Clone, Default)]
pub struct SelectionStore {
    items: Vec<SelectedImage>,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a batch after the current entries. Duplicates are kept.
    pub fn add_files<I, P>(&mut self, batch: I) -> usize
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let before = self.items.len();
        for path in batch {
            let index = self.items.len();
            self.items.push(SelectedImage::new(path.into(), index));
        }
        self.items.len() - before
    }

    pub fn remove_at(&mut self, index: usize) -> Result<SelectedImage> {
        let len = self.items.len();
        if index >= len {
            return Err(Error::SelectionIndex { index, len });
        }
        let removed = self.items.remove(index);
        for (position, item) in self.items.iter_mut().enumerate().skip(index) {
            item.index = position;
        }
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[SelectedImage] {
        &self.items
    }
}

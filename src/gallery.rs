//! Browsable listing of every file the service currently stores.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use chrono::{DateTime, Utc};
use service_model::FileListing;
use service_model::endpoints::{CACHE_BUST_PARAM, SERVE_FILES};
use tracing::{debug, error, info};

use crate::artifacts::{DetailView, resolve};
use crate::error::Result;
use crate::service::PanoramaService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryEntry {
    pub path: String,
    pub display_name: String,
}

impl GalleryEntry {
    pub fn from_path(path: impl Into<String>) -> Self {
        let path = path.into();
        let display_name = display_name(&path).to_string();
        Self { path, display_name }
    }
}

/// Final `/`-separated segment of a server path.
pub fn display_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

/// Approximates a locale-aware ordering: names compare by their lowercased
/// characters, and the raw text breaks ties so the order is total.
///
/// This is not a full collation. Punctuation and accents keep their code
/// point order, so `a-b.jpg` sorts before `a_b.jpg`.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let folded_a = a.chars().flat_map(char::to_lowercase);
    let folded_b = b.chars().flat_map(char::to_lowercase);
    folded_a.cmp(folded_b).then_with(|| a.cmp(b))
}

/// Full, sorted view of a listing.
pub fn snapshot(listing: FileListing) -> Vec<GalleryEntry> {
    let mut entries: Vec<GalleryEntry> = listing
        .files
        .into_iter()
        .map(GalleryEntry::from_path)
        .collect();
    entries.sort_by(|a, b| compare_names(&a.display_name, &b.display_name));
    entries
}

/// Strictly increasing millisecond stamps for cache-busting query strings.
#[derive(Debug, Default)]
pub struct CacheBuster {
    last: AtomicU64,
}

impl CacheBuster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let previous = self
            .last
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }
}

#[derive(Debug)]
pub struct Gallery {
    base_url: String,
    entries: Vec<GalleryEntry>,
    focused: Option<String>,
    fetched_at: Option<DateTime<Utc>>,
    stamps: CacheBuster,
}

impl Gallery {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            entries: Vec::new(),
            focused: None,
            fetched_at: None,
            stamps: CacheBuster::new(),
        }
    }

    /// Gallery that will highlight the file behind `reference` once listed.
    pub fn open_focused(base_url: impl Into<String>, reference: &str) -> Self {
        let mut gallery = Self::new(base_url);
        gallery.focused = Some(focus_key(reference).to_string());
        gallery
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    pub fn focused(&self) -> Option<&GalleryEntry> {
        let key = self.focused.as_deref()?;
        self.entries.iter().find(|entry| entry.display_name == key)
    }

    /// Focuses the entry named by the last segment of `reference`.
    /// Returns whether that entry is currently listed.
    pub fn focus(&mut self, reference: &str) -> bool {
        self.focused = Some(focus_key(reference).to_string());
        self.focused().is_some()
    }

    /// Fetches the listing and swaps it in whole. On failure the previous
    /// listing stays visible.
    pub async fn refresh<S: PanoramaService>(&mut self, service: &S) -> Result<usize> {
        let stamp = self.stamps.next();
        match service.list_files(stamp).await {
            Ok(listing) => {
                self.replace(snapshot(listing));
                info!(count = self.entries.len(), "gallery refreshed");
                Ok(self.entries.len())
            }
            Err(err) => {
                error!(error = %err, "failed to fetch gallery listing");
                Err(err)
            }
        }
    }

    pub fn replace(&mut self, entries: Vec<GalleryEntry>) {
        self.entries = entries;
        self.fetched_at = Some(Utc::now());
        if self.focused.is_some() && self.focused().is_none() {
            debug!(focus = ?self.focused, "focused entry no longer listed");
            self.focused = None;
        }
    }

    /// Served location of an entry, with a fresh cache buster on every call.
    pub fn image_url(&self, entry: &GalleryEntry) -> String {
        let path = format!("{SERVE_FILES}/{}", entry.display_name);
        format!(
            "{}?{CACHE_BUST_PARAM}={}",
            resolve(&self.base_url, &path),
            self.stamps.next()
        )
    }

    pub fn open_detail(&self, entry: &GalleryEntry) -> DetailView {
        DetailView::for_reference(self.image_url(entry))
    }
}

fn focus_key(reference: &str) -> &str {
    let without_query = reference.split(['?', '#']).next().unwrap_or(reference);
    display_name(without_query)
}

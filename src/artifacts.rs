use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Stitched,
    MatchedPoints,
    Panorama,
}

impl ArtifactKind {
    pub const ALL: [Self; 3] = [Self::Stitched, Self::MatchedPoints, Self::Panorama];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Stitched => "Stitched Image",
            Self::MatchedPoints => "Matched points",
            Self::Panorama => "Panorama Image",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Joins the service base location and a server-relative path with exactly one `/`.
pub fn resolve(base: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

/// The three image slots the workflow produces, plus the message of the
/// last operation that reported one.
///
/// Slots are only ever replaced whole, so a snapshot is always consistent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactRegistry {
    stitched: Option<String>,
    matched_points: Option<String>,
    panorama: Option<String>,
    status_message: Option<String>,
}

impl ArtifactRegistry {
    pub fn get(&self, kind: ArtifactKind) -> Option<&str> {
        self.slot(kind).as_deref()
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        ArtifactKind::ALL.iter().all(|kind| self.get(*kind).is_none())
    }

    pub(crate) fn set(&mut self, kind: ArtifactKind, reference: String) {
        *self.slot_mut(kind) = Some(reference);
    }

    pub(crate) fn clear(&mut self, kind: ArtifactKind) {
        *self.slot_mut(kind) = None;
    }

    pub(crate) fn clear_all(&mut self) {
        for kind in ArtifactKind::ALL {
            self.clear(kind);
        }
    }

    pub(crate) fn set_message(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
    }

    /// Opens the detail overlay for a slot, if it holds a reference.
    pub fn open_detail(&self, kind: ArtifactKind) -> Option<DetailView> {
        self.get(kind).map(|reference| DetailView {
            kind: Some(kind),
            reference: reference.to_string(),
        })
    }

    fn slot(&self, kind: ArtifactKind) -> &Option<String> {
        match kind {
            ArtifactKind::Stitched => &self.stitched,
            ArtifactKind::MatchedPoints => &self.matched_points,
            ArtifactKind::Panorama => &self.panorama,
        }
    }

    fn slot_mut(&mut self, kind: ArtifactKind) -> &mut Option<String> {
        match kind {
            ArtifactKind::Stitched => &mut self.stitched,
            ArtifactKind::MatchedPoints => &mut self.matched_points,
            ArtifactKind::Panorama => &mut self.panorama,
        }
    }
}

/// Overlay showing one image reference. Closing it drops the reference and
/// leaves the registry alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailView {
    kind: Option<ArtifactKind>,
    reference: String,
}

impl DetailView {
    /// Detail view for an arbitrary reference, e.g. a gallery entry.
    pub fn for_reference(reference: impl Into<String>) -> Self {
        Self {
            kind: None,
            reference: reference.into(),
        }
    }

    pub fn kind(&self) -> Option<ArtifactKind> {
        self.kind
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn close(self) {}
}

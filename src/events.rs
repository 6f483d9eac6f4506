use std::fmt;

/// The mutually exclusive workflow operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ClearUploads,
    Upload,
    Stitch,
    GeneratePanorama,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClearUploads => "clear-uploads",
            Self::Upload => "upload",
            Self::Stitch => "stitch",
            Self::GeneratePanorama => "generate-panorama",
        }
    }

    /// Whether a failure shows the service's own message instead of the fallback.
    pub fn reports_service_message(&self) -> bool {
        !matches!(self, Self::Upload)
    }

    /// Text shown when the operation fails without a usable service message.
    pub fn fallback_failure(&self) -> &'static str {
        match self {
            Self::ClearUploads => "Error clearing uploads. Please try again.",
            Self::Upload => "Error uploading files. Please try again.",
            Self::Stitch => "Error stitching images. Please try again.",
            Self::GeneratePanorama => "Error generating panorama. Please try again.",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Failure,
}

/// A transient, dismissible message for whoever renders the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NoticeLevel,
    pub operation: Operation,
    pub text: String,
}

impl Notification {
    pub fn success(operation: Operation, text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            operation,
            text: text.into(),
        }
    }

    pub fn info(operation: Operation, text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            operation,
            text: text.into(),
        }
    }

    pub fn failure(operation: Operation, text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Failure,
            operation,
            text: text.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.level == NoticeLevel::Failure
    }
}

/// Asks the gallery poller to fetch the listing now.
#[derive(Debug)]
pub struct RefreshGallery;

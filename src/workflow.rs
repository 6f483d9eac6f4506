//! The workflow controller: four mutually exclusive remote operations that
//! feed the selection store and the artifact registry.
//!
//! Rules:
//! - At most one of clear, upload, stitch and panorama generation runs at a
//!   time. A call made while another is in flight is rejected with
//!   [`Error::Busy`] before anything is sent.
//! - The busy flag is released by a guard, so every exit path (success,
//!   failure, cancellation, timeout, panic) clears it.
//! - The selection cannot be edited while an operation is in flight.
//! - Only success paths touch the selection or the artifact slots, and they
//!   replace whole slots.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use service_model::endpoints::SERVE_FILES;
use service_model::{MessageReply, PanoramaEnvelope, StitchReply};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::artifacts::{ArtifactKind, ArtifactRegistry, DetailView, resolve};
use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::events::{Notification, Operation};
use crate::gallery::Gallery;
use crate::selection::{SelectedImage, SelectionStore};
use crate::service::{PanoramaService, UploadFile};

const UPLOAD_SUCCESS: &str = "Images uploaded successfully!";
const STITCH_SUCCESS: &str = "Images stitched successfully!";
const PANORAMA_SUCCESS: &str = "Panorama generated successfully!";
const NOTHING_SELECTED: &str = "No images selected.";

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Served file the panorama slot points at.
    pub panorama_file: String,
    pub request_timeout: Option<Duration>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self::from_config(&Configuration::default())
    }
}

impl WorkflowSettings {
    pub fn from_config(cfg: &Configuration) -> Self {
        Self {
            panorama_file: cfg.workflow.panorama_file.trim().to_string(),
            request_timeout: cfg.service.request_timeout,
        }
    }
}

/// Everything the controller owns besides the busy flag.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    pub selection: SelectionStore,
    pub artifacts: ArtifactRegistry,
}

/// Point-in-time copy for rendering.
#[derive(Debug, Clone)]
pub struct WorkflowSnapshot {
    pub busy: bool,
    pub selection: Vec<SelectedImage>,
    pub artifacts: ArtifactRegistry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { count: usize, message: String },
    /// The selection was empty; nothing was sent.
    NothingSelected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StitchOutcome {
    pub stitched: String,
    pub matched_points: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanoramaOutcome {
    Generated {
        reference: String,
        count: usize,
        message: String,
    },
    /// The service reported success without producing a panorama.
    NoPanoramas { message: String },
}

/// Holds the busy flag for one operation and releases it on drop.
struct InFlight<'a> {
    busy: &'a AtomicBool,
    current: &'a Mutex<Option<CancellationToken>>,
    token: CancellationToken,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.current.lock().take();
        self.busy.store(false, Ordering::Release);
    }
}

pub struct Controller<S> {
    service: S,
    settings: WorkflowSettings,
    state: Mutex<WorkflowState>,
    busy: AtomicBool,
    current: Mutex<Option<CancellationToken>>,
    notices: UnboundedSender<Notification>,
    cancel: CancellationToken,
}

impl<S: PanoramaService> Controller<S> {
    pub fn new(
        service: S,
        settings: WorkflowSettings,
        notices: UnboundedSender<Notification>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            settings,
            state: Mutex::new(WorkflowState::default()),
            busy: AtomicBool::new(false),
            current: Mutex::new(None),
            notices,
            cancel,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        let busy = self.is_busy();
        let state = self.state.lock();
        WorkflowSnapshot {
            busy,
            selection: state.selection.items().to_vec(),
            artifacts: state.artifacts.clone(),
        }
    }

    pub fn artifact(&self, kind: ArtifactKind) -> Option<String> {
        self.state.lock().artifacts.get(kind).map(str::to_string)
    }

    pub fn open_detail(&self, kind: ArtifactKind) -> Option<DetailView> {
        self.state.lock().artifacts.open_detail(kind)
    }

    /// Gallery over the same service, optionally focused on an artifact.
    pub fn open_gallery(&self, focus: Option<ArtifactKind>) -> Gallery {
        match focus.and_then(|kind| self.artifact(kind)) {
            Some(reference) => Gallery::open_focused(self.service.base_url(), &reference),
            None => Gallery::new(self.service.base_url()),
        }
    }

    /// Appends files to the selection. Rejected while an operation is in flight.
    pub fn add_files<I, P>(&self, batch: I) -> Result<usize>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut state = self.state.lock();
        self.ensure_idle()?;
        let added = state.selection.add_files(batch);
        debug!(added, "files selected");
        Ok(added)
    }

    pub fn remove_at(&self, index: usize) -> Result<SelectedImage> {
        let mut state = self.state.lock();
        self.ensure_idle()?;
        state.selection.remove_at(index)
    }

    /// Cancels the operation in flight, if any.
    pub fn cancel_current(&self) -> bool {
        match self.current.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels the in-flight operation and every later one.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Session start: purge whatever a previous session left on the service.
    pub async fn start_session(&self) -> Result<String> {
        info!(base = %self.service.base_url(), "starting session");
        self.clear_uploads().await
    }

    pub async fn clear_uploads(&self) -> Result<String> {
        let operation = Operation::ClearUploads;
        let flight = self.begin(operation)?;
        match self.dispatch(&flight, self.service.clear_uploads()).await {
            Ok(MessageReply { message }) => {
                self.state.lock().artifacts.clear_all();
                info!(%message, "uploads cleared");
                self.notify(Notification::success(operation, message.clone()));
                Ok(message)
            }
            Err(err) => Err(self.fail(operation, err)),
        }
    }

    /// Uploads the whole selection as one batch.
    pub async fn upload(&self) -> Result<UploadOutcome> {
        let operation = Operation::Upload;
        let flight = self.begin(operation)?;
        let selection = self.state.lock().selection.items().to_vec();
        if selection.is_empty() {
            info!("upload requested with an empty selection");
            self.notify(Notification::info(operation, NOTHING_SELECTED));
            return Ok(UploadOutcome::NothingSelected);
        }

        let request = async {
            let files = read_selection(&selection).await?;
            self.service.upload(files).await
        };
        match self.dispatch(&flight, request).await {
            Ok(MessageReply { message }) => {
                {
                    let mut state = self.state.lock();
                    state.selection.clear();
                    state.artifacts.clear(ArtifactKind::Stitched);
                    state.artifacts.clear(ArtifactKind::MatchedPoints);
                    state.artifacts.set_message(message.clone());
                }
                info!(count = selection.len(), %message, "images uploaded");
                self.notify(Notification::success(operation, UPLOAD_SUCCESS));
                Ok(UploadOutcome::Uploaded {
                    count: selection.len(),
                    message,
                })
            }
            Err(err) => Err(self.fail(operation, err)),
        }
    }

    /// Stitches the two most recently uploaded images.
    pub async fn stitch(&self) -> Result<StitchOutcome> {
        let operation = Operation::Stitch;
        let flight = self.begin(operation)?;
        let result = self
            .dispatch(&flight, self.service.stitch())
            .await
            .and_then(|reply| {
                reply
                    .validate()
                    .map_err(|err| Error::Malformed(err.to_string()))?;
                Ok(reply)
            });
        match result {
            Ok(StitchReply {
                matched_points_path,
                panorama_image_path,
                message,
            }) => {
                let base = self.service.base_url();
                let stitched = resolve(base, &panorama_image_path);
                let matched_points = resolve(base, &matched_points_path);
                {
                    let mut state = self.state.lock();
                    state.artifacts.set(ArtifactKind::Stitched, stitched.clone());
                    state
                        .artifacts
                        .set(ArtifactKind::MatchedPoints, matched_points.clone());
                    state.artifacts.set_message(message.clone());
                }
                info!(%stitched, %matched_points, "images stitched");
                self.notify(Notification::success(operation, STITCH_SUCCESS));
                Ok(StitchOutcome {
                    stitched,
                    matched_points,
                    message,
                })
            }
            Err(err) => Err(self.fail(operation, err)),
        }
    }

    /// Generates the panorama from every uploaded image.
    ///
    /// Success needs both a successful transport status and a successful
    /// status inside the envelope.
    pub async fn generate_panorama(&self) -> Result<PanoramaOutcome> {
        let operation = Operation::GeneratePanorama;
        let flight = self.begin(operation)?;
        let result = self
            .dispatch(&flight, self.service.generate_panorama())
            .await
            .and_then(accept_envelope);
        match result {
            Ok(envelope) => {
                let count = envelope.panorama_count();
                let PanoramaEnvelope(body, _) = envelope;
                let message = body.message;
                let outcome = if count > 0 {
                    let path = format!("{SERVE_FILES}/{}", self.settings.panorama_file);
                    let reference = resolve(self.service.base_url(), &path);
                    {
                        let mut state = self.state.lock();
                        state.artifacts.set(ArtifactKind::Panorama, reference.clone());
                        state.artifacts.set_message(message.clone());
                    }
                    info!(count, %reference, "panorama generated");
                    PanoramaOutcome::Generated {
                        reference,
                        count,
                        message,
                    }
                } else {
                    self.state.lock().artifacts.set_message(message.clone());
                    warn!(%message, "panorama generation succeeded without producing a panorama");
                    PanoramaOutcome::NoPanoramas { message }
                };
                self.notify(Notification::success(operation, PANORAMA_SUCCESS));
                Ok(outcome)
            }
            Err(err) => Err(self.fail(operation, err)),
        }
    }

    /// Checked with the state lock held: an operation that has not yet
    /// copied the selection will see this edit.
    fn ensure_idle(&self) -> Result<()> {
        if self.is_busy() {
            debug!("selection edit rejected while an operation is in flight");
            return Err(Error::SelectionLocked);
        }
        Ok(())
    }

    fn begin(&self, operation: Operation) -> Result<InFlight<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(%operation, "rejected while another operation is in flight");
            return Err(Error::Busy(operation));
        }
        let token = self.cancel.child_token();
        *self.current.lock() = Some(token.clone());
        debug!(%operation, "operation started");
        Ok(InFlight {
            busy: &self.busy,
            current: &self.current,
            token,
        })
    }

    async fn dispatch<T>(
        &self,
        flight: &InFlight<'_>,
        request: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let bounded = async {
            match self.settings.request_timeout {
                Some(limit) => tokio::time::timeout(limit, request)
                    .await
                    .unwrap_or_else(|_| Err(Error::TimedOut)),
                None => request.await,
            }
        };
        tokio::select! {
            biased;
            _ = flight.token.cancelled() => Err(Error::Cancelled),
            result = bounded => result,
        }
    }

    fn fail(&self, operation: Operation, err: Error) -> Error {
        error!(%operation, error = %err, "operation failed");
        let text = err
            .reported_message()
            .filter(|_| operation.reports_service_message())
            .unwrap_or(operation.fallback_failure());
        self.notify(Notification::failure(operation, text));
        err
    }

    fn notify(&self, notice: Notification) {
        if self.notices.send(notice).is_err() {
            debug!("notification receiver dropped");
        }
    }
}

fn accept_envelope(envelope: PanoramaEnvelope) -> Result<PanoramaEnvelope> {
    if envelope.is_success() {
        return Ok(envelope);
    }
    let message = envelope.body().message.trim();
    Err(Error::Rejected {
        status: envelope.embedded_status(),
        message: (!message.is_empty()).then(|| message.to_string()),
    })
}

async fn read_selection(selection: &[SelectedImage]) -> Result<Vec<UploadFile>> {
    let mut files = Vec::with_capacity(selection.len());
    for item in selection {
        let bytes = tokio::fs::read(item.path()).await?;
        debug!(path = %item.path().display(), bytes = bytes.len(), "read selected image");
        files.push(UploadFile {
            file_name: item.file_name(),
            bytes,
        });
    }
    Ok(files)
}

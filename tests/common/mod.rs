#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use panoramer::Result;
use panoramer::error::Error;
use panoramer::events::Notification;
use panoramer::service::{PanoramaService, UploadFile};
use panoramer::workflow::{Controller, WorkflowSettings};
use parking_lot::Mutex;
use service_model::{
    FileListing, MessageReply, PanoramaBody, PanoramaEnvelope, PanoramaResults, StitchReply,
};
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;

pub const BASE: &str = "http://localhost:5000";

/// In-memory service answering from per-endpoint scripts.
///
/// When gated, every call parks until the test hands out a permit.
#[derive(Default)]
pub struct ScriptedService {
    clear: Mutex<VecDeque<Result<MessageReply>>>,
    upload: Mutex<VecDeque<Result<MessageReply>>>,
    stitch: Mutex<VecDeque<Result<StitchReply>>>,
    panorama: Mutex<VecDeque<Result<PanoramaEnvelope>>>,
    listings: Mutex<VecDeque<Result<FileListing>>>,
    pub uploads: Mutex<Vec<Vec<UploadFile>>>,
    pub stamps: Mutex<Vec<u64>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls wait on the returned semaphore, which starts without permits.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let service = Self {
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (service, gate)
    }

    pub fn on_clear(&self, reply: Result<MessageReply>) -> &Self {
        self.clear.lock().push_back(reply);
        self
    }

    pub fn on_upload(&self, reply: Result<MessageReply>) -> &Self {
        self.upload.lock().push_back(reply);
        self
    }

    pub fn on_stitch(&self, reply: Result<StitchReply>) -> &Self {
        self.stitch.lock().push_back(reply);
        self
    }

    pub fn on_panorama(&self, reply: Result<PanoramaEnvelope>) -> &Self {
        self.panorama.lock().push_back(reply);
        self
    }

    pub fn on_list(&self, reply: Result<FileListing>) -> &Self {
        self.listings.lock().push_back(reply);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn answer<T>(&self, scripted: Option<Result<T>>) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        scripted.unwrap_or_else(|| Err(Error::Malformed("no scripted reply".into())))
    }
}

impl PanoramaService for ScriptedService {
    fn base_url(&self) -> &str {
        BASE
    }

    async fn clear_uploads(&self) -> Result<MessageReply> {
        let next = self.clear.lock().pop_front();
        self.answer(next).await
    }

    async fn upload(&self, files: Vec<UploadFile>) -> Result<MessageReply> {
        self.uploads.lock().push(files);
        let next = self.upload.lock().pop_front();
        self.answer(next).await
    }

    async fn stitch(&self) -> Result<StitchReply> {
        let next = self.stitch.lock().pop_front();
        self.answer(next).await
    }

    async fn generate_panorama(&self) -> Result<PanoramaEnvelope> {
        let next = self.panorama.lock().pop_front();
        self.answer(next).await
    }

    async fn list_files(&self, cache_buster: u64) -> Result<FileListing> {
        self.stamps.lock().push(cache_buster);
        let next = self.listings.lock().pop_front();
        self.answer(next).await
    }

    async fn fetch_file(&self, name: &str, _cache_buster: u64) -> Result<Vec<u8>> {
        let next = Some(Ok(name.as_bytes().to_vec()));
        self.answer(next).await
    }
}

pub fn message(text: &str) -> Result<MessageReply> {
    Ok(MessageReply {
        message: text.to_string(),
    })
}

pub fn stitched(matched: &str, panorama: &str, text: &str) -> Result<StitchReply> {
    Ok(StitchReply {
        matched_points_path: matched.to_string(),
        panorama_image_path: panorama.to_string(),
        message: text.to_string(),
    })
}

pub fn envelope(text: &str, panoramas: &[&str], status: u16) -> Result<PanoramaEnvelope> {
    Ok(PanoramaEnvelope(
        PanoramaBody {
            message: text.to_string(),
            results: PanoramaResults {
                panoramas: panoramas.iter().map(|p| serde_json::json!(p)).collect(),
            },
        },
        status,
    ))
}

pub fn listing(files: &[&str]) -> Result<FileListing> {
    Ok(FileListing {
        files: files.iter().map(|f| f.to_string()).collect(),
    })
}

pub fn server_error(status: u16, text: Option<&str>) -> Error {
    Error::Status {
        status,
        message: text.map(str::to_string),
    }
}

pub fn controller<S: PanoramaService>(
    service: S,
) -> (Controller<S>, UnboundedReceiver<Notification>) {
    controller_with(service, WorkflowSettings::default())
}

pub fn controller_with<S: PanoramaService>(
    service: S,
    settings: WorkflowSettings,
) -> (Controller<S>, UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Controller::new(service, settings, tx, CancellationToken::new()),
        rx,
    )
}

pub fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut notices = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        notices.push(notice);
    }
    notices
}

/// Waits until the service reports a parked call.
pub async fn wait_for_in_flight(service: &ScriptedService) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while service.in_flight() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timeout waiting for a request to reach the service");
}

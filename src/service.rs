//! Boundary to the remote processing service.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use service_model::endpoints::{
    CACHE_BUST_PARAM, CLEAR_UPLOADS, GENERATE_PANORAMA, SERVE_ALL_FILES, SERVE_FILES, STITCH,
    UPLOAD, UPLOAD_FIELD,
};
use service_model::{FileListing, MessageReply, PanoramaEnvelope, StitchReply, message_from_body};
use tracing::{debug, instrument};

use crate::artifacts::resolve;
use crate::error::{Error, Result};

/// One file of an upload batch, already read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn mime_type(&self) -> Option<&'static str> {
        let extension = self.file_name.rsplit_once('.')?.1.to_ascii_lowercase();
        match extension.as_str() {
            "jpg" | "jpeg" => Some("image/jpeg"),
            "png" => Some("image/png"),
            "webp" => Some("image/webp"),
            "gif" => Some("image/gif"),
            "bmp" => Some("image/bmp"),
            "tif" | "tiff" => Some("image/tiff"),
            _ => None,
        }
    }
}

/// Operations offered by the processing service.
///
/// Implementations report non-success transport statuses as
/// [`Error::Status`]; payload-level checks such as the status embedded in
/// the panorama envelope are left to the caller.
pub trait PanoramaService: Send + Sync {
    /// Location every served path is relative to.
    fn base_url(&self) -> &str;

    fn clear_uploads(&self) -> impl Future<Output = Result<MessageReply>> + Send;

    fn upload(&self, files: Vec<UploadFile>) -> impl Future<Output = Result<MessageReply>> + Send;

    fn stitch(&self) -> impl Future<Output = Result<StitchReply>> + Send;

    fn generate_panorama(&self) -> impl Future<Output = Result<PanoramaEnvelope>> + Send;

    fn list_files(&self, cache_buster: u64) -> impl Future<Output = Result<FileListing>> + Send;

    fn fetch_file(
        &self,
        name: &str,
        cache_buster: u64,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

impl<S: PanoramaService> PanoramaService for Arc<S> {
    fn base_url(&self) -> &str {
        self.as_ref().base_url()
    }

    fn clear_uploads(&self) -> impl Future<Output = Result<MessageReply>> + Send {
        self.as_ref().clear_uploads()
    }

    fn upload(&self, files: Vec<UploadFile>) -> impl Future<Output = Result<MessageReply>> + Send {
        self.as_ref().upload(files)
    }

    fn stitch(&self) -> impl Future<Output = Result<StitchReply>> + Send {
        self.as_ref().stitch()
    }

    fn generate_panorama(&self) -> impl Future<Output = Result<PanoramaEnvelope>> + Send {
        self.as_ref().generate_panorama()
    }

    fn list_files(&self, cache_buster: u64) -> impl Future<Output = Result<FileListing>> + Send {
        self.as_ref().list_files(cache_buster)
    }

    fn fetch_file(
        &self,
        name: &str,
        cache_buster: u64,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send {
        self.as_ref().fetch_file(name, cache_buster)
    }
}

/// [`PanoramaService`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpService {
    client: Client,
    base_url: String,
}

impl HttpService {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(Error::Transport)?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        resolve(&self.base_url, path)
    }

    /// Location of one served file, with `name` encoded as a single path segment.
    fn file_url(&self, name: &str) -> Result<Url> {
        if name.is_empty() || name == "." || name == ".." {
            return Err(Error::InvalidUrl(format!("{name:?} is not a file name")));
        }
        let mut url = Url::parse(&self.url(SERVE_FILES))
            .map_err(|err| Error::InvalidUrl(format!("{}: {err}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push(name);
        Ok(url)
    }
}

impl PanoramaService for HttpService {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self), fields(base = %self.base_url))]
    async fn clear_uploads(&self) -> Result<MessageReply> {
        let response = self.client.delete(self.url(CLEAR_UPLOADS)).send().await?;
        read_json(response, |status| status == StatusCode::OK).await
    }

    #[instrument(skip(self, files), fields(base = %self.base_url, count = files.len()))]
    async fn upload(&self, files: Vec<UploadFile>) -> Result<MessageReply> {
        let mut form = Form::new();
        for file in files {
            let mime = file.mime_type();
            let mut part = Part::bytes(file.bytes).file_name(file.file_name);
            if let Some(mime) = mime {
                part = part.mime_str(mime)?;
            }
            form = form.part(UPLOAD_FIELD, part);
        }
        let response = self
            .client
            .post(self.url(UPLOAD))
            .multipart(form)
            .send()
            .await?;
        read_json(response, |status| status.is_success()).await
    }

    #[instrument(skip(self), fields(base = %self.base_url))]
    async fn stitch(&self) -> Result<StitchReply> {
        let response = self.client.get(self.url(STITCH)).send().await?;
        read_json(response, |status| status.is_success()).await
    }

    #[instrument(skip(self), fields(base = %self.base_url))]
    async fn generate_panorama(&self) -> Result<PanoramaEnvelope> {
        let response = self
            .client
            .post(self.url(GENERATE_PANORAMA))
            .send()
            .await?;
        read_json(response, |status| status.is_success()).await
    }

    #[instrument(skip(self), fields(base = %self.base_url))]
    async fn list_files(&self, cache_buster: u64) -> Result<FileListing> {
        let response = self
            .client
            .get(self.url(SERVE_ALL_FILES))
            .query(&[(CACHE_BUST_PARAM, cache_buster)])
            .send()
            .await?;
        read_json(response, |status| status.is_success()).await
    }

    #[instrument(skip(self), fields(base = %self.base_url))]
    async fn fetch_file(&self, name: &str, cache_buster: u64) -> Result<Vec<u8>> {
        let url = self.file_url(name)?;
        let response = self
            .client
            .get(url)
            .query(&[(CACHE_BUST_PARAM, cache_buster)])
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                message: message_from_body(&body),
            });
        }
        debug!(bytes = body.len(), "file fetched");
        Ok(body.to_vec())
    }
}

async fn read_json<T, F>(response: Response, accept: F) -> Result<T>
where
    T: DeserializeOwned,
    F: FnOnce(StatusCode) -> bool,
{
    let status = response.status();
    let body = response.bytes().await?;
    debug!(status = status.as_u16(), bytes = body.len(), "response received");
    if !accept(status) {
        return Err(Error::Status {
            status: status.as_u16(),
            message: message_from_body(&body),
        });
    }
    Ok(serde_json::from_slice(&body)?)
}

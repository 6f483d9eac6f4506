use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use reqwest::Url;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    pub service: ServiceConfig,
    pub workflow: WorkflowConfig,
    pub gallery: GalleryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ServiceConfig {
    /// Where the processing service listens; also the prefix of every image reference.
    pub base_url: String,
    /// Upper bound for a single request. `None` waits for the transport to give up.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct WorkflowConfig {
    pub clear_on_start: bool,
    /// Served file the panorama slot points at after a successful generation.
    pub panorama_file: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GalleryConfig {
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            request_timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            clear_on_start: true,
            panorama_file: "panorama_4.jpg".to_string(),
        }
    }
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl ServiceConfig {
    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

impl Configuration {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let data = fs::read(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let cfg: Configuration = serde_yaml::from_slice(&data)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;
        Ok(cfg)
    }

    pub fn validated(mut self) -> Result<Self> {
        self.validate()?;
        self.service.base_url = self.service.base_url().to_string();
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(self.service.base_url())
            .with_context(|| format!("service.base-url {:?} is not a URL", self.service.base_url))?;
        ensure!(
            matches!(url.scheme(), "http" | "https"),
            "service.base-url must use http or https, got {}",
            url.scheme()
        );
        ensure!(
            url.query().is_none() && url.fragment().is_none(),
            "service.base-url must not carry a query or fragment"
        );
        if let Some(timeout) = self.service.request_timeout {
            ensure!(
                !timeout.is_zero(),
                "service.request-timeout must be positive when provided"
            );
        }

        let name = self.workflow.panorama_file.trim();
        ensure!(!name.is_empty(), "workflow.panorama-file must not be blank");
        ensure!(
            !name.contains('/') && !name.contains('?'),
            "workflow.panorama-file must be a bare file name"
        );

        ensure!(
            !self.gallery.poll_interval.is_zero(),
            "gallery.poll-interval must be positive"
        );
        Ok(())
    }
}

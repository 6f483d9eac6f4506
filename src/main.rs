//! Binary entrypoint for panoramer.
//!
//! Delegates all workflow logic to the library crate.

use std::io::{self, BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use panoramer::artifacts::ArtifactKind;
use panoramer::config::Configuration;
use panoramer::events::RefreshGallery;
use panoramer::gallery::{CacheBuster, Gallery, GalleryEntry};
use panoramer::service::{HttpService, PanoramaService};
use panoramer::tasks::{gallery_poll, notices};
use panoramer::workflow::{
    Controller, PanoramaOutcome, UploadOutcome, WorkflowSettings, WorkflowSnapshot,
};

#[derive(Debug, Parser)]
#[command(
    name = "panoramer",
    version,
    about = "Upload, stitch and browse images on a panorama service"
)]
struct Cli {
    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Override the service base URL
    #[arg(long, value_name = "URL", global = true)]
    base_url: Option<String>,

    /// Override the per-request timeout (e.g. "30s", "2m")
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration, global = true)]
    timeout: Option<Duration>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Delete every uploaded and generated file on the service.
    Clear,
    /// Upload images as one batch.
    Upload {
        #[arg(required = true, value_name = "IMAGE")]
        files: Vec<PathBuf>,
    },
    /// Stitch the two most recently uploaded images.
    Stitch,
    /// Generate the panorama from every uploaded image.
    Panorama,
    /// Full session: clear, upload, stitch, generate, then list the gallery.
    Run {
        #[arg(required = true, value_name = "IMAGE")]
        files: Vec<PathBuf>,
        /// Keep files left on the service by earlier sessions
        #[arg(long)]
        keep_uploads: bool,
    },
    /// List every stored file.
    Gallery {
        /// Keep polling; press Enter to refresh immediately
        #[arg(long)]
        watch: bool,
    },
    /// Download one served file.
    Fetch {
        name: String,
        #[arg(short, long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("panoramer={level}").parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("hyper=warn".parse()?);
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Configuration> {
    let mut cfg = match &cli.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(base_url) = &cli.base_url {
        cfg.service.base_url = base_url.clone();
    }
    if let Some(timeout) = cli.timeout {
        cfg.service.request_timeout = Some(timeout);
    }
    cfg.validated().context("invalid configuration values")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    let cfg = load_config(&cli)?;
    info!(base = %cfg.service.base_url(), "configuration loaded");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; cancelling");
            cancel.cancel();
        });
    }

    let service = HttpService::new(cfg.service.base_url(), cfg.service.request_timeout)
        .context("building HTTP client")?;
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(notices::run(notice_rx, io::stdout()));
    let controller = Controller::new(
        service,
        WorkflowSettings::from_config(&cfg),
        notice_tx,
        cancel.clone(),
    );

    let outcome = execute(cli.command, &cfg, &controller, &cancel).await;

    // Dropping the controller closes the notification channel.
    drop(controller);
    printer
        .await
        .context("notification printer panicked")?
        .context("writing notifications")?;
    outcome
}

async fn execute(
    command: Command,
    cfg: &Configuration,
    controller: &Controller<HttpService>,
    cancel: &CancellationToken,
) -> Result<()> {
    match command {
        Command::Clear => {
            controller.clear_uploads().await?;
        }
        Command::Upload { files } => {
            controller.add_files(files)?;
            report_upload(controller.upload().await?);
        }
        Command::Stitch => {
            let outcome = controller.stitch().await?;
            println!("stitched:       {}", outcome.stitched);
            println!("matched points: {}", outcome.matched_points);
        }
        Command::Panorama => {
            report_panorama(&controller.generate_panorama().await?);
        }
        Command::Run {
            files,
            keep_uploads,
        } => {
            if cfg.workflow.clear_on_start && !keep_uploads {
                controller.start_session().await?;
            }
            controller.add_files(files)?;
            report_upload(controller.upload().await?);
            controller.stitch().await?;
            report_panorama(&controller.generate_panorama().await?);
            print_artifacts(&controller.snapshot());

            let mut gallery = controller.open_gallery(Some(ArtifactKind::Panorama));
            gallery.refresh(controller.service()).await?;
            print_gallery(&gallery);
        }
        Command::Gallery { watch: false } => {
            let mut gallery = controller.open_gallery(None);
            gallery.refresh(controller.service()).await?;
            print_gallery(&gallery);
        }
        Command::Gallery { watch: true } => {
            watch_gallery(cfg, controller, cancel).await?;
        }
        Command::Fetch { name, out } => {
            let stamp = CacheBuster::new().next();
            let bytes = controller.service().fetch_file(&name, stamp).await?;
            let out = out.unwrap_or_else(|| PathBuf::from(&name));
            tokio::fs::write(&out, &bytes)
                .await
                .with_context(|| format!("writing {}", out.display()))?;
            println!("saved {} ({} bytes)", out.display(), bytes.len());
        }
    }
    Ok(())
}

async fn watch_gallery(
    cfg: &Configuration,
    controller: &Controller<HttpService>,
    cancel: &CancellationToken,
) -> Result<()> {
    let service = Arc::new(controller.service().clone());
    let (refresh_tx, refresh_rx) = mpsc::channel::<RefreshGallery>(4);
    let (snapshot_tx, mut snapshot_rx) = watch::channel(Vec::<GalleryEntry>::new());

    if io::stdin().is_terminal() {
        // Plain thread: a blocking stdin read must not hold up runtime shutdown.
        std::thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                if line.is_err() || refresh_tx.blocking_send(RefreshGallery).is_err() {
                    break;
                }
            }
        });
    } else {
        drop(refresh_tx);
    }

    let poller = tokio::spawn(gallery_poll::run(
        service,
        Gallery::new(cfg.service.base_url()),
        cfg.gallery.poll_interval,
        refresh_rx,
        snapshot_tx,
        cancel.clone(),
    ));

    let printer = Gallery::new(cfg.service.base_url());
    while snapshot_rx.changed().await.is_ok() {
        let entries = snapshot_rx.borrow_and_update().clone();
        println!("--- {} file(s)", entries.len());
        for entry in &entries {
            println!("{:<32} {}", entry.display_name, printer.image_url(entry));
        }
    }

    poller.await.context("gallery poller panicked")??;
    Ok(())
}

fn report_upload(outcome: UploadOutcome) {
    match outcome {
        UploadOutcome::Uploaded { count, message } => println!("uploaded {count} image(s): {message}"),
        UploadOutcome::NothingSelected => println!("nothing to upload"),
    }
}

fn report_panorama(outcome: &PanoramaOutcome) {
    match outcome {
        PanoramaOutcome::Generated {
            reference, count, ..
        } => println!("panorama ({count} produced): {reference}"),
        PanoramaOutcome::NoPanoramas { message } => {
            println!("service produced no panorama: {message}")
        }
    }
}

fn print_artifacts(snapshot: &WorkflowSnapshot) {
    if let Some(message) = snapshot.artifacts.status_message() {
        println!("{message}");
    }
    for kind in ArtifactKind::ALL {
        match snapshot.artifacts.get(kind) {
            Some(reference) => println!("{:<16} {reference}", kind.label()),
            None => println!("{:<16} -", kind.label()),
        }
    }
}

fn print_gallery(gallery: &Gallery) {
    let focused = gallery.focused().map(|entry| entry.display_name.as_str());
    for entry in gallery.entries() {
        let marker = if Some(entry.display_name.as_str()) == focused {
            "*"
        } else {
            " "
        };
        println!("{marker} {:<32} {}", entry.display_name, gallery.image_url(entry));
    }
}

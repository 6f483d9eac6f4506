use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc::Receiver;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::events::RefreshGallery;
use crate::gallery::{Gallery, GalleryEntry};
use crate::service::PanoramaService;

/// Keeps a gallery current until cancelled.
///
/// Rules:
/// - Fetch once on start, then on every `poll_every` tick and on every
///   [`RefreshGallery`] request.
/// - Publish each successful listing whole; failed fetches keep the last
///   published listing.
/// - A closed request channel only stops on-demand refreshes; ticks go on.
#[instrument(skip_all, fields(every = ?poll_every))]
pub async fn run<S: PanoramaService>(
    service: Arc<S>,
    mut gallery: Gallery,
    poll_every: Duration,
    mut refresh_rx: Receiver<RefreshGallery>,
    snapshots: watch::Sender<Vec<GalleryEntry>>,
    cancel: CancellationToken,
) -> Result<Gallery> {
    let mut ticker = interval(poll_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately and doubles as the on-open fetch.
    let mut requests_open = true;

    loop {
        select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting gallery poller");
                break;
            }
            _ = ticker.tick() => {
                debug!("gallery poll tick");
            }
            request = refresh_rx.recv(), if requests_open => {
                match request {
                    Some(RefreshGallery) => debug!("gallery refresh requested"),
                    None => {
                        debug!("refresh channel closed; polling only");
                        requests_open = false;
                        continue;
                    }
                }
            }
        }

        select! {
            _ = cancel.cancelled() => {
                info!("cancel received during gallery fetch");
                break;
            }
            result = gallery.refresh(service.as_ref()) => {
                if result.is_ok() {
                    snapshots.send_replace(gallery.entries().to_vec());
                }
            }
        }
    }

    Ok(gallery)
}

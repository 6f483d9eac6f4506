use std::io::Write;

use anyhow::Result;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::events::{NoticeLevel, Notification};

/// Drains notifications into `out`, one line each, until every sender is gone.
pub async fn run<W: Write + Send>(
    mut notices: UnboundedReceiver<Notification>,
    mut out: W,
) -> Result<W> {
    while let Some(notice) = notices.recv().await {
        match notice.level {
            NoticeLevel::Failure => {
                warn!(operation = %notice.operation, text = %notice.text, "failure notice")
            }
            _ => info!(operation = %notice.operation, text = %notice.text, "notice"),
        }
        writeln!(out, "{}", render(&notice))?;
        out.flush()?;
    }
    Ok(out)
}

pub fn render(notice: &Notification) -> String {
    let tag = match notice.level {
        NoticeLevel::Success => "ok",
        NoticeLevel::Info => "--",
        NoticeLevel::Failure => "!!",
    };
    format!("[{tag}] {}: {}", notice.operation, notice.text)
}

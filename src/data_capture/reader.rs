//! Per-capture output reader.
//!
//! One task per capture process consumes stdout line by line, classifies each
//! line and appends visits to the visit log. It never touches supervisor state
//! and ends on its own when the process closes its output.

use std::net::IpAddr;
use std::sync::Arc;

use log::{debug, info, trace, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use super::classifier::Classifier;
use super::resolver::HostResolver;
use super::types::{CaptureTarget, VisitRecord};
use crate::storage::storage_trait::VisitLog;

pub struct ReaderContext {
    pub target: CaptureTarget,
    pub classifier: Classifier,
    pub visit_log: Arc<dyn VisitLog>,
    pub resolver: Arc<dyn HostResolver>,
}

/// Reads `output` until EOF and returns the number of visits recorded.
///
/// Read errors end the task with a warning; a bad line or a failed lookup only
/// skips that line.
pub async fn read_capture_output<R>(output: R, ctx: ReaderContext) -> usize
where
    R: AsyncRead + Unpin,
{
    let real = ctx.target.real_address.clone();
    let mut reader = BufReader::new(output);
    let mut buf = Vec::new();
    let mut visits = 0usize;

    debug!("[{}] Capture reader started ({})", real, ctx.target.session_id);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                info!("[{}] Capture output closed, stop monitoring user traffic", real);
                break;
            }
            Ok(_) => {
                // tcpdump prints raw bytes from some protocols; don't let them end the task
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end();
                trace!("[{}] {}", real, line);
                if let Some(destination) = ctx.classifier.classify(line) {
                    record_visit(&ctx, destination).await;
                    visits += 1;
                }
            }
            Err(e) => {
                warn!("[{}] Failed to read capture output: {}", real, e);
                break;
            }
        }
    }

    visits
}

/// Resolves and appends off the executor: reverse DNS and the file write both block.
async fn record_visit(ctx: &ReaderContext, destination: IpAddr) {
    let resolver = Arc::clone(&ctx.resolver);
    let visit_log = Arc::clone(&ctx.visit_log);
    let target = ctx.target.clone();

    let appended = tokio::task::spawn_blocking(move || {
        let hostname = resolver.resolve(destination);
        info!(
            "[{}] Traffic detected: {} -> {} ({})",
            target.real_address,
            target.virtual_address,
            hostname.as_deref().unwrap_or("unknown"),
            destination
        );
        let record = VisitRecord::new(&target, destination.to_string(), hostname);
        visit_log.append(&record).map_err(|e| e.to_string())
    })
    .await
    .unwrap_or_else(|e| Err(e.to_string()));

    if let Err(e) = appended {
        warn!(
            "[{}] Visit to {} not recorded: {}",
            ctx.target.real_address, destination, e
        );
    }
}

/// Forwards the capture tool's stderr to the debug log.
pub async fn drain_stderr<R>(stderr: R, real_address: String)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("[{}][stderr] {}", real_address, line);
    }
    debug!("[{}] stderr monitoring ended", real_address);
}

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::notify::Notifier;
use super::repository::DossierRepository;
use super::service::DossierService;

/// Starts the periodic CNAPS status re-check. An interval of zero disables
/// the poller. The poller shares the repository's update path with request
/// handlers; interleaved writes are last-writer-wins, which is the accepted
/// concurrency contract of this service.
pub fn spawn<R, N>(
    service: Arc<DossierService<R, N>>,
    interval_secs: u64,
) -> Option<JoinHandle<()>>
where
    R: DossierRepository + 'static,
    N: Notifier + 'static,
{
    if interval_secs == 0 {
        return None;
    }
    info!(interval_secs, "starting cnaps status poller");
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval fires immediately; the first pass should wait a full period
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let refreshed = service.refresh_all_cnaps().await;
            debug!(refreshed, "cnaps poll pass complete");
        }
    }))
}

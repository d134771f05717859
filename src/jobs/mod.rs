//! Periodic background jobs

use std::sync::Arc;
use std::time::Duration;

use serde_yaml::Value;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::actions::WebActions;
use crate::services::WallpaperService;

const META_CACHE_SAVE: Duration = Duration::from_secs(600);
const QUEUE_SWEEP: Duration = Duration::from_secs(60);
const UNKNOWN_META_CLEANUP: Duration = Duration::from_secs(12 * 3600);
const WALLPAPER_REFRESH: Duration = Duration::from_secs(3600);
const SESSION_PRUNE: Duration = Duration::from_secs(3600);

/// Longest accepted media server sync interval
const MAX_MEDIASYNC_HOURS: f64 = 24.0 * 365.0;

/// Hours between media server syncs. Integers and numeric strings are
/// accepted; fractional values are rounded.
pub fn mediasync_hours(value: Option<&Value>) -> Option<u64> {
    let hours = match value? {
        Value::Number(n) => n.as_i64().map(|h| h as f64).or_else(|| n.as_f64()),
        Value::String(s) if s.trim().is_empty() => return None,
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Null => return None,
        other => {
            warn!(value = ?other, "Unsupported media sync interval, job disabled");
            return None;
        }
    };
    match hours {
        Some(h) if (1.0..=MAX_MEDIASYNC_HOURS).contains(&h.round()) => Some(h.round() as u64),
        Some(h) => {
            warn!(hours = h, "Media sync interval out of range, job disabled");
            None
        }
        None => {
            warn!(value = ?value, "Invalid media sync interval, job disabled");
            None
        }
    }
}

/// Initialize and start the job scheduler. Cancelling `shutdown` stops it.
pub async fn start_scheduler(
    actions: Arc<WebActions>,
    wallpaper: Arc<WallpaperService>,
    shutdown: CancellationToken,
) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;
    let settings = actions.settings.snapshot();

    // Media server sync
    if let Some(hours) = mediasync_hours(settings.media.mediasync_interval.as_ref()) {
        let media_sync = actions.media_sync.clone();
        let job = Job::new_repeated_async(Duration::from_secs(hours.saturating_mul(3600)), move |_uuid, _l| {
            let media_sync = media_sync.clone();
            Box::pin(async move {
                info!("Running media server sync");
                if let Err(e) = media_sync.sync().await {
                    error!(error = %e, "Media server sync failed");
                }
            })
        })?;
        scheduler.add(job).await?;
        info!(hours, "Media server sync scheduled");
    }

    // Metadata cache flush
    let meta_cache = actions.meta_cache.clone();
    let save_job = Job::new_repeated_async(META_CACHE_SAVE, move |_uuid, _l| {
        let meta_cache = meta_cache.clone();
        Box::pin(async move {
            match meta_cache.save(false) {
                Ok(true) => debug!("Metadata cache saved"),
                Ok(false) => {}
                Err(e) => error!(error = %e, "Failed to save metadata cache"),
            }
        })
    })?;
    scheduler.add(save_job).await?;

    // Files queued while a sync directory was busy
    let sync = actions.sync.clone();
    let sweep_job = Job::new_repeated_async(QUEUE_SWEEP, move |_uuid, _l| {
        let sync = sync.clone();
        Box::pin(async move {
            if let Err(e) = sync.sweep_queue().await {
                error!(error = %e, "Queued transfer sweep failed");
            }
        })
    })?;
    scheduler.add(sweep_job).await?;

    let meta_cache = actions.meta_cache.clone();
    let cleanup_job = Job::new_repeated_async(UNKNOWN_META_CLEANUP, move |_uuid, _l| {
        let meta_cache = meta_cache.clone();
        Box::pin(async move {
            let removed = meta_cache.delete_unknown();
            info!(removed, "Unknown metadata entries removed");
        })
    })?;
    scheduler.add(cleanup_job).await?;

    let sessions = actions.sessions.clone();
    let session_job = Job::new_repeated_async(SESSION_PRUNE, move |_uuid, _l| {
        let sessions = sessions.clone();
        Box::pin(async move {
            let removed = sessions.prune_expired();
            if removed > 0 {
                debug!(removed, "Expired sessions pruned");
            }
        })
    })?;
    scheduler.add(session_job).await?;

    let wp = wallpaper.clone();
    let wallpaper_job = Job::new_repeated_async(WALLPAPER_REFRESH, move |_uuid, _l| {
        let wp = wp.clone();
        Box::pin(async move {
            if let Err(e) = wp.refresh().await {
                error!(error = %e, "Wallpaper refresh failed");
            }
        })
    })?;
    scheduler.add(wallpaper_job).await?;

    let wp = wallpaper;
    let wallpaper_now = Job::new_one_shot_async(Duration::from_secs(1), move |_uuid, _l| {
        let wp = wp.clone();
        Box::pin(async move {
            if let Err(e) = wp.refresh().await {
                warn!(error = %e, "Initial wallpaper refresh failed");
            }
        })
    })?;
    scheduler.add(wallpaper_now).await?;

    scheduler.start().await?;

    let mut stopper = scheduler.clone();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        if let Err(e) = stopper.shutdown().await {
            error!(error = %e, "Failed to stop job scheduler");
        } else {
            info!("Job scheduler stopped");
        }
    });

    info!("Job scheduler started");
    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mediasync_hours() {
        assert_eq!(mediasync_hours(None), None);
        assert_eq!(mediasync_hours(Some(&Value::from(6))), Some(6));
        assert_eq!(mediasync_hours(Some(&Value::from("12"))), Some(12));
        assert_eq!(mediasync_hours(Some(&Value::from("2.6"))), Some(3));
        assert_eq!(mediasync_hours(Some(&Value::from(""))), None);
        assert_eq!(mediasync_hours(Some(&Value::from("daily"))), None);
        assert_eq!(mediasync_hours(Some(&Value::from(0))), None);
    }

    #[test]
    fn test_mediasync_hours_upper_bound() {
        assert_eq!(mediasync_hours(Some(&Value::from(8760))), Some(8760));
        assert_eq!(mediasync_hours(Some(&Value::from(8761))), None);
        assert_eq!(mediasync_hours(Some(&Value::from(u64::MAX))), None);
        assert_eq!(mediasync_hours(Some(&Value::from("1e300"))), None);
        assert_eq!(mediasync_hours(Some(&Value::from(f64::MAX))), None);
    }
}

//! Daily cycle trigger.

use crate::config::ScheduleConfig;
use crate::cycle::{CycleManager, CycleTrigger};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// The first configured time of day strictly after `now`.
#[must_use]
pub fn next_run_after(now: DateTime<Utc>, schedule: ScheduleConfig) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(schedule.hour, schedule.minute, schedule.second)
        .unwrap_or(NaiveTime::MIN);
    let today = now.date_naive().and_time(time).and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Fire a cycle every day at the configured time until `shutdown` flips.
///
/// Cycle failures are logged; the schedule keeps going.
pub async fn run_schedule(
    cycles: Arc<CycleManager>,
    schedule: ScheduleConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut last_fire = Utc::now();
    loop {
        let now = Utc::now().max(last_fire);
        let next = next_run_after(now, schedule);
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        info!("Next selection cycle at {next}");

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Schedule stopped");
                    return;
                }
            }
            () = tokio::time::sleep(wait) => {
                last_fire = next;
                match cycles.run_cycle(CycleTrigger::Schedule).await {
                    Ok(report) => info!("Scheduled cycle done: {report:?}"),
                    Err(crate::cycle::CycleError::AlreadyRunning) => {
                        warn!("Scheduled cycle skipped: another cycle is running");
                    }
                    Err(e) => error!("Scheduled cycle failed: {e}"),
                }
            }
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use tokio::task::JoinHandle;

use crate::messenger::Messenger;
use crate::notify::Notifier;

/// The next instant after `now` at which the wall clock in `tz` reads `hour:00`.
/// Days on which that local time does not exist are skipped.
pub fn next_daily_run(now: DateTime<Utc>, hour: u32, tz: Tz) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let mut date = now.with_timezone(&tz).date_naive();

    loop {
        if let Some(candidate) = date.and_time(time).and_local_timezone(tz).earliest() {
            let candidate = candidate.to_utc();
            if candidate > now {
                return candidate;
            }
        }
        date = date.succ_opt().expect("Date out of range");
    }
}

async fn run_cycle(notifier: &Notifier, messenger: &dyn Messenger) {
    if let Err(e) = notifier.run_cycle(messenger).await {
        log::error!("Notification cycle failed: {e}");
    }
}

/// Handles of the startup and daily notification jobs.
pub struct Scheduler {
    jobs: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start<M: Messenger + 'static>(
        notifier: Arc<Notifier>,
        messenger: Arc<M>,
        startup_delay: Duration,
        hour: u32,
        tz: Tz,
    ) -> Self {
        let once = {
            let notifier = notifier.clone();
            let messenger = messenger.clone();
            tokio::spawn(async move {
                tokio::time::sleep(startup_delay).await;
                run_cycle(&notifier, messenger.as_ref()).await;
            })
        };

        let daily = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = next_daily_run(now, hour, tz);
                log::info!("Next scheduled notification at {}", next.with_timezone(&tz));
                tokio::time::sleep((next - now).to_std().unwrap_or_default()).await;
                run_cycle(&notifier, messenger.as_ref()).await;
            }
        });

        Self {
            jobs: vec![once, daily],
        }
    }

    /// Cancels pending jobs. A cycle that is currently sending is abandoned.
    pub fn shutdown(self) {
        for job in self.jobs {
            job.abort();
        }
    }
}

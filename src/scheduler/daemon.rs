use std::time::Duration;

use chrono::Utc;
use tokio::{task::JoinHandle, time::sleep};
use tracing::{error, info};

use crate::scheduler::{NotificationScheduler, cadence::DailyCadence};
use crate::util::time::kst;

const SWEEP_HOUR: u32 = 9;
const SWEEP_MINUTE: u32 = 0;

/// 毎日09:00 KSTに通知スイープを実行するデーモンを起動する。
pub fn spawn_kst_notification_daemon(scheduler: NotificationScheduler) -> JoinHandle<()> {
    let tz = kst();
    let cadence = DailyCadence::new(tz, SWEEP_HOUR, SWEEP_MINUTE);
    NotificationDaemon { scheduler, cadence }.spawn()
}

struct NotificationDaemon {
    scheduler: NotificationScheduler,
    cadence: DailyCadence,
}

impl NotificationDaemon {
    fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        loop {
            let now = Utc::now();
            let next = self.cadence.next_run_from(now);
            let wait = duration_until(next, now);
            let next_local = next.with_timezone(&kst());
            info!(
                next_run_utc = %next.to_rfc3339(),
                next_run_kst = %next_local.to_rfc3339(),
                wait_seconds = wait.as_secs(),
                "scheduled daily notification sweep"
            );
            sleep(wait).await;

            match self.scheduler.run_sweep(Utc::now()).await {
                Ok(outcome) => info!(
                    evaluated = outcome.evaluated,
                    sent = outcome.sent_user_ids.len(),
                    "daily notification sweep completed"
                ),
                Err(err) => error!(error = %err, "daily notification sweep failed"),
            }
        }
    }
}

fn duration_until(next: chrono::DateTime<Utc>, now: chrono::DateTime<Utc>) -> Duration {
    match (next - now).to_std() {
        Ok(duration) => duration,
        Err(_) => Duration::from_secs(0),
    }
}

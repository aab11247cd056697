use chrono::NaiveDateTime;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

use crate::tracker_config::TrackerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollTrigger {
    Startup,
    Boundary,
    Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollSchedule {
    pub first_delay: Duration,
    pub period: Duration,
}

impl RollSchedule {
    pub fn from_now(config: &TrackerConfig, now: NaiveDateTime) -> Self {
        let first_delay = (config.next_roll_at(now) - now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        Self {
            first_delay,
            period: config.roll_period(),
        }
    }
}

#[derive(Debug)]
pub struct RollSchedulerHandle {
    shutdown: Option<oneshot::Sender<()>>,
}

impl RollSchedulerHandle {
    pub fn cancel(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
            log::debug!("roll scheduler cancelled");
        }
    }

    pub fn is_active(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

impl Drop for RollSchedulerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub fn roll_scheduler<F>(
    schedule: RollSchedule,
    mut on_roll: F,
) -> (RollSchedulerHandle, impl Future<Output = ()> + Send + 'static)
where
    F: FnMut(RollTrigger) + Send + 'static,
{
    let (tx, mut shutdown) = oneshot::channel::<()>();
    let task = async move {
        on_roll(RollTrigger::Startup);

        tokio::select! {
            biased;
            _ = &mut shutdown => return,
            _ = sleep(schedule.first_delay) => {}
        }
        on_roll(RollTrigger::Boundary);

        let period = schedule.period.max(Duration::from_secs(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => on_roll(RollTrigger::Interval),
            }
        }
    };
    (
        RollSchedulerHandle { shutdown: Some(tx) },
        task,
    )
}

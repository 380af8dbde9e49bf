//! Status and progress timers of a polling session.
//!
//! Both timers are owned task handles; `start` always releases the previous
//! pair first so at most one status timer and one progress timer exist.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info_span, Instrument};

use dl_core::pairing::SessionEvent;

use super::controller::ControllerShared;

pub(crate) struct PollLoop {
    status: Option<AbortHandle>,
    progress: Option<AbortHandle>,
    in_flight: Option<AbortHandle>,
    /// Bumped on every start and stop; a task whose epoch is stale exits.
    epoch: u64,
}

impl PollLoop {
    pub(crate) fn new() -> Self {
        Self {
            status: None,
            progress: None,
            in_flight: None,
            epoch: 0,
        }
    }

    /// (Re)start both timers. The first poll happens after `settle_delay`.
    pub(crate) fn start(
        &mut self,
        shared: &Arc<ControllerShared>,
        generation: u64,
        settle_delay: Duration,
    ) {
        self.stop();
        let epoch = self.epoch;
        let config = &shared.config;

        self.status = Some(spawn_status_ticker(
            Arc::downgrade(shared),
            generation,
            epoch,
            settle_delay,
            config.poll_interval,
        ));
        self.progress = Some(spawn_progress_ticker(
            Arc::downgrade(shared),
            generation,
            epoch,
            config.progress_interval,
            config.progress_step(),
        ));
        tracing::debug!(generation, epoch, ?settle_delay, "poll loop started");
    }

    pub(crate) fn stop(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        for handle in [
            self.status.take(),
            self.progress.take(),
            self.in_flight.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub(crate) fn active_handles(&self) -> usize {
        [&self.status, &self.progress, &self.in_flight]
            .into_iter()
            .filter(|handle| is_live(handle))
            .count()
    }

    /// Live (status, progress) tickers.
    #[cfg(test)]
    pub(crate) fn live_tickers(&self) -> (usize, usize) {
        (
            usize::from(is_live(&self.status)),
            usize::from(is_live(&self.progress)),
        )
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    fn has_poll_in_flight(&self) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

fn is_live(handle: &Option<AbortHandle>) -> bool {
    handle.as_ref().is_some_and(|h| !h.is_finished())
}

impl Drop for PollLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_status_ticker(
    shared: Weak<ControllerShared>,
    generation: u64,
    epoch: u64,
    settle_delay: Duration,
    poll_interval: Duration,
) -> AbortHandle {
    let span = info_span!("pairing.poll_loop", generation, epoch);
    tokio::spawn(
        async move {
            tokio::time::sleep(settle_delay).await;
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let Some(strong) = shared.upgrade() else {
                    break;
                };
                let mut ctx = strong.context.lock().await;
                if ctx.generation != generation || !ctx.poll_loop.is_current(epoch) {
                    break;
                }
                if ctx.poll_loop.has_poll_in_flight() {
                    tracing::debug!("previous poll has not resolved, skipping tick");
                    continue;
                }
                let poll = tokio::spawn(poll_once(shared.clone(), generation, epoch).in_current_span());
                ctx.poll_loop.in_flight = Some(poll.abort_handle());
            }
        }
        .instrument(span),
    )
    .abort_handle()
}

async fn poll_once(shared: Weak<ControllerShared>, generation: u64, epoch: u64) {
    let Some(client) = shared.upgrade().map(|strong| strong.client.clone()) else {
        return;
    };
    let result = client.poll_status().await;

    let Some(strong) = shared.upgrade() else {
        return;
    };
    let mut ctx = strong.context.lock().await;
    if ctx.generation != generation || !ctx.poll_loop.is_current(epoch) {
        tracing::debug!("discarding stale poll result");
        return;
    }
    ctx.poll_loop.in_flight = None;

    let event = match result {
        Ok(report) => {
            tracing::debug!(status = ?report.status, has_code = report.code.is_some(), "poll result");
            SessionEvent::TickResult {
                status: report.status,
                code: report.code,
                message: report.message,
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "poll_status failed, skipping tick");
            SessionEvent::TickFailed {
                error: err.to_string(),
            }
        }
    };
    strong.dispatch(&mut ctx, event);
}

fn spawn_progress_ticker(
    shared: Weak<ControllerShared>,
    generation: u64,
    epoch: u64,
    progress_interval: Duration,
    step: f64,
) -> AbortHandle {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + progress_interval, progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let Some(strong) = shared.upgrade() else {
                break;
            };
            let mut ctx = strong.context.lock().await;
            if ctx.generation != generation || !ctx.poll_loop.is_current(epoch) {
                break;
            }
            strong.dispatch(&mut ctx, SessionEvent::ProgressTick { step });
        }
    })
    .abort_handle()
}

//! Watchdog for a poll loop that stopped on its own.
//!
//! If the session is polling with a code and a non-terminal status but no
//! status timer is alive, the monitor restarts the loop once after a
//! debounce. It never touches the session itself.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info_span, Instrument};

use super::controller::{ControllerShared, SessionContext};

enum Health {
    Healthy,
    Stalled,
    Gone,
}

pub(crate) fn spawn(shared: &Arc<ControllerShared>, generation: u64) -> AbortHandle {
    let weak = Arc::downgrade(shared);
    let check_interval = shared.config.recovery_check_interval;
    let debounce = shared.config.recovery_debounce;
    let span = info_span!("pairing.recovery_monitor", generation);

    tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + check_interval, check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match check(&weak, generation).await {
                    Health::Healthy => continue,
                    Health::Gone => break,
                    Health::Stalled => {}
                }

                tokio::time::sleep(debounce).await;

                let Some(strong) = weak.upgrade() else {
                    break;
                };
                let mut ctx = strong.context.lock().await;
                if ctx.generation != generation {
                    break;
                }
                if is_stalled(&ctx) {
                    tracing::warn!("Poll loop is not running while a code is pending, restarting");
                    ctx.poll_loop.start(&strong, generation, Duration::ZERO);
                }
            }
        }
        .instrument(span),
    )
    .abort_handle()
}

async fn check(shared: &Weak<ControllerShared>, generation: u64) -> Health {
    let Some(strong) = shared.upgrade() else {
        return Health::Gone;
    };
    let ctx = strong.context.lock().await;
    if ctx.generation != generation {
        Health::Gone
    } else if is_stalled(&ctx) {
        Health::Stalled
    } else {
        Health::Healthy
    }
}

fn is_stalled(ctx: &SessionContext) -> bool {
    ctx.machine.session().expects_polling() && !ctx.poll_loop.is_running()
}

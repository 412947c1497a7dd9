//! Hourly status refresh.
//!
//! The game resets rolls once an hour at a fixed minute. A `$tu` sent a few
//! seconds after that minute refreshes the budget for the new batch.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::{debug, info, warn};

use crate::agent::session::SessionContext;
use crate::error::SessionError;

/// Second of the minute at which the refresh is sent.
const REFRESH_SECOND: u32 = 5;

/// Cron schedule firing every hour at `minute`, second 5, UTC.
pub fn status_schedule(minute: u32) -> Result<Schedule, SessionError> {
    let expr = format!("{REFRESH_SECOND} {minute} * * * *");
    Schedule::from_str(&expr).map_err(|e| SessionError::Schedule(format!("{expr}: {e}")))
}

/// Next refresh strictly after `after`.
pub fn next_refresh(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

/// Send `$tu` now, then on every tick of the schedule.
pub fn spawn_heartbeat(
    ctx: Arc<SessionContext>,
    schedule: Schedule,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = ctx.actuator.request_status().await {
            warn!(error = %e, "Initial status request failed");
        }

        loop {
            let now = Utc::now();
            let Some(next) = next_refresh(&schedule, now) else {
                warn!("Status schedule has no upcoming ticks, heartbeat stopped");
                return;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            debug!(next = %next, "Next status refresh scheduled");
            tokio::time::sleep(wait).await;

            info!("Hourly status refresh");
            if let Err(e) = ctx.actuator.request_status().await {
                warn!(error = %e, "Status request failed");
            }
        }
    })
}

//! Outbound actions, paced by rate limiters.
//!
//! Every reaction, button click and sent command goes through a limiter.
//! Reactions and clicks share one; chat commands have their own.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::channels::ChatClient;
use crate::config::RateLimitConfig;
use crate::error::ChannelError;
use crate::mudae::{ClaimableRoll, KakeraRoll, STATUS_COMMAND};

/// Reaction used to claim a roll that is not wished.
pub const CLAIM_EMOJI: &str = "\u{2764}\u{fe0f}";

/// One permit per interval. Waiters are served in arrival order.
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Wait until the next slot is free and take it.
    pub async fn acquire(&self) {
        let mut next = self.next_slot.lock().await;
        let now = Instant::now();
        if *next > now {
            tokio::time::sleep_until(*next).await;
        }
        *next = Instant::now() + self.interval;
    }
}

pub struct Actuator {
    client: Arc<dyn ChatClient>,
    react_limiter: RateLimiter,
    command_limiter: RateLimiter,
}

impl Actuator {
    pub fn new(client: Arc<dyn ChatClient>, limits: &RateLimitConfig) -> Self {
        Self {
            client,
            react_limiter: RateLimiter::new(limits.react_interval()),
            command_limiter: RateLimiter::new(limits.command_interval()),
        }
    }

    pub async fn send_command(&self, text: &str) -> Result<(), ChannelError> {
        self.command_limiter.acquire().await;
        debug!(command = text, "Sending command");
        self.client.send(text).await
    }

    /// Ask the game for a fresh status report.
    pub async fn request_status(&self) -> Result<(), ChannelError> {
        self.send_command(STATUS_COMMAND).await
    }

    /// Claim a roll: a heart reaction, or the roll's buttons when it is wished.
    pub async fn claim(&self, roll: &ClaimableRoll) -> Result<(), ChannelError> {
        if roll.is_wished() && !roll.claim_buttons.is_empty() {
            for button in &roll.claim_buttons {
                self.react_limiter.acquire().await;
                self.client.click_component(roll.message.id, button).await?;
            }
        } else {
            self.react_limiter.acquire().await;
            self.client.add_reaction(roll.message.id, CLAIM_EMOJI).await?;
        }
        info!(character = %roll.character, series = %roll.series, "Claimed");
        Ok(())
    }

    /// Click every kakera button on the roll.
    pub async fn kakera_react(&self, roll: &KakeraRoll) -> Result<(), ChannelError> {
        for button in &roll.buttons {
            self.react_limiter.acquire().await;
            self.client
                .click_component(roll.message.id, &button.component_id)
                .await?;
        }
        info!(kakera = roll.kakera_value, "Kakera collected");
        Ok(())
    }
}

//! Message classifier: one raw chat message in, at most one typed event out.
//!
//! Shapes are tried most specific first and the first match wins:
//! 1. roll command (any participant)
//! 2. roulette-limit reply
//! 3. claimable roll
//! 4. kakera roll
//! 5. status report
//!
//! Everything except roll commands must come from the game bot.

use tracing::{debug, warn};

use crate::channels::{ChatMessage, Identity};
use crate::mudae::command::{parse_roll_command, parse_roulette_limited};
use crate::mudae::roll::{parse_claimable, parse_kakera};
use crate::mudae::timer::parse_timer_status;
use crate::mudae::types::Event;

/// What the classifier needs to know about the session.
#[derive(Debug, Clone)]
pub struct ClassifierContext {
    /// The automated user.
    pub me: Identity,
    /// Author id of the game bot.
    pub game_bot_id: u64,
}

/// Stateless classifier.
#[derive(Debug, Clone)]
pub struct Classifier {
    ctx: ClassifierContext,
}

impl Classifier {
    pub fn new(ctx: ClassifierContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ClassifierContext {
        &self.ctx
    }

    /// Classify a message. Never fails; unrecognised or malformed input is `None`.
    pub fn classify(&self, msg: &ChatMessage) -> Option<Event> {
        if let Some(command) = parse_roll_command(msg) {
            return Some(Event::RollCommand(command));
        }

        if msg.author.id != self.ctx.game_bot_id {
            return None;
        }

        if let Some(limited) = parse_roulette_limited(msg) {
            return Some(Event::RouletteLimited(limited));
        }

        match parse_claimable(msg, &self.ctx.me) {
            Ok(Some(roll)) => return Some(Event::ClaimableRoll(roll)),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Dropping malformed roll");
                return None;
            }
        }

        if let Some(roll) = parse_kakera(msg) {
            return Some(Event::KakeraRoll(roll));
        }

        if let Some(status) = parse_timer_status(msg, &self.ctx.me) {
            return Some(Event::TimerStatus(status));
        }

        debug!(message = %msg.summary(), "Message not recognised");
        None
    }
}

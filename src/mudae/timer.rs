//! Status report (`$tu`) parsing.
//!
//! Each pattern is a contract against the game's message format. A report
//! missing any field is rejected as a whole; the budget is never updated from
//! a partial read.

use std::sync::LazyLock;

use regex::Regex;

use crate::channels::{ChatMessage, Identity};
use crate::mudae::markup;
use crate::mudae::types::TimerStatus;

/// Trailer the game appends to every status report.
pub const STATUS_MARKER: &str = "=> $tuarrange";

static CLAIM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"you (can|can't) claim").expect("claim pattern"));

static ROLLS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"You have (\d+) rolls? left").expect("rolls pattern"));

static KAKERA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"You (can|can't) react to kakera").expect("kakera pattern"));

static POWER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3})\s*%").expect("power pattern"));

static CLAIM_RESET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:The next claim reset is in|you can't claim for another)\s+(?:(\d+)h\s*)?(\d+)\s*min",
    )
    .expect("claim reset pattern")
});

/// Parse a status report addressed to `me`.
pub fn parse_timer_status(msg: &ChatMessage, me: &Identity) -> Option<TimerStatus> {
    let clean = markup::strip(&msg.content).replace('\u{2019}', "'");

    let my_name = markup::strip(&me.display_name);
    if my_name.is_empty() || !clean.starts_with(&my_name) || !clean.contains(STATUS_MARKER) {
        return None;
    }

    let can_claim = &CLAIM.captures(&clean)?[1] == "can";
    let rolls_available: u32 = ROLLS.captures(&clean)?[1].parse().ok()?;

    let kakera = KAKERA.captures(&clean)?;
    let can_kakera_react = &kakera[1] == "can";

    // Power is the first percentage after the kakera sentence.
    let kakera_end = kakera.get(0)?.end();
    let kakera_power: u8 = POWER.captures(&clean[kakera_end..])?[1].parse().ok()?;
    if kakera_power > 100 {
        return None;
    }

    let reset = CLAIM_RESET.captures(&clean)?;
    let hours: u32 = match reset.get(1) {
        Some(h) => h.as_str().parse().ok()?,
        None => 0,
    };
    let minutes: u32 = reset[2].parse().ok()?;

    Some(TimerStatus {
        can_claim,
        rolls_available,
        can_kakera_react,
        kakera_power,
        minutes_to_next_reset: hours * 60 + minutes,
    })
}

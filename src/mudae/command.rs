//! Roll commands and the roulette-limit reply.

use std::sync::LazyLock;

use regex::Regex;

use crate::channels::ChatMessage;
use crate::mudae::markup;
use crate::mudae::types::{MessageRef, ROLL_COMMANDS, RollCommand, RouletteLimited};

static ROULETTE_LIMITED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(.+), the roulette is limited to (\d+) uses per hour\. (\d+) min left\.")
        .expect("roulette pattern")
});

/// A message whose whole text is one of the roll trigger phrases.
pub fn parse_roll_command(msg: &ChatMessage) -> Option<RollCommand> {
    let text = msg.content.trim();
    let command = ROLL_COMMANDS.iter().find(|c| **c == text)?;
    Some(RollCommand {
        owner: msg.author.clone(),
        issued_at: msg.created_at,
        command: (*command).to_string(),
        message_id: msg.id,
    })
}

/// The game refusing a roll because the hourly quota is used up.
pub fn parse_roulette_limited(msg: &ChatMessage) -> Option<RouletteLimited> {
    let clean = markup::strip(&msg.content);
    let caps = ROULETTE_LIMITED.captures(&clean)?;
    Some(RouletteLimited {
        owner: msg.interaction_user.clone(),
        actor: caps[1].trim().to_string(),
        uses_per_hour: caps[2].parse().ok()?,
        minutes_left: caps[3].parse().ok()?,
        observed_at: msg.created_at,
        message: MessageRef {
            id: msg.id,
            channel_id: msg.channel_id,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Identity;
    use chrono::Utc;

    fn text(content: &str) -> ChatMessage {
        ChatMessage::text(1, 10, Identity::new(2, "Bob"), content, Utc::now())
    }

    #[test]
    fn recognises_every_trigger_phrase() {
        for phrase in ROLL_COMMANDS {
            let cmd = parse_roll_command(&text(phrase)).unwrap();
            assert_eq!(cmd.command, phrase);
            assert_eq!(cmd.owner.id, 2);
        }
    }

    #[test]
    fn ignores_near_misses() {
        assert!(parse_roll_command(&text("$wa please")).is_none());
        assert!(parse_roll_command(&text("$tu")).is_none());
        assert!(parse_roll_command(&text("$W")).is_none());
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        assert!(parse_roll_command(&text("  $wg \n")).is_some());
    }

    #[test]
    fn parses_roulette_limit() {
        let msg = text("**Bob**, the roulette is limited to 10 uses per hour. **23** min left.");
        let limited = parse_roulette_limited(&msg).unwrap();
        assert_eq!(limited.actor, "Bob");
        assert_eq!(limited.uses_per_hour, 10);
        assert_eq!(limited.minutes_left, 23);
        assert!(limited.owner.is_none());
    }

    #[test]
    fn roulette_limit_takes_interaction_user() {
        let msg = text("Bob, the roulette is limited to 10 uses per hour. 5 min left.")
            .with_interaction_user(Identity::new(2, "Bob"));
        let limited = parse_roulette_limited(&msg).unwrap();
        assert_eq!(limited.owner, Some(Identity::from_id(2)));
    }

    #[test]
    fn roulette_limit_requires_full_sentence() {
        assert!(parse_roulette_limited(&text("the roulette is limited to 10 uses per hour")).is_none());
    }
}

//! Roll results: claimable characters and kakera drops.

use std::sync::LazyLock;

use regex::Regex;

use crate::channels::{ChatMessage, Identity};
use crate::error::ClassifyError;
use crate::mudae::markup;
use crate::mudae::types::{ClaimableRoll, KakeraButton, KakeraRoll, KakeraType, MessageRef};

/// Literal the game puts in the description of an unclaimed roll.
pub const CLAIM_INVITATION: &str = "React with any emoji to claim!";

/// Marker in the message text of a wished roll.
pub const WISH_MARKER: &str = "Wished by";

static SERIES_KAKERA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\s\S]+)\n([\d,]+)\s*<:kakera:\d+>").expect("series/kakera pattern")
});

static WISHED_BY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Wished by ((?:<@!?\d+>[,\s]*)+)").expect("wish pattern"));

static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@!?(\d+)>").expect("mention pattern"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Parse a claimable roll.
///
/// `Ok(None)` means the message is not a claimable roll at all. `Err` means it
/// looked like one but a required field is missing.
pub fn parse_claimable(
    msg: &ChatMessage,
    me: &Identity,
) -> Result<Option<ClaimableRoll>, ClassifyError> {
    let Some(embed) = msg.embeds.first() else {
        return Ok(None);
    };
    let Some(description) = embed.description.as_deref().filter(|d| !d.is_empty()) else {
        return Ok(None);
    };

    let reactable = description.contains(CLAIM_INVITATION);
    let wished = msg.content.contains(WISH_MARKER);
    if !(reactable || wished) {
        return Ok(None);
    }

    let character = embed
        .author_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(ClassifyError::MissingCharacter { message_id: msg.id })?;

    let clean = markup::strip(description);
    let caps = SERIES_KAKERA
        .captures(&clean)
        .ok_or(ClassifyError::MissingSeriesOrKakera { message_id: msg.id })?;

    let series = WHITESPACE.replace_all(caps[1].trim(), " ").into_owned();
    if series.is_empty() {
        return Err(ClassifyError::MissingSeriesOrKakera { message_id: msg.id });
    }

    let raw_value = caps[2].replace(',', "");
    let kakera_value: u32 = raw_value.parse().map_err(|_| ClassifyError::InvalidKakera {
        message_id: msg.id,
        raw: caps[2].to_string(),
    })?;

    let claim_buttons = msg
        .components
        .iter()
        .filter(|c| c.emoji.is_some())
        .map(|c| c.id.clone())
        .collect();

    Ok(Some(ClaimableRoll {
        owner: msg.interaction_user.clone(),
        character: character.to_string(),
        series,
        kakera_value,
        wished_by: parse_wisher(&msg.content, me),
        observed_at: msg.created_at,
        message: MessageRef {
            id: msg.id,
            channel_id: msg.channel_id,
        },
        claim_buttons,
    }))
}

/// The user a roll is reserved for. Prefers `me` when several users wished it.
fn parse_wisher(content: &str, me: &Identity) -> Option<Identity> {
    let list = WISHED_BY.captures(content)?;
    let ids: Vec<u64> = MENTION
        .captures_iter(&list[1])
        .filter_map(|c| c[1].parse().ok())
        .collect();

    if ids.contains(&me.id) {
        return Some(me.clone());
    }
    ids.first().copied().map(Identity::from_id)
}

/// Parse a kakera roll: any message carrying buttons with known crystal icons.
pub fn parse_kakera(msg: &ChatMessage) -> Option<KakeraRoll> {
    let mut buttons: Vec<KakeraButton> = Vec::new();
    for component in &msg.components {
        let Some(kind) = component.emoji.as_deref().and_then(KakeraType::from_icon) else {
            continue;
        };
        if buttons.iter().any(|b| b.kind == kind) {
            continue;
        }
        buttons.push(KakeraButton {
            component_id: component.id.clone(),
            kind,
        });
    }

    if buttons.is_empty() {
        return None;
    }

    let kakera_value = buttons.iter().map(|b| b.kind.weight()).sum();
    Some(KakeraRoll {
        owner: msg.interaction_user.clone(),
        buttons,
        kakera_value,
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
    use crate::channels::Embed;
    use chrono::Utc;

    fn me() -> Identity {
        Identity::new(100, "Me")
    }

    fn roll_message(author_name: Option<&str>, description: Option<&str>, content: &str) -> ChatMessage {
        ChatMessage::text(1, 10, Identity::new(9, "Mudae"), content, Utc::now()).with_embed(Embed {
            author_name: author_name.map(String::from),
            description: description.map(String::from),
        })
    }

    const DESCRIPTION: &str =
        "Re:Zero kara Hajimeru\nIsekai Seikatsu\n**1,234**<:kakera:469835869059153940>\nReact with any emoji to claim!";

    #[test]
    fn parses_claimable_roll() {
        let msg = roll_message(Some("Rem"), Some(DESCRIPTION), "");
        let roll = parse_claimable(&msg, &me()).unwrap().unwrap();
        assert_eq!(roll.character, "Rem");
        assert_eq!(roll.series, "Re:Zero kara Hajimeru Isekai Seikatsu");
        assert_eq!(roll.kakera_value, 1234);
        assert!(roll.wished_by.is_none());
        assert!(roll.owner.is_none());
    }

    #[test]
    fn no_embed_is_not_a_roll() {
        let msg = ChatMessage::text(1, 10, Identity::new(9, "Mudae"), "hi", Utc::now());
        assert!(parse_claimable(&msg, &me()).unwrap().is_none());
    }

    #[test]
    fn missing_description_is_not_a_roll() {
        let msg = roll_message(Some("Rem"), None, "");
        assert!(parse_claimable(&msg, &me()).unwrap().is_none());
    }

    #[test]
    fn description_without_invitation_is_not_a_roll() {
        let msg = roll_message(Some("Rem"), Some("Re:Zero\n**1,234**<:kakera:1>"), "");
        assert!(parse_claimable(&msg, &me()).unwrap().is_none());
    }

    #[test]
    fn missing_character_is_malformed() {
        let msg = roll_message(None, Some(DESCRIPTION), "");
        assert!(matches!(
            parse_claimable(&msg, &me()),
            Err(ClassifyError::MissingCharacter { .. })
        ));
        let msg = roll_message(Some("  "), Some(DESCRIPTION), "");
        assert!(parse_claimable(&msg, &me()).is_err());
    }

    #[test]
    fn missing_kakera_is_malformed() {
        let msg = roll_message(Some("Rem"), Some("Re:Zero\nReact with any emoji to claim!"), "");
        assert!(matches!(
            parse_claimable(&msg, &me()),
            Err(ClassifyError::MissingSeriesOrKakera { .. })
        ));
    }

    #[test]
    fn wished_roll_prefers_me() {
        let msg = roll_message(
            Some("Rem"),
            Some("Re:Zero\n**500**<:kakera:1>"),
            "Wished by <@55>, <@!100>",
        )
        .with_component("claim-btn", Some("💖"))
        .with_component("no-emoji", None);
        let roll = parse_claimable(&msg, &me()).unwrap().unwrap();
        assert_eq!(roll.wished_by, Some(me()));
        assert_eq!(roll.claim_buttons, vec!["claim-btn".to_string()]);
    }

    #[test]
    fn wished_by_someone_else() {
        let msg = roll_message(Some("Rem"), Some("Re:Zero\n**500**<:kakera:1>"), "Wished by <@55>");
        let roll = parse_claimable(&msg, &me()).unwrap().unwrap();
        assert_eq!(roll.wished_by, Some(Identity::from_id(55)));
    }

    #[test]
    fn parses_kakera_roll_and_sums_weights() {
        let msg = ChatMessage::text(2, 10, Identity::new(9, "Mudae"), "", Utc::now())
            .with_component("a", Some("kakeraY"))
            .with_component("b", Some("kakeraP"))
            .with_component("c", Some("heart"))
            .with_component("d", Some("kakeraY"));
        let roll = parse_kakera(&msg).unwrap();
        assert_eq!(roll.buttons.len(), 2);
        assert_eq!(roll.buttons[0].kind, KakeraType::Yellow);
        assert_eq!(roll.buttons[1].kind, KakeraType::Purple);
        assert_eq!(roll.kakera_value, 501);
    }

    #[test]
    fn no_known_crystal_is_not_a_kakera_roll() {
        let msg = ChatMessage::text(2, 10, Identity::new(9, "Mudae"), "", Utc::now())
            .with_component("c", Some("heart"))
            .with_component("d", None);
        assert!(parse_kakera(&msg).is_none());
    }
}

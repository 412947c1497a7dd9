//! Typed game events produced by the classifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channels::Identity;

/// Exact trigger phrases of the roll commands the game understands.
pub const ROLL_COMMANDS: [&str; 4] = ["$w", "$wa", "$wg", "$wx"];

/// Status report command.
pub const STATUS_COMMAND: &str = "$tu";

/// Where a roll lives, so an action can target it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: u64,
    pub channel_id: u64,
}

/// A roll command typed by any participant.
#[derive(Debug, Clone, PartialEq)]
pub struct RollCommand {
    pub owner: Identity,
    pub issued_at: DateTime<Utc>,
    pub command: String,
    pub message_id: u64,
}

/// "<actor>, the roulette is limited to N uses per hour. M min left."
///
/// A failed roll: it produces no roll but still consumes the command that caused it.
#[derive(Debug, Clone, PartialEq)]
pub struct RouletteLimited {
    pub owner: Option<Identity>,
    pub actor: String,
    pub uses_per_hour: u32,
    pub minutes_left: u32,
    pub observed_at: DateTime<Utc>,
    pub message: MessageRef,
}

/// A character roll that can be claimed.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimableRoll {
    /// Who caused the roll. `None` until attributed.
    pub owner: Option<Identity>,
    pub character: String,
    pub series: String,
    pub kakera_value: u32,
    /// Set when the roll is reserved for a user; claiming then goes through a button.
    pub wished_by: Option<Identity>,
    pub observed_at: DateTime<Utc>,
    pub message: MessageRef,
    /// Buttons clicked to claim a wished roll.
    pub claim_buttons: Vec<String>,
}

impl ClaimableRoll {
    pub fn is_owned_by(&self, user: &Identity) -> bool {
        self.owner.as_ref() == Some(user)
    }

    pub fn is_wished(&self) -> bool {
        self.wished_by.is_some()
    }
}

impl std::fmt::Display for ClaimableRoll {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ClaimableRoll(owner={}, character={:?}, series={:?}, kakera_value={}, wished_by={})",
            display_owner(&self.owner),
            self.character,
            self.series,
            self.kakera_value,
            display_owner(&self.wished_by),
        )
    }
}

/// Kakera crystal colours, keyed by the icon identifier the game uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum KakeraType {
    Purple,
    Blue,
    Teal,
    Green,
    Yellow,
    Orange,
    Red,
    Rainbow,
    Light,
}

impl KakeraType {
    pub const ALL: [KakeraType; 9] = [
        Self::Purple,
        Self::Blue,
        Self::Teal,
        Self::Green,
        Self::Yellow,
        Self::Orange,
        Self::Red,
        Self::Rainbow,
        Self::Light,
    ];

    /// Icon identifier on the button.
    pub fn icon(self) -> &'static str {
        match self {
            Self::Purple => "kakeraP",
            Self::Blue => "kakera",
            Self::Teal => "kakeraT",
            Self::Green => "kakeraG",
            Self::Yellow => "kakeraY",
            Self::Orange => "kakeraO",
            Self::Red => "kakeraR",
            Self::Rainbow => "kakeraW",
            Self::Light => "kakeraL",
        }
    }

    /// Fixed value of the crystal in the game's economy.
    pub fn weight(self) -> u32 {
        match self {
            Self::Purple => 100,
            Self::Blue => 101,
            Self::Teal => 171,
            Self::Green => 251,
            Self::Yellow => 401,
            Self::Orange => 701,
            Self::Red => 1401,
            Self::Rainbow => 3001,
            Self::Light => 500,
        }
    }

    pub fn from_icon(icon: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.icon() == icon)
    }
}

impl std::fmt::Display for KakeraType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.icon())
    }
}

impl TryFrom<String> for KakeraType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_icon(&value).ok_or_else(|| format!("unknown kakera type: '{value}'"))
    }
}

impl From<KakeraType> for String {
    fn from(value: KakeraType) -> Self {
        value.icon().to_string()
    }
}

/// A kakera button on a roll.
#[derive(Debug, Clone, PartialEq)]
pub struct KakeraButton {
    pub component_id: String,
    pub kind: KakeraType,
}

/// A roll that offers kakera to collect.
#[derive(Debug, Clone, PartialEq)]
pub struct KakeraRoll {
    pub owner: Option<Identity>,
    /// Ordered, first-seen wins; never empty.
    pub buttons: Vec<KakeraButton>,
    pub kakera_value: u32,
    pub observed_at: DateTime<Utc>,
    pub message: MessageRef,
}

impl KakeraRoll {
    pub fn is_owned_by(&self, user: &Identity) -> bool {
        self.owner.as_ref() == Some(user)
    }

    pub fn kinds(&self) -> impl Iterator<Item = KakeraType> + '_ {
        self.buttons.iter().map(|b| b.kind)
    }

    pub fn has(&self, kind: KakeraType) -> bool {
        self.kinds().any(|k| k == kind)
    }
}

impl std::fmt::Display for KakeraRoll {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<&str> = self.kinds().map(KakeraType::icon).collect();
        write!(
            f,
            "KakeraRoll(owner={}, buttons={:?}, kakera_value={})",
            display_owner(&self.owner),
            kinds,
            self.kakera_value,
        )
    }
}

/// Session permissions parsed from the status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimerStatus {
    pub can_claim: bool,
    pub rolls_available: u32,
    pub can_kakera_react: bool,
    /// 0..=100
    pub kakera_power: u8,
    pub minutes_to_next_reset: u32,
}

impl TimerStatus {
    /// The next hourly boundary is also a claim reset.
    pub fn next_hour_is_reset(&self) -> bool {
        self.minutes_to_next_reset <= 60
    }
}

impl std::fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[Claim: {}] [Kakera React: {}] [Power: {}%] [Rolls: {}] [Reset in: {}min] [NextHourClaimReset: {}]",
            self.can_claim,
            self.can_kakera_react,
            self.kakera_power,
            self.rolls_available,
            self.minutes_to_next_reset,
            self.next_hour_is_reset(),
        )
    }
}

/// Everything the classifier can recognise.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    RollCommand(RollCommand),
    RouletteLimited(RouletteLimited),
    ClaimableRoll(ClaimableRoll),
    KakeraRoll(KakeraRoll),
    TimerStatus(TimerStatus),
}

impl Event {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::RollCommand(_) => "roll_command",
            Self::RouletteLimited(_) => "roulette_limited",
            Self::ClaimableRoll(_) => "claimable_roll",
            Self::KakeraRoll(_) => "kakera_roll",
            Self::TimerStatus(_) => "timer_status",
        }
    }

    /// Result events that still have to be attributed to a roll command.
    pub fn needs_owner(&self) -> bool {
        match self {
            Self::RouletteLimited(e) => e.owner.is_none(),
            Self::ClaimableRoll(e) => e.owner.is_none(),
            Self::KakeraRoll(e) => e.owner.is_none(),
            Self::RollCommand(_) | Self::TimerStatus(_) => false,
        }
    }

    /// Fill in the owner of a result event. No-op for other events.
    pub fn attribute(self, owner: Identity) -> Self {
        match self {
            Self::RouletteLimited(e) => Self::RouletteLimited(RouletteLimited {
                owner: Some(owner),
                ..e
            }),
            Self::ClaimableRoll(e) => Self::ClaimableRoll(ClaimableRoll {
                owner: Some(owner),
                ..e
            }),
            Self::KakeraRoll(e) => Self::KakeraRoll(KakeraRoll {
                owner: Some(owner),
                ..e
            }),
            other => other,
        }
    }
}

fn display_owner(owner: &Option<Identity>) -> String {
    owner
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "None".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kakera_weights_match_economy_table() {
        let table: Vec<(&str, u32)> = KakeraType::ALL
            .iter()
            .map(|t| (t.icon(), t.weight()))
            .collect();
        assert_eq!(
            table,
            vec![
                ("kakeraP", 100),
                ("kakera", 101),
                ("kakeraT", 171),
                ("kakeraG", 251),
                ("kakeraY", 401),
                ("kakeraO", 701),
                ("kakeraR", 1401),
                ("kakeraW", 3001),
                ("kakeraL", 500),
            ]
        );
    }

    #[test]
    fn kakera_type_from_unknown_icon() {
        assert!(KakeraType::from_icon("kakeraX").is_none());
        assert!(KakeraType::try_from("heart".to_string()).is_err());
    }

    #[test]
    fn kakera_type_deserializes_from_icon_name() {
        let kinds: Vec<KakeraType> = serde_json::from_str(r#"["kakeraP", "kakera"]"#).unwrap();
        assert_eq!(kinds, vec![KakeraType::Purple, KakeraType::Blue]);
    }

    #[test]
    fn next_hour_is_reset_boundary() {
        let mut status = TimerStatus {
            minutes_to_next_reset: 60,
            ..Default::default()
        };
        assert!(status.next_hour_is_reset());
        status.minutes_to_next_reset = 61;
        assert!(!status.next_hour_is_reset());
    }

    #[test]
    fn default_status_denies_everything() {
        let status = TimerStatus::default();
        assert!(!status.can_claim);
        assert!(!status.can_kakera_react);
        assert_eq!(status.rolls_available, 0);
    }

    #[test]
    fn attribute_fills_result_owner_only() {
        let roll = Event::KakeraRoll(KakeraRoll {
            owner: None,
            buttons: vec![KakeraButton {
                component_id: "b".into(),
                kind: KakeraType::Yellow,
            }],
            kakera_value: 401,
            observed_at: Utc::now(),
            message: MessageRef { id: 1, channel_id: 2 },
        });
        assert!(roll.needs_owner());
        let roll = roll.attribute(Identity::new(5, "Me"));
        assert!(!roll.needs_owner());

        let status = Event::TimerStatus(TimerStatus::default());
        assert_eq!(status.clone().attribute(Identity::from_id(1)), status);
    }
}

//! Claim criteria evaluation.

use crate::channels::Identity;
use crate::config::Criteria;
use crate::mudae::ClaimableRoll;

impl Criteria {
    /// A roll qualifies if any single rule matches.
    pub fn is_met_by(&self, roll: &ClaimableRoll, me: &Identity) -> bool {
        let character = self.character.iter().any(|c| *c == roll.character);
        let series = self.series.iter().any(|s| *s == roll.series);
        let kakera = self.min_kakera.is_some_and(|min| roll.kakera_value >= min);
        let wish = self.wish && roll.wished_by.as_ref() == Some(me);
        character || series || kakera || wish
    }

    /// The exception matches. No exception configured means nothing is excepted.
    pub fn is_excepted(&self, roll: &ClaimableRoll, me: &Identity) -> bool {
        self.exception
            .as_deref()
            .is_some_and(|exception| exception.is_met_by(roll, me))
    }

    /// Qualifies and is not excepted.
    pub fn accepts(&self, roll: &ClaimableRoll, me: &Identity) -> bool {
        self.is_met_by(roll, me) && !self.is_excepted(roll, me)
    }
}

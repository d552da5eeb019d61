// Risk Parameters
// ATR-proportional target and stop distances around the entry price

use crate::core::Direction;

/// Target sits 1.5 ATR from entry, stop 0.75 ATR, so reward is exactly
/// twice the risk for every signal.
pub const TARGET_ATR_MULTIPLIER: f64 = 1.5;
pub const STOP_ATR_MULTIPLIER: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskLevels {
    pub target_price: f64,
    pub stop_loss_price: f64,
}

/// Compute target and stop for a directional signal. Neutral signals carry
/// no levels.
pub fn risk_levels(direction: Direction, entry_price: f64, atr: f64) -> Option<RiskLevels> {
    match direction {
        Direction::Long => Some(RiskLevels {
            target_price: entry_price + atr * TARGET_ATR_MULTIPLIER,
            stop_loss_price: entry_price - atr * STOP_ATR_MULTIPLIER,
        }),
        Direction::Short => Some(RiskLevels {
            target_price: entry_price - atr * TARGET_ATR_MULTIPLIER,
            stop_loss_price: entry_price + atr * STOP_ATR_MULTIPLIER,
        }),
        Direction::Neutral => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_levels_bracket_entry() {
        let levels = risk_levels(Direction::Long, 100.0, 4.0).unwrap();
        assert_eq!(levels.target_price, 106.0);
        assert_eq!(levels.stop_loss_price, 97.0);
        assert!(levels.stop_loss_price < 100.0 && 100.0 < levels.target_price);
    }

    #[test]
    fn test_short_levels_bracket_entry() {
        let levels = risk_levels(Direction::Short, 100.0, 4.0).unwrap();
        assert_eq!(levels.target_price, 94.0);
        assert_eq!(levels.stop_loss_price, 103.0);
        assert!(levels.target_price < 100.0 && 100.0 < levels.stop_loss_price);
    }

    #[test]
    fn test_reward_is_twice_risk() {
        for direction in [Direction::Long, Direction::Short] {
            for atr in [0.5, 2.0, 37.25] {
                let entry = 250.0;
                let levels = risk_levels(direction, entry, atr).unwrap();
                let reward = (levels.target_price - entry).abs();
                let risk = (entry - levels.stop_loss_price).abs();
                assert!(
                    (reward - 2.0 * risk).abs() < 1e-9,
                    "reward {} should be twice risk {}",
                    reward,
                    risk
                );
            }
        }
    }

    #[test]
    fn test_neutral_has_no_levels() {
        assert!(risk_levels(Direction::Neutral, 100.0, 4.0).is_none());
    }
}

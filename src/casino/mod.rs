use rand::Rng;
use serde::{Deserialize, Serialize};

/// Winning spins pay out this multiple of the bet.
pub const PAYOUT_MULTIPLIER: f64 = 2.0;

/// Pool value the jackpot restarts from after it is taken.
pub const JACKPOT_RESEED: f64 = 1_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Game {
    Slot,
    Lottery,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SpinOutcome {
    pub won: bool,
    /// Credited back to the player on a win (includes the stake).
    pub payout: f64,
    /// Added to the jackpot pool on a loss.
    pub jackpot_feed: f64,
    /// A winning spin may additionally take the whole jackpot pool.
    pub jackpot_won: bool,
}

/// One independent trial: a uniform draw against the configured win
/// probability, plus a second draw on wins for the jackpot. Stateless; the
/// caller provides the RNG so the server can use `OsRng` (the game pays real
/// balances) and tests can seed a `StdRng`.
pub fn spin<R: Rng>(
    win_rate: f64,
    jackpot_rate: f64,
    bet: f64,
    feed_rate: f64,
    rng: &mut R,
) -> SpinOutcome {
    let p = win_rate.clamp(0.0, 1.0);
    let won = rng.gen_range(0.0..1.0) < p;
    if won {
        let jackpot_won = rng.gen_range(0.0..1.0) < jackpot_rate.clamp(0.0, 1.0);
        SpinOutcome {
            won: true,
            payout: bet * PAYOUT_MULTIPLIER,
            jackpot_feed: 0.0,
            jackpot_won,
        }
    } else {
        SpinOutcome {
            won: false,
            payout: 0.0,
            jackpot_feed: bet * feed_rate.max(0.0),
            jackpot_won: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn certain_win_pays_the_multiple() {
        let mut rng = StdRng::seed_from_u64(7);
        let outcome = spin(1.0, 0.0, 10.0, 0.05, &mut rng);
        assert!(outcome.won);
        assert_eq!(outcome.payout, 20.0);
        assert_eq!(outcome.jackpot_feed, 0.0);
        assert!(!outcome.jackpot_won);
    }

    #[test]
    fn certain_loss_feeds_the_jackpot() {
        let mut rng = StdRng::seed_from_u64(7);
        let outcome = spin(0.0, 0.0, 10.0, 0.05, &mut rng);
        assert!(!outcome.won);
        assert_eq!(outcome.payout, 0.0);
        assert!((outcome.jackpot_feed - 0.5).abs() < 1e-12);
    }

    #[test]
    fn jackpot_hits_only_on_winning_spins() {
        let mut rng = StdRng::seed_from_u64(7);
        let outcome = spin(1.0, 1.0, 10.0, 0.05, &mut rng);
        assert!(outcome.won && outcome.jackpot_won);

        let outcome = spin(0.0, 1.0, 10.0, 0.05, &mut rng);
        assert!(!outcome.won);
        assert!(!outcome.jackpot_won);
    }

    #[test]
    fn win_rate_is_clamped() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(spin(7.5, 0.0, 1.0, 0.0, &mut rng).won);
        assert!(!spin(-3.0, 0.0, 1.0, 0.0, &mut rng).won);
    }

    #[test]
    fn observed_frequency_tracks_the_configured_rate() {
        let mut rng = StdRng::seed_from_u64(42);
        let trials = 20_000;
        let wins = (0..trials)
            .filter(|_| spin(0.35, 0.0, 1.0, 0.0, &mut rng).won)
            .count();
        let observed = wins as f64 / trials as f64;
        assert!((observed - 0.35).abs() < 0.02, "observed {observed}");
    }
}

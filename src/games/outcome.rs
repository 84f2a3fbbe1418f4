//! Outcome generation.
//!
//! Every draw comes from a [`RoundRng`] keyed by the round seed, so an
//! outcome is reproducible from the seed recorded in its history entry.

use crate::games::cards::{baccarat_is_natural, baccarat_total, banker_draws, player_draws};
use crate::games::rng::RoundRng;
use crate::games::types::{Card, GameType, Multiplier, Outcome, WinGoColor};
use rand::seq::{index, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cells on a Mines board
pub const MINES_BOARD_SIZE: u8 = 25;

/// Per-table knobs the generator needs besides the seed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameParams {
    pub mine_count: u8,
}

impl Default for GameParams {
    fn default() -> Self {
        Self { mine_count: 3 }
    }
}

/// Produces a round's outcome from its seed
pub trait OutcomeGenerator: Send + Sync {
    fn generate(&self, game_type: GameType, params: &GameParams, seed: &[u8; 32]) -> Result<Outcome, String>;
}

/// Generator implementing the production odds for every game type
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardOutcomes;

impl OutcomeGenerator for StandardOutcomes {
    fn generate(&self, game_type: GameType, params: &GameParams, seed: &[u8; 32]) -> Result<Outcome, String> {
        let mut rng = RoundRng::new(seed);
        let outcome = match game_type {
            GameType::Aviator => Outcome::Crash {
                crash_point: draw_crash_point(&mut rng),
            },
            GameType::WinGo => {
                let number = rng.gen_range(0..=9u8);
                Outcome::WinGo {
                    number,
                    colors: wingo_colors(number),
                }
            }
            GameType::Mines => draw_mines(&mut rng, params.mine_count)?,
            GameType::DragonTiger => Outcome::DragonTiger {
                dragon: draw_card(&mut rng),
                tiger: draw_card(&mut rng),
            },
            GameType::Baccarat => draw_baccarat(&mut rng),
            GameType::TeenPatti => {
                let deck = shuffled_deck(&mut rng);
                Outcome::TeenPatti {
                    player_a: [deck[0], deck[2], deck[4]],
                    player_b: [deck[1], deck[3], deck[5]],
                }
            }
            GameType::AndarBahar => draw_andar_bahar(&mut rng)?,
            GameType::SicBo => Outcome::SicBo {
                dice: roll_dice(&mut rng),
            },
            GameType::K3 => Outcome::K3 {
                dice: roll_dice(&mut rng),
            },
            GameType::FiveD => {
                let mut digits = [0u8; 5];
                for digit in digits.iter_mut() {
                    *digit = rng.gen_range(0..=9);
                }
                Outcome::FiveD { digits }
            }
            GameType::Roulette => Outcome::Roulette {
                number: rng.gen_range(0..=36),
            },
        };
        Ok(outcome)
    }
}

/// Crash point buckets in hundredths: (upper bound of the percentile roll, low, high)
const CRASH_BUCKETS: [(u32, u64, u64); 4] = [
    (50, 101, 300),
    (80, 301, 1_000),
    (95, 1_001, 5_000),
    (100, 5_001, 50_000),
];

/// Piecewise crash distribution: 50% in 1.01-3.00, 30% in 3.00-10.00,
/// 15% in 10.00-50.00, 5% in 50.00-500.00, uniform within each band
pub fn draw_crash_point(rng: &mut RoundRng) -> Multiplier {
    let roll = rng.gen_range(0..100u32);
    let (_, low, high) = CRASH_BUCKETS
        .iter()
        .copied()
        .find(|(upper, _, _)| roll < *upper)
        .unwrap_or(CRASH_BUCKETS[CRASH_BUCKETS.len() - 1]);
    Multiplier::from_hundredths(rng.gen_range(low..=high))
}

/// Fixed WinGo colour table
pub fn wingo_colors(number: u8) -> Vec<WinGoColor> {
    match number {
        0 => vec![WinGoColor::Red, WinGoColor::Violet],
        5 => vec![WinGoColor::Green, WinGoColor::Violet],
        1 | 3 | 7 | 9 => vec![WinGoColor::Green],
        _ => vec![WinGoColor::Red],
    }
}

fn draw_card(rng: &mut RoundRng) -> Card {
    Card::from_index(rng.gen_range(0..Card::DECK_SIZE))
}

fn shuffled_deck(rng: &mut RoundRng) -> Vec<Card> {
    let mut deck: Vec<Card> = (0..Card::DECK_SIZE).map(Card::from_index).collect();
    deck.shuffle(rng);
    deck
}

fn roll_dice(rng: &mut RoundRng) -> [u8; 3] {
    [rng.gen_range(1..=6), rng.gen_range(1..=6), rng.gen_range(1..=6)]
}

fn draw_mines(rng: &mut RoundRng, mine_count: u8) -> Result<Outcome, String> {
    if mine_count == 0 || mine_count >= MINES_BOARD_SIZE {
        return Err(format!("mine count {} outside 1..{}", mine_count, MINES_BOARD_SIZE));
    }
    let mut mine_positions: Vec<u8> = index::sample(rng, MINES_BOARD_SIZE as usize, mine_count as usize)
        .into_iter()
        .map(|i| i as u8)
        .collect();
    mine_positions.sort_unstable();
    Ok(Outcome::Mines {
        mine_count,
        mine_positions,
    })
}

/// Independent draws for each card, then the standard third-card tableau
fn draw_baccarat(rng: &mut RoundRng) -> Outcome {
    let mut player = vec![draw_card(rng), draw_card(rng)];
    let mut banker = vec![draw_card(rng), draw_card(rng)];

    if !baccarat_is_natural(&player, &banker) {
        let mut player_third = None;
        if player_draws(baccarat_total(&player)) {
            let card = draw_card(rng);
            player.push(card);
            player_third = Some(card);
        }
        if banker_draws(baccarat_total(&banker), player_third.as_ref()) {
            banker.push(draw_card(rng));
        }
    }

    Outcome::Baccarat { player, banker }
}

/// Joker from the top of one shuffled deck, then alternate Andar/Bahar
/// until the joker's rank shows
fn draw_andar_bahar(rng: &mut RoundRng) -> Result<Outcome, String> {
    let deck = shuffled_deck(rng);
    let joker = deck[0];
    let mut andar = Vec::new();
    let mut bahar = Vec::new();

    for (i, card) in deck.iter().skip(1).enumerate() {
        if i % 2 == 0 {
            andar.push(*card);
        } else {
            bahar.push(*card);
        }
        if card.rank == joker.rank {
            return Ok(Outcome::AndarBahar { joker, andar, bahar });
        }
    }

    Err("deck exhausted without matching the joker".to_string())
}

fn binomial(n: u64, k: u64) -> u128 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        acc = acc * (n - i) as u128 / (i + 1) as u128;
    }
    acc
}

/// Running Mines multiplier after `safe_reveals` safe tiles:
/// `Π (25 - i) / (25 - mines - i)`, i.e. `C(25, g) / C(25 - mines, g)`,
/// floored to four decimals. `None` if more tiles are revealed than are safe.
pub fn mines_multiplier(mine_count: u8, safe_reveals: u8) -> Option<Multiplier> {
    if mine_count == 0 || mine_count >= MINES_BOARD_SIZE {
        return None;
    }
    let safe_cells = (MINES_BOARD_SIZE - mine_count) as u64;
    if safe_reveals as u64 > safe_cells {
        return None;
    }
    let total = binomial(MINES_BOARD_SIZE as u64, safe_reveals as u64);
    let safe = binomial(safe_cells, safe_reveals as u64);
    let scaled = total * Multiplier::SCALE as u128 / safe;
    Some(Multiplier(u64::try_from(scaled).ok()?))
}

/// Live multiplier curve for the crash flight
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrashCurve {
    /// `m(t) = 1 + per_second * t`
    Linear { per_second: f64 },
    /// `m(t) = e^(rate * t)`
    Exponential { rate: f64 },
}

impl Default for CrashCurve {
    fn default() -> Self {
        CrashCurve::Exponential { rate: 0.08 }
    }
}

impl CrashCurve {
    pub fn multiplier_at(&self, elapsed: Duration) -> Multiplier {
        let t = elapsed.as_secs_f64();
        let value = match self {
            CrashCurve::Linear { per_second } => 1.0 + per_second * t,
            CrashCurve::Exponential { rate } => (rate * t).exp(),
        };
        Multiplier::from_f64(value).to_hundredths().max(Multiplier::ONE)
    }

    /// Flight time until the curve reaches `target`
    pub fn time_to_reach(&self, target: Multiplier) -> Duration {
        let m = target.as_f64().max(1.0);
        let secs = match self {
            CrashCurve::Linear { per_second } if *per_second > 0.0 => (m - 1.0) / per_second,
            CrashCurve::Exponential { rate } if *rate > 0.0 => m.ln() / rate,
            _ => 0.0,
        };
        Duration::from_secs_f64(secs.max(0.0))
    }

    pub fn is_valid(&self) -> bool {
        match self {
            CrashCurve::Linear { per_second } => per_second.is_finite() && *per_second > 0.0,
            CrashCurve::Exponential { rate } => rate.is_finite() && *rate > 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::cards::andar_bahar_winner;
    use std::collections::HashSet;

    fn seed(n: u32) -> [u8; 32] {
        let mut s = [0u8; 32];
        s[..4].copy_from_slice(&n.to_be_bytes());
        s
    }

    #[test]
    fn test_generation_is_deterministic() {
        let generator = StandardOutcomes;
        let params = GameParams::default();
        for game in GameType::ALL {
            let a = generator.generate(game, &params, &seed(11)).unwrap();
            let b = generator.generate(game, &params, &seed(11)).unwrap();
            assert_eq!(a, b, "{} outcome must replay from its seed", game);
            assert_eq!(a.game_type(), game);
        }
    }

    #[test]
    fn test_wingo_color_table() {
        use WinGoColor::*;
        let expected = [
            vec![Red, Violet],
            vec![Green],
            vec![Red],
            vec![Green],
            vec![Red],
            vec![Green, Violet],
            vec![Red],
            vec![Green],
            vec![Red],
            vec![Green],
        ];
        for n in 0..=9u8 {
            assert_eq!(wingo_colors(n), expected[n as usize], "colour of {}", n);
        }
    }

    #[test]
    fn test_crash_points_follow_buckets() {
        let mut counts = [0usize; 4];
        for i in 0..4_000 {
            let mut rng = RoundRng::new(&seed(i));
            let point = draw_crash_point(&mut rng);
            assert!(point >= Multiplier::from_hundredths(101));
            assert!(point <= Multiplier::from_whole(500));
            let bucket = match point.0 {
                p if p <= 30_000 => 0,
                p if p <= 100_000 => 1,
                p if p <= 500_000 => 2,
                _ => 3,
            };
            counts[bucket] += 1;
        }
        // 50/30/15/5 with generous tolerance
        assert!((1_800..=2_200).contains(&counts[0]), "{:?}", counts);
        assert!((1_000..=1_400).contains(&counts[1]), "{:?}", counts);
        assert!((450..=750).contains(&counts[2]), "{:?}", counts);
        assert!((120..=300).contains(&counts[3]), "{:?}", counts);
    }

    #[test]
    fn test_mines_positions_distinct() {
        let generator = StandardOutcomes;
        for i in 0..200 {
            let outcome = generator
                .generate(GameType::Mines, &GameParams { mine_count: 5 }, &seed(i))
                .unwrap();
            let Outcome::Mines { mine_positions, mine_count } = outcome else {
                panic!("expected mines outcome");
            };
            assert_eq!(mine_count, 5);
            let unique: HashSet<u8> = mine_positions.iter().copied().collect();
            assert_eq!(unique.len(), 5);
            assert!(mine_positions.iter().all(|p| *p < MINES_BOARD_SIZE));
        }
    }

    #[test]
    fn test_mines_rejects_full_board() {
        let err = StandardOutcomes.generate(GameType::Mines, &GameParams { mine_count: 25 }, &seed(1));
        assert!(err.is_err());
    }

    #[test]
    fn test_mines_multiplier_formula() {
        // 25 / 22 = 1.13636...
        assert_eq!(mines_multiplier(3, 1), Some(Multiplier(11_363)));
        assert_eq!(mines_multiplier(3, 0), Some(Multiplier::ONE));
        // All 22 safe tiles: C(25,22) / C(22,22) = 2300
        assert_eq!(mines_multiplier(3, 22), Some(Multiplier::from_whole(2_300)));
        assert_eq!(mines_multiplier(3, 23), None);

        let mut previous = Multiplier::ZERO;
        for g in 0..=22 {
            let m = mines_multiplier(3, g).unwrap();
            assert!(m > previous);
            previous = m;
        }
    }

    #[test]
    fn test_teen_patti_uses_one_deck() {
        for i in 0..100 {
            let Outcome::TeenPatti { player_a, player_b } =
                StandardOutcomes.generate(GameType::TeenPatti, &GameParams::default(), &seed(i)).unwrap()
            else {
                panic!("expected teen patti outcome");
            };
            let cards: HashSet<Card> = player_a.iter().chain(player_b.iter()).copied().collect();
            assert_eq!(cards.len(), 6);
        }
    }

    #[test]
    fn test_andar_bahar_ends_on_match() {
        for i in 0..100 {
            let Outcome::AndarBahar { joker, andar, bahar } =
                StandardOutcomes.generate(GameType::AndarBahar, &GameParams::default(), &seed(i)).unwrap()
            else {
                panic!("expected andar bahar outcome");
            };
            assert!(andar_bahar_winner(&joker, &andar, &bahar).is_some());
            assert!(andar.len() == bahar.len() || andar.len() == bahar.len() + 1);
        }
    }

    #[test]
    fn test_baccarat_hand_sizes() {
        for i in 0..200 {
            let Outcome::Baccarat { player, banker } =
                StandardOutcomes.generate(GameType::Baccarat, &GameParams::default(), &seed(i)).unwrap()
            else {
                panic!("expected baccarat outcome");
            };
            assert!((2..=3).contains(&player.len()));
            assert!((2..=3).contains(&banker.len()));
        }
    }

    #[test]
    fn test_crash_curve_inverse() {
        let curve = CrashCurve::Exponential { rate: 0.1 };
        let target = Multiplier::from_whole(2);
        let t = curve.time_to_reach(target);
        assert_eq!(curve.multiplier_at(t + Duration::from_millis(1)).to_hundredths(), target);
        assert_eq!(curve.multiplier_at(Duration::ZERO), Multiplier::ONE);

        let linear = CrashCurve::Linear { per_second: 0.5 };
        assert_eq!(linear.time_to_reach(Multiplier::from_whole(2)), Duration::from_secs(2));
        assert!(!CrashCurve::Linear { per_second: 0.0 }.is_valid());
    }
}

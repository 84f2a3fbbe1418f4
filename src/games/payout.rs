//! Payout rules: `(bet kind) × Outcome → multiplier`.
//!
//! Rules are static. Changing odds is a deploy, never a round event.
//! Every multiplier is total-return, so `Multiplier::ZERO` is a loss and
//! `Multiplier::ONE` returns the stake unchanged.

use crate::games::cards::{
    andar_bahar_winner, baccarat_is_pair, baccarat_winner, dragon_tiger_winner, teen_patti_winner,
    BaccaratWinner,
};
use crate::games::outcome::{mines_multiplier, GameParams, MINES_BOARD_SIZE};
use crate::games::types::{
    AndarBaharSide, BaccaratBet, Bet, BetKind, DragonTigerSide, FiveDBet, GameType, K3Bet, Multiplier, Outcome,
    Parity, RouletteBet, SicBoBet, Size, TeenPattiSide, WinGoColor,
};
use std::collections::HashSet;

const RED_NUMBERS: [u8; 18] = [1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36];

const WINGO_NUMBER: Multiplier = Multiplier::from_whole(9);
const WINGO_COLOR: Multiplier = Multiplier::from_whole(2);
const WINGO_VIOLET: Multiplier = Multiplier::from_hundredths(450);
const EVEN_MONEY: Multiplier = Multiplier::from_whole(2);
const HOUSE_SIDE: Multiplier = Multiplier::from_hundredths(195);

/// Canonical payout table for every supported game
#[derive(Debug, Clone, Copy, Default)]
pub struct PayoutTable;

impl PayoutTable {
    pub fn new() -> Self {
        Self
    }

    /// Checks that a bet selector is well formed for `game_type`.
    /// Called by the ledger before any stake is reserved.
    pub fn validate(&self, game_type: GameType, kind: &BetKind, params: &GameParams) -> Result<(), String> {
        if kind.game_type() != game_type {
            return Err(format!("{} bet placed on a {} table", kind.game_type(), game_type));
        }

        match kind {
            BetKind::WinGoNumber(n) => check_range("number", *n, 0, 9),
            BetKind::MinesPicks(picks) => {
                let safe_cells = MINES_BOARD_SIZE.saturating_sub(params.mine_count) as usize;
                if picks.is_empty() || picks.len() > safe_cells {
                    return Err(format!("expected 1..={} picks, got {}", safe_cells, picks.len()));
                }
                if picks.iter().any(|p| *p >= MINES_BOARD_SIZE) {
                    return Err(format!("picks must be below {}", MINES_BOARD_SIZE));
                }
                let unique: HashSet<u8> = picks.iter().copied().collect();
                if unique.len() != picks.len() {
                    return Err("picks must be distinct".to_string());
                }
                Ok(())
            }
            BetKind::SicBo(bet) => match bet {
                SicBoBet::SpecificTriple(face) | SicBoBet::SpecificDouble(face) | SicBoBet::Single(face) => {
                    check_range("face", *face, 1, 6)
                }
                SicBoBet::Total(total) => check_range("total", *total, 3, 18),
                _ => Ok(()),
            },
            BetKind::K3(K3Bet::Sum(total)) => check_range("sum", *total, 3, 18),
            BetKind::FiveD(bet) => match bet {
                FiveDBet::Digit { position, digit } => {
                    check_range("position", *position, 0, 4)?;
                    check_range("digit", *digit, 0, 9)
                }
                FiveDBet::PositionSize { position, .. } => check_range("position", *position, 0, 4),
                FiveDBet::SumSize(_) => Ok(()),
            },
            BetKind::Roulette(bet) => match bet {
                RouletteBet::Straight(n) => check_range("number", *n, 0, 36),
                RouletteBet::Dozen(d) => check_range("dozen", *d, 1, 3),
                RouletteBet::Column(c) => check_range("column", *c, 1, 3),
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Payout multiplier for `bet` against `outcome`. Mismatched game
    /// types evaluate to a loss.
    pub fn evaluate(&self, bet: &Bet, outcome: &Outcome) -> Multiplier {
        match (&bet.kind, outcome) {
            (BetKind::Crash, Outcome::Crash { crash_point }) => match bet.cashed_out_at {
                Some(at) if at <= *crash_point => at,
                _ => Multiplier::ZERO,
            },

            (BetKind::WinGoNumber(pick), Outcome::WinGo { number, .. }) => win_if(pick == number, WINGO_NUMBER),
            (BetKind::WinGoColor(color), Outcome::WinGo { colors, .. }) => {
                let rate = match color {
                    WinGoColor::Violet => WINGO_VIOLET,
                    WinGoColor::Red | WinGoColor::Green => WINGO_COLOR,
                };
                win_if(colors.contains(color), rate)
            }
            (BetKind::WinGoSize(size), Outcome::WinGo { number, .. }) => {
                win_if(*size == size_of(*number, 5), EVEN_MONEY)
            }

            (
                BetKind::MinesPicks(picks),
                Outcome::Mines {
                    mine_count,
                    mine_positions,
                },
            ) => {
                if picks.iter().any(|p| mine_positions.contains(p)) {
                    return Multiplier::ZERO;
                }
                u8::try_from(picks.len())
                    .ok()
                    .and_then(|reveals| mines_multiplier(*mine_count, reveals))
                    .unwrap_or(Multiplier::ZERO)
            }

            (BetKind::DragonTiger(side), Outcome::DragonTiger { dragon, tiger }) => {
                let winner = dragon_tiger_winner(dragon, tiger);
                let rate = match side {
                    DragonTigerSide::Tie => Multiplier::from_whole(11),
                    DragonTigerSide::Dragon | DragonTigerSide::Tiger => HOUSE_SIDE,
                };
                win_if(*side == winner, rate)
            }

            (BetKind::Baccarat(pick), Outcome::Baccarat { player, banker }) => {
                let winner = baccarat_winner(player, banker);
                match pick {
                    BaccaratBet::Player => match winner {
                        BaccaratWinner::Player => Multiplier::from_whole(2),
                        BaccaratWinner::Tie => Multiplier::ONE,
                        BaccaratWinner::Banker => Multiplier::ZERO,
                    },
                    BaccaratBet::Banker => match winner {
                        BaccaratWinner::Banker => HOUSE_SIDE,
                        BaccaratWinner::Tie => Multiplier::ONE,
                        BaccaratWinner::Player => Multiplier::ZERO,
                    },
                    BaccaratBet::Tie => win_if(winner == BaccaratWinner::Tie, Multiplier::from_whole(9)),
                    BaccaratBet::PlayerPair => win_if(baccarat_is_pair(player), Multiplier::from_whole(12)),
                    BaccaratBet::BankerPair => win_if(baccarat_is_pair(banker), Multiplier::from_whole(12)),
                }
            }

            (BetKind::TeenPatti(side), Outcome::TeenPatti { player_a, player_b }) => {
                let winner = teen_patti_winner(player_a, player_b);
                let rate = match side {
                    TeenPattiSide::Tie => Multiplier::from_whole(11),
                    TeenPattiSide::PlayerA | TeenPattiSide::PlayerB => HOUSE_SIDE,
                };
                win_if(*side == winner, rate)
            }

            (BetKind::AndarBahar(side), Outcome::AndarBahar { joker, andar, bahar }) => {
                let rate = match side {
                    AndarBaharSide::Andar => Multiplier::from_hundredths(190),
                    AndarBaharSide::Bahar => Multiplier::from_whole(2),
                };
                win_if(andar_bahar_winner(joker, andar, bahar) == Some(*side), rate)
            }

            (BetKind::SicBo(pick), Outcome::SicBo { dice }) => sic_bo(*pick, dice),

            (BetKind::K3(pick), Outcome::K3 { dice }) => {
                let sum: u8 = dice.iter().sum();
                match pick {
                    K3Bet::Sum(total) => win_if(sum == *total, dice_total_rate(*total)),
                    K3Bet::Size(size) => win_if(*size == size_of(sum, 11), EVEN_MONEY),
                    K3Bet::Parity(parity) => win_if(*parity == parity_of(sum), EVEN_MONEY),
                }
            }

            (BetKind::FiveD(pick), Outcome::FiveD { digits }) => match pick {
                FiveDBet::Digit { position, digit } => win_if(
                    digits.get(*position as usize) == Some(digit),
                    Multiplier::from_whole(9),
                ),
                FiveDBet::PositionSize { position, size } => win_if(
                    digits.get(*position as usize).map(|d| size_of(*d, 5)) == Some(*size),
                    EVEN_MONEY,
                ),
                FiveDBet::SumSize(size) => {
                    let sum: u8 = digits.iter().sum();
                    win_if(*size == size_of(sum, 23), EVEN_MONEY)
                }
            },

            (BetKind::Roulette(pick), Outcome::Roulette { number }) => roulette(*pick, *number),

            _ => Multiplier::ZERO,
        }
    }
}

fn check_range(field: &str, value: u8, min: u8, max: u8) -> Result<(), String> {
    if value < min || value > max {
        return Err(format!("{} {} outside {}..={}", field, value, min, max));
    }
    Ok(())
}

fn win_if(won: bool, rate: Multiplier) -> Multiplier {
    if won {
        rate
    } else {
        Multiplier::ZERO
    }
}

fn size_of(value: u8, big_from: u8) -> Size {
    if value >= big_from {
        Size::Big
    } else {
        Size::Small
    }
}

fn parity_of(value: u8) -> Parity {
    if value % 2 == 0 {
        Parity::Even
    } else {
        Parity::Odd
    }
}

/// Three-dice total table, symmetric around 10.5
fn dice_total_rate(total: u8) -> Multiplier {
    let whole = match total {
        3 | 18 => 181,
        4 | 17 => 51,
        5 | 16 => 19,
        6 | 15 => 15,
        7 | 14 => 13,
        8 | 13 => 9,
        9..=12 => 7,
        _ => 0,
    };
    Multiplier::from_whole(whole)
}

fn sic_bo(pick: SicBoBet, dice: &[u8; 3]) -> Multiplier {
    let sum: u8 = dice.iter().sum();
    let triple = dice[0] == dice[1] && dice[1] == dice[2];
    let count = |face: u8| dice.iter().filter(|d| **d == face).count();

    match pick {
        SicBoBet::Small => win_if(!triple && (4..=10).contains(&sum), EVEN_MONEY),
        SicBoBet::Big => win_if(!triple && (11..=17).contains(&sum), EVEN_MONEY),
        SicBoBet::Odd => win_if(!triple && sum % 2 == 1, EVEN_MONEY),
        SicBoBet::Even => win_if(!triple && sum % 2 == 0, EVEN_MONEY),
        SicBoBet::AnyTriple => win_if(triple, Multiplier::from_whole(25)),
        SicBoBet::SpecificTriple(face) => win_if(count(face) == 3, Multiplier::from_whole(181)),
        SicBoBet::SpecificDouble(face) => win_if(count(face) >= 2, Multiplier::from_whole(9)),
        SicBoBet::Total(total) => win_if(sum == total, dice_total_rate(total)),
        SicBoBet::Single(face) => match count(face) {
            0 => Multiplier::ZERO,
            n => Multiplier::from_whole(n as u64 + 1),
        },
    }
}

fn roulette(pick: RouletteBet, number: u8) -> Multiplier {
    let zero = number == 0;
    let red = RED_NUMBERS.contains(&number);
    match pick {
        RouletteBet::Straight(n) => win_if(n == number, Multiplier::from_whole(36)),
        RouletteBet::Red => win_if(red, EVEN_MONEY),
        RouletteBet::Black => win_if(!zero && !red, EVEN_MONEY),
        RouletteBet::Odd => win_if(!zero && number % 2 == 1, EVEN_MONEY),
        RouletteBet::Even => win_if(!zero && number % 2 == 0, EVEN_MONEY),
        RouletteBet::Low => win_if((1..=18).contains(&number), EVEN_MONEY),
        RouletteBet::High => win_if((19..=36).contains(&number), EVEN_MONEY),
        RouletteBet::Dozen(d) => win_if(!zero && (number - 1) / 12 + 1 == d, Multiplier::from_whole(3)),
        RouletteBet::Column(c) => win_if(!zero && (number - 1) % 3 + 1 == c, Multiplier::from_whole(3)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::outcome::wingo_colors;
    use crate::games::types::{BetId, BetStatus, Card, ReservationId, RoundId, Suit, TableId, UserId};
    use chrono::Utc;

    fn bet(kind: BetKind) -> Bet {
        Bet {
            id: BetId::new(),
            round_id: RoundId::new(TableId::from("t"), 1),
            user_id: UserId::from("alice"),
            slot: 0,
            kind,
            stake: 100,
            reservation_id: ReservationId::new(),
            status: BetStatus::Reserved,
            cashed_out_at: None,
            placed_at: Utc::now(),
        }
    }

    fn wingo(number: u8) -> Outcome {
        Outcome::WinGo {
            number,
            colors: wingo_colors(number),
        }
    }

    #[test]
    fn test_wingo_number_always_pays_nine() {
        let table = PayoutTable::new();
        for n in 0..=9u8 {
            assert_eq!(table.evaluate(&bet(BetKind::WinGoNumber(n)), &wingo(n)), Multiplier::from_whole(9));
            assert_eq!(table.evaluate(&bet(BetKind::WinGoNumber(n)), &wingo((n + 1) % 10)), Multiplier::ZERO);
        }
    }

    #[test]
    fn test_wingo_violet_on_zero_and_five() {
        let table = PayoutTable::new();
        let violet = bet(BetKind::WinGoColor(WinGoColor::Violet));
        assert_eq!(table.evaluate(&violet, &wingo(0)), Multiplier::from_hundredths(450));
        assert_eq!(table.evaluate(&violet, &wingo(5)), Multiplier::from_hundredths(450));
        assert_eq!(table.evaluate(&violet, &wingo(3)), Multiplier::ZERO);

        let red = bet(BetKind::WinGoColor(WinGoColor::Red));
        assert_eq!(table.evaluate(&red, &wingo(0)), Multiplier::from_whole(2));
        assert_eq!(table.evaluate(&red, &wingo(5)), Multiplier::ZERO);

        let big = bet(BetKind::WinGoSize(Size::Big));
        assert_eq!(table.evaluate(&big, &wingo(5)), Multiplier::from_whole(2));
        assert_eq!(table.evaluate(&big, &wingo(4)), Multiplier::ZERO);
    }

    #[test]
    fn test_dragon_tiger_tie_scenario() {
        let table = PayoutTable::new();
        let outcome = Outcome::DragonTiger {
            dragon: Card { rank: 9, suit: Suit::Spades },
            tiger: Card { rank: 9, suit: Suit::Diamonds },
        };
        assert_eq!(table.evaluate(&bet(BetKind::DragonTiger(DragonTigerSide::Dragon)), &outcome), Multiplier::ZERO);
        assert_eq!(table.evaluate(&bet(BetKind::DragonTiger(DragonTigerSide::Tiger)), &outcome), Multiplier::ZERO);
        assert_eq!(
            table.evaluate(&bet(BetKind::DragonTiger(DragonTigerSide::Tie)), &outcome),
            Multiplier::from_whole(11)
        );
    }

    #[test]
    fn test_crash_pays_frozen_multiplier_only() {
        let table = PayoutTable::new();
        let outcome = Outcome::Crash {
            crash_point: Multiplier::from_hundredths(250),
        };
        let mut crash_bet = bet(BetKind::Crash);
        assert_eq!(table.evaluate(&crash_bet, &outcome), Multiplier::ZERO);

        crash_bet.cashed_out_at = Some(Multiplier::from_whole(2));
        assert_eq!(table.evaluate(&crash_bet, &outcome), Multiplier::from_whole(2));

        crash_bet.cashed_out_at = Some(Multiplier::from_whole(3));
        assert_eq!(table.evaluate(&crash_bet, &outcome), Multiplier::ZERO);
    }

    #[test]
    fn test_mines_picks() {
        let table = PayoutTable::new();
        let outcome = Outcome::Mines {
            mine_count: 3,
            mine_positions: vec![0, 1, 2],
        };
        assert_eq!(table.evaluate(&bet(BetKind::MinesPicks(vec![10])), &outcome), Multiplier(11_363));
        assert_eq!(table.evaluate(&bet(BetKind::MinesPicks(vec![10, 2])), &outcome), Multiplier::ZERO);
    }

    #[test]
    fn test_baccarat_push_on_tie() {
        let table = PayoutTable::new();
        let outcome = Outcome::Baccarat {
            player: vec![Card { rank: 4, suit: Suit::Spades }, Card { rank: 4, suit: Suit::Hearts }],
            banker: vec![Card { rank: 3, suit: Suit::Spades }, Card { rank: 5, suit: Suit::Hearts }],
        };
        assert_eq!(table.evaluate(&bet(BetKind::Baccarat(BaccaratBet::Player)), &outcome), Multiplier::ONE);
        assert_eq!(table.evaluate(&bet(BetKind::Baccarat(BaccaratBet::Banker)), &outcome), Multiplier::ONE);
        assert_eq!(table.evaluate(&bet(BetKind::Baccarat(BaccaratBet::Tie)), &outcome), Multiplier::from_whole(9));
        assert_eq!(
            table.evaluate(&bet(BetKind::Baccarat(BaccaratBet::PlayerPair)), &outcome),
            Multiplier::from_whole(12)
        );
        assert_eq!(table.evaluate(&bet(BetKind::Baccarat(BaccaratBet::BankerPair)), &outcome), Multiplier::ZERO);
    }

    #[test]
    fn test_sic_bo_small_loses_on_triple() {
        let table = PayoutTable::new();
        let triple = Outcome::SicBo { dice: [2, 2, 2] };
        assert_eq!(table.evaluate(&bet(BetKind::SicBo(SicBoBet::Small)), &triple), Multiplier::ZERO);
        assert_eq!(table.evaluate(&bet(BetKind::SicBo(SicBoBet::AnyTriple)), &triple), Multiplier::from_whole(25));
        assert_eq!(
            table.evaluate(&bet(BetKind::SicBo(SicBoBet::SpecificTriple(2))), &triple),
            Multiplier::from_whole(181)
        );
        assert_eq!(table.evaluate(&bet(BetKind::SicBo(SicBoBet::Single(2))), &triple), Multiplier::from_whole(4));

        let mixed = Outcome::SicBo { dice: [1, 3, 3] };
        assert_eq!(table.evaluate(&bet(BetKind::SicBo(SicBoBet::Small)), &mixed), Multiplier::from_whole(2));
        assert_eq!(table.evaluate(&bet(BetKind::SicBo(SicBoBet::Total(7))), &mixed), Multiplier::from_whole(13));
        assert_eq!(
            table.evaluate(&bet(BetKind::SicBo(SicBoBet::SpecificDouble(3))), &mixed),
            Multiplier::from_whole(9)
        );
    }

    #[test]
    fn test_roulette_zero_loses_outside_bets() {
        let table = PayoutTable::new();
        let zero = Outcome::Roulette { number: 0 };
        for pick in [RouletteBet::Red, RouletteBet::Black, RouletteBet::Even, RouletteBet::Dozen(1)] {
            assert_eq!(table.evaluate(&bet(BetKind::Roulette(pick)), &zero), Multiplier::ZERO);
        }
        assert_eq!(table.evaluate(&bet(BetKind::Roulette(RouletteBet::Straight(0))), &zero), Multiplier::from_whole(36));

        let thirty_four = Outcome::Roulette { number: 34 };
        assert_eq!(table.evaluate(&bet(BetKind::Roulette(RouletteBet::Red)), &thirty_four), Multiplier::from_whole(2));
        assert_eq!(table.evaluate(&bet(BetKind::Roulette(RouletteBet::Column(1))), &thirty_four), Multiplier::from_whole(3));
        assert_eq!(table.evaluate(&bet(BetKind::Roulette(RouletteBet::Dozen(3))), &thirty_four), Multiplier::from_whole(3));
    }

    #[test]
    fn test_five_d_positions() {
        let table = PayoutTable::new();
        let outcome = Outcome::FiveD { digits: [9, 0, 4, 7, 3] };
        let digit = BetKind::FiveD(FiveDBet::Digit { position: 3, digit: 7 });
        assert_eq!(table.evaluate(&bet(digit), &outcome), Multiplier::from_whole(9));
        let size = BetKind::FiveD(FiveDBet::PositionSize { position: 1, size: Size::Small });
        assert_eq!(table.evaluate(&bet(size), &outcome), Multiplier::from_whole(2));
        // 9+0+4+7+3 = 23
        let sum = BetKind::FiveD(FiveDBet::SumSize(Size::Big));
        assert_eq!(table.evaluate(&bet(sum), &outcome), Multiplier::from_whole(2));
    }

    #[test]
    fn test_validate_rejects_malformed_bets() {
        let table = PayoutTable::new();
        let params = GameParams { mine_count: 3 };
        assert!(table.validate(GameType::WinGo, &BetKind::WinGoNumber(10), &params).is_err());
        assert!(table.validate(GameType::Aviator, &BetKind::WinGoNumber(1), &params).is_err());
        assert!(table.validate(GameType::Mines, &BetKind::MinesPicks(vec![]), &params).is_err());
        assert!(table.validate(GameType::Mines, &BetKind::MinesPicks(vec![4, 4]), &params).is_err());
        assert!(table.validate(GameType::Mines, &BetKind::MinesPicks(vec![24]), &params).is_ok());
        assert!(table.validate(GameType::Roulette, &BetKind::Roulette(RouletteBet::Dozen(4)), &params).is_err());
        assert!(table.validate(GameType::SicBo, &BetKind::SicBo(SicBoBet::Single(7)), &params).is_err());
        assert!(table.validate(GameType::Aviator, &BetKind::Crash, &params).is_ok());
    }
}

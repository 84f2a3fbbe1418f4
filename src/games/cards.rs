//! Pure card evaluators shared by the outcome generator and the payout table.

use crate::games::types::{AndarBaharSide, Card, DragonTigerSide, TeenPattiSide};
use std::cmp::Ordering;

/// Dragon Tiger: the higher rank wins, ace low. Equal ranks tie.
pub fn dragon_tiger_winner(dragon: &Card, tiger: &Card) -> DragonTigerSide {
    match dragon.rank.cmp(&tiger.rank) {
        Ordering::Greater => DragonTigerSide::Dragon,
        Ordering::Less => DragonTigerSide::Tiger,
        Ordering::Equal => DragonTigerSide::Tie,
    }
}

/// Baccarat point value (0-9). Tens and faces count zero.
pub fn baccarat_value(card: &Card) -> u8 {
    match card.rank {
        1..=9 => card.rank,
        _ => 0,
    }
}

/// Baccarat hand total (mod 10)
pub fn baccarat_total(cards: &[Card]) -> u8 {
    cards.iter().map(baccarat_value).sum::<u8>() % 10
}

/// First two cards share a rank
pub fn baccarat_is_pair(cards: &[Card]) -> bool {
    cards.len() >= 2 && cards[0].rank == cards[1].rank
}

/// Natural 8 or 9 on the first two cards of either hand ends the deal
pub fn baccarat_is_natural(player: &[Card], banker: &[Card]) -> bool {
    baccarat_total(&player[..2.min(player.len())]) >= 8 || baccarat_total(&banker[..2.min(banker.len())]) >= 8
}

/// Player draws a third card on 0-5
pub fn player_draws(player_total: u8) -> bool {
    player_total <= 5
}

/// Banker tableau
pub fn banker_draws(banker_total: u8, player_third: Option<&Card>) -> bool {
    let Some(third) = player_third else {
        return banker_total <= 5;
    };
    let p = baccarat_value(third);
    match banker_total {
        0..=2 => true,
        3 => p != 8,
        4 => (2..=7).contains(&p),
        5 => (4..=7).contains(&p),
        6 => (6..=7).contains(&p),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaccaratWinner {
    Player,
    Banker,
    Tie,
}

pub fn baccarat_winner(player: &[Card], banker: &[Card]) -> BaccaratWinner {
    match baccarat_total(player).cmp(&baccarat_total(banker)) {
        Ordering::Greater => BaccaratWinner::Player,
        Ordering::Less => BaccaratWinner::Banker,
        Ordering::Equal => BaccaratWinner::Tie,
    }
}

/// Teen Patti hand categories, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TeenPattiRank {
    HighCard,
    Pair,
    Straight,
    Flush,
    StraightFlush,
    Trail,
}

/// Evaluated Teen Patti hand; ordering compares category then kickers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TeenPattiHand {
    pub rank: TeenPattiRank,
    pub kickers: [u8; 3],
}

fn high_rank(card: &Card) -> u8 {
    if card.rank == 1 {
        14
    } else {
        card.rank
    }
}

pub fn evaluate_teen_patti(cards: &[Card; 3]) -> TeenPattiHand {
    let mut ranks: Vec<u8> = cards.iter().map(high_rank).collect();
    ranks.sort_unstable_by(|a, b| b.cmp(a));
    let mut kickers = [ranks[0], ranks[1], ranks[2]];

    let flush = cards[0].suit == cards[1].suit && cards[1].suit == cards[2].suit;
    let consecutive = ranks[0] == ranks[1] + 1 && ranks[1] == ranks[2] + 1;
    let wheel = ranks == [14, 3, 2];
    if wheel {
        kickers = [3, 2, 1];
    }
    let straight = consecutive || wheel;

    let rank = if ranks[0] == ranks[1] && ranks[1] == ranks[2] {
        TeenPattiRank::Trail
    } else if straight && flush {
        TeenPattiRank::StraightFlush
    } else if flush {
        TeenPattiRank::Flush
    } else if straight {
        TeenPattiRank::Straight
    } else if ranks[0] == ranks[1] || ranks[1] == ranks[2] {
        // Pair rank first, then the odd card
        let (pair, kicker) = if ranks[0] == ranks[1] {
            (ranks[0], ranks[2])
        } else {
            (ranks[1], ranks[0])
        };
        kickers = [pair, kicker, 0];
        TeenPattiRank::Pair
    } else {
        TeenPattiRank::HighCard
    };

    TeenPattiHand { rank, kickers }
}

pub fn teen_patti_winner(player_a: &[Card; 3], player_b: &[Card; 3]) -> TeenPattiSide {
    match evaluate_teen_patti(player_a).cmp(&evaluate_teen_patti(player_b)) {
        Ordering::Greater => TeenPattiSide::PlayerA,
        Ordering::Less => TeenPattiSide::PlayerB,
        Ordering::Equal => TeenPattiSide::Tie,
    }
}

/// Andar Bahar: cards alternate Andar, Bahar, Andar, ... and the first card
/// matching the joker's rank decides the side
pub fn andar_bahar_winner(joker: &Card, andar: &[Card], bahar: &[Card]) -> Option<AndarBaharSide> {
    let longest = andar.len().max(bahar.len());
    for i in 0..longest {
        if andar.get(i).is_some_and(|c| c.rank == joker.rank) {
            return Some(AndarBaharSide::Andar);
        }
        if bahar.get(i).is_some_and(|c| c.rank == joker.rank) {
            return Some(AndarBaharSide::Bahar);
        }
    }
    None
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Supported game types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    WinGo,
    Aviator,
    Mines,
    DragonTiger,
    TeenPatti,
    Baccarat,
    AndarBahar,
    SicBo,
    K3,
    FiveD,
    Roulette,
}

impl GameType {
    pub const ALL: [GameType; 11] = [
        GameType::WinGo,
        GameType::Aviator,
        GameType::Mines,
        GameType::DragonTiger,
        GameType::TeenPatti,
        GameType::Baccarat,
        GameType::AndarBahar,
        GameType::SicBo,
        GameType::K3,
        GameType::FiveD,
        GameType::Roulette,
    ];

    /// Crash-style games whose locked phase is a live multiplier flight
    pub fn is_continuous(&self) -> bool {
        matches!(self, GameType::Aviator)
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameType::WinGo => "wingo",
            GameType::Aviator => "aviator",
            GameType::Mines => "mines",
            GameType::DragonTiger => "dragon_tiger",
            GameType::TeenPatti => "teen_patti",
            GameType::Baccarat => "baccarat",
            GameType::AndarBahar => "andar_bahar",
            GameType::SicBo => "sic_bo",
            GameType::K3 => "k3",
            GameType::FiveD => "5d",
            GameType::Roulette => "roulette",
        };
        f.write_str(name)
    }
}

/// Identifier of one game table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TableId(pub String);

impl From<&str> for TableId {
    fn from(value: &str) -> Self {
        TableId(value.to_string())
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Round identifier, unique across tables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RoundId {
    pub table: TableId,
    pub number: u64,
}

impl RoundId {
    pub fn new(table: TableId, number: u64) -> Self {
        Self { table, number }
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.table, self.number)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct BetId(pub Uuid);

impl BetId {
    pub fn new() -> Self {
        BetId(Uuid::new_v4())
    }
}

impl Default for BetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ReservationId(pub Uuid);

impl ReservationId {
    pub fn new() -> Self {
        ReservationId(Uuid::new_v4())
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Player identifier (wallet address or session ID)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId(value.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Independent bet position a user may hold within one round
pub type Slot = u8;

/// Fixed-point payout multiplier with four decimal places (10_000 = 1.00x).
///
/// Multipliers are total-return: stake 100 at 2.00x credits 200.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Multiplier(pub u64);

impl Multiplier {
    pub const SCALE: u64 = 10_000;
    pub const ZERO: Multiplier = Multiplier(0);
    pub const ONE: Multiplier = Multiplier(Self::SCALE);

    /// Whole-number multiplier, e.g. `from_whole(9)` is 9.00x
    pub const fn from_whole(whole: u64) -> Self {
        Multiplier(whole * Self::SCALE)
    }

    /// Multiplier expressed in hundredths, e.g. `from_hundredths(195)` is 1.95x
    pub const fn from_hundredths(hundredths: u64) -> Self {
        Multiplier(hundredths * (Self::SCALE / 100))
    }

    /// Floors a floating point multiplier onto the fixed-point grid
    pub fn from_f64(value: f64) -> Self {
        if !value.is_finite() || value <= 0.0 {
            return Multiplier::ZERO;
        }
        Multiplier((value * Self::SCALE as f64).floor() as u64)
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    /// Truncates to two decimal places, the precision shown on a crash curve
    pub fn to_hundredths(&self) -> Multiplier {
        let step = Self::SCALE / 100;
        Multiplier(self.0 / step * step)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Total amount returned for `stake` at this multiplier (floored)
    pub fn apply(&self, stake: u64) -> u64 {
        let scaled = stake as u128 * self.0 as u128 / Self::SCALE as u128;
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}x", self.as_f64())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Spades,
    Hearts,
    Diamonds,
    Clubs,
}

/// A playing card. `rank` runs 1 (ace) through 13 (king).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Card {
    pub rank: u8,
    pub suit: Suit,
}

impl Card {
    pub const DECK_SIZE: u8 = 52;

    /// Maps a deck index (0..52) onto a card, suits in blocks of 13
    pub fn from_index(index: u8) -> Self {
        let suit = match (index % Self::DECK_SIZE) / 13 {
            0 => Suit::Spades,
            1 => Suit::Hearts,
            2 => Suit::Diamonds,
            _ => Suit::Clubs,
        };
        Card {
            rank: index % 13 + 1,
            suit,
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rank = match self.rank {
            1 => "A".to_string(),
            11 => "J".to_string(),
            12 => "Q".to_string(),
            13 => "K".to_string(),
            n => n.to_string(),
        };
        let suit = match self.suit {
            Suit::Spades => 'S',
            Suit::Hearts => 'H',
            Suit::Diamonds => 'D',
            Suit::Clubs => 'C',
        };
        write!(f, "{}{}", rank, suit)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WinGoColor {
    Red,
    Green,
    Violet,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Size {
    Big,
    Small,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DragonTigerSide {
    Dragon,
    Tiger,
    Tie,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BaccaratBet {
    Player,
    Banker,
    Tie,
    PlayerPair,
    BankerPair,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TeenPattiSide {
    PlayerA,
    PlayerB,
    Tie,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AndarBaharSide {
    Andar,
    Bahar,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SicBoBet {
    Small,
    Big,
    Odd,
    Even,
    AnyTriple,
    SpecificTriple(u8),
    SpecificDouble(u8),
    Total(u8),
    Single(u8),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum K3Bet {
    Sum(u8),
    Size(Size),
    Parity(Parity),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FiveDBet {
    Digit { position: u8, digit: u8 },
    PositionSize { position: u8, size: Size },
    SumSize(Size),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RouletteBet {
    Straight(u8),
    Red,
    Black,
    Odd,
    Even,
    Low,
    High,
    Dozen(u8),
    Column(u8),
}

/// Normalised `{type, value}` bet selector consumed by the payout table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BetKind {
    WinGoNumber(u8),
    WinGoColor(WinGoColor),
    WinGoSize(Size),
    Crash,
    MinesPicks(Vec<u8>),
    DragonTiger(DragonTigerSide),
    Baccarat(BaccaratBet),
    TeenPatti(TeenPattiSide),
    AndarBahar(AndarBaharSide),
    SicBo(SicBoBet),
    K3(K3Bet),
    FiveD(FiveDBet),
    Roulette(RouletteBet),
}

impl BetKind {
    /// Game this bet selector belongs to
    pub fn game_type(&self) -> GameType {
        match self {
            BetKind::WinGoNumber(_) | BetKind::WinGoColor(_) | BetKind::WinGoSize(_) => {
                GameType::WinGo
            }
            BetKind::Crash => GameType::Aviator,
            BetKind::MinesPicks(_) => GameType::Mines,
            BetKind::DragonTiger(_) => GameType::DragonTiger,
            BetKind::Baccarat(_) => GameType::Baccarat,
            BetKind::TeenPatti(_) => GameType::TeenPatti,
            BetKind::AndarBahar(_) => GameType::AndarBahar,
            BetKind::SicBo(_) => GameType::SicBo,
            BetKind::K3(_) => GameType::K3,
            BetKind::FiveD(_) => GameType::FiveD,
            BetKind::Roulette(_) => GameType::Roulette,
        }
    }
}

/// Game-specific round result. Generated once per round, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "game", rename_all = "snake_case")]
pub enum Outcome {
    Crash {
        crash_point: Multiplier,
    },
    WinGo {
        number: u8,
        colors: Vec<WinGoColor>,
    },
    Mines {
        mine_count: u8,
        mine_positions: Vec<u8>,
    },
    DragonTiger {
        dragon: Card,
        tiger: Card,
    },
    Baccarat {
        player: Vec<Card>,
        banker: Vec<Card>,
    },
    TeenPatti {
        player_a: [Card; 3],
        player_b: [Card; 3],
    },
    AndarBahar {
        joker: Card,
        andar: Vec<Card>,
        bahar: Vec<Card>,
    },
    SicBo {
        dice: [u8; 3],
    },
    K3 {
        dice: [u8; 3],
    },
    FiveD {
        digits: [u8; 5],
    },
    Roulette {
        number: u8,
    },
}

impl Outcome {
    pub fn game_type(&self) -> GameType {
        match self {
            Outcome::Crash { .. } => GameType::Aviator,
            Outcome::WinGo { .. } => GameType::WinGo,
            Outcome::Mines { .. } => GameType::Mines,
            Outcome::DragonTiger { .. } => GameType::DragonTiger,
            Outcome::Baccarat { .. } => GameType::Baccarat,
            Outcome::TeenPatti { .. } => GameType::TeenPatti,
            Outcome::AndarBahar { .. } => GameType::AndarBahar,
            Outcome::SicBo { .. } => GameType::SicBo,
            Outcome::K3 { .. } => GameType::K3,
            Outcome::FiveD { .. } => GameType::FiveD,
            Outcome::Roulette { .. } => GameType::Roulette,
        }
    }
}

/// Round phase, advanced only by the table's scheduler
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Betting,
    Locked,
    Resolving,
    Settled,
    Voided,
    Cooldown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Betting => "betting",
            Phase::Locked => "locked",
            Phase::Resolving => "resolving",
            Phase::Settled => "settled",
            Phase::Voided => "voided",
            Phase::Cooldown => "cooldown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Reserved,
    Won,
    Lost,
    Voided,
}

/// A stake placed against one round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bet {
    pub id: BetId,
    pub round_id: RoundId,
    pub user_id: UserId,
    pub slot: Slot,
    pub kind: BetKind,
    pub stake: u64,
    pub reservation_id: ReservationId,
    pub status: BetStatus,
    /// Frozen multiplier for crash bets cashed out mid-flight
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cashed_out_at: Option<Multiplier>,
    pub placed_at: DateTime<Utc>,
}

/// VRF bundle containing cryptographic proof
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VRFBundle {
    /// Hex-encoded VRF pre-output (32 bytes); the round seed is derived from it
    pub vrf_output: String,
    /// Hex-encoded schnorrkel VRF proof (64 bytes)
    pub vrf_proof: String,
    /// Hex-encoded public key (32 bytes)
    pub public_key: String,
    /// Input message used for VRF
    pub input_message: String,
}

/// One game table round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    pub id: RoundId,
    pub game_type: GameType,
    pub phase: Phase,
    pub opened_at: DateTime<Utc>,
    pub betting_ends_at: DateTime<Utc>,
    /// Set when the outcome is revealed
    pub reveal_ends_at: Option<DateTime<Utc>>,
    pub outcome: Option<Outcome>,
    /// SHA-256 of the round seed, published when betting closes
    pub seed_commitment: Option<String>,
}

impl Round {
    pub fn new(id: RoundId, game_type: GameType, opened_at: DateTime<Utc>, betting_ends_at: DateTime<Utc>) -> Self {
        Self {
            id,
            game_type,
            phase: Phase::Betting,
            opened_at,
            betting_ends_at,
            reveal_ends_at: None,
            outcome: None,
            seed_commitment: None,
        }
    }

    /// Record the round's outcome. A round accepts exactly one.
    pub fn set_outcome(&mut self, outcome: Outcome) -> Result<(), crate::errors::RoundError> {
        if self.outcome.is_some() {
            return Err(crate::errors::RoundError::OutcomeAlreadyGenerated(self.id.clone()));
        }
        self.outcome = Some(outcome);
        Ok(())
    }
}

/// Append-only audit record of a settled round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub round_id: RoundId,
    pub game_type: GameType,
    pub outcome: Outcome,
    /// Seed proof; `vrf_output` replays the outcome through the generator
    pub fairness: VRFBundle,
    pub settled_at: DateTime<Utc>,
    pub bet_count: usize,
    pub total_staked: u64,
    pub total_paid: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplier_apply_floors() {
        assert_eq!(Multiplier::from_whole(2).apply(100), 200);
        assert_eq!(Multiplier::from_hundredths(195).apply(100), 195);
        assert_eq!(Multiplier(11_363).apply(100), 113);
        assert_eq!(Multiplier::ZERO.apply(1_000), 0);
    }

    #[test]
    fn test_multiplier_display_and_truncation() {
        assert_eq!(Multiplier::from_hundredths(250).to_string(), "2.50x");
        assert_eq!(Multiplier(20_149).to_hundredths(), Multiplier::from_hundredths(201));
        assert_eq!(Multiplier::from_f64(2.0), Multiplier::from_whole(2));
        assert_eq!(Multiplier::from_f64(f64::NAN), Multiplier::ZERO);
    }

    #[test]
    fn test_card_from_index_covers_deck() {
        let cards: std::collections::HashSet<Card> = (0..52).map(Card::from_index).collect();
        assert_eq!(cards.len(), 52);
        assert_eq!(Card::from_index(0), Card { rank: 1, suit: Suit::Spades });
        assert_eq!(Card::from_index(51), Card { rank: 13, suit: Suit::Clubs });
        assert_eq!(Card::from_index(13).to_string(), "AH");
    }

    #[test]
    fn test_bet_kind_serializes_as_type_value_pair() {
        let kind = BetKind::WinGoColor(WinGoColor::Violet);
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "win_go_color");
        assert_eq!(json["value"], "violet");

        let parsed: BetKind = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, kind);
    }

    #[test]
    fn test_round_accepts_single_outcome() {
        let id = RoundId::new(TableId::from("sicbo-1"), 1);
        let now = Utc::now();
        let mut round = Round::new(id, GameType::SicBo, now, now);

        round.set_outcome(Outcome::SicBo { dice: [1, 2, 3] }).unwrap();
        assert!(round.set_outcome(Outcome::SicBo { dice: [4, 5, 6] }).is_err());
        assert_eq!(round.outcome, Some(Outcome::SicBo { dice: [1, 2, 3] }));
    }
}

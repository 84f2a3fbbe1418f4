//! Append-only round history, read by result strips and fairness audits

use crate::errors::EngineError;
use crate::games::types::{GameType, HistoryEntry, RoundId};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one settled round. Returns `false` if the round was already
    /// recorded, which happens when a settlement is replayed.
    async fn append(&self, entry: HistoryEntry) -> Result<bool, EngineError>;

    /// Most recent entries for a game type, newest first
    async fn list_recent(&self, game_type: GameType, limit: usize) -> Result<Vec<HistoryEntry>, EngineError>;
}

/// Bounded in-memory history, one ring per game type
#[derive(Debug)]
pub struct InMemoryHistoryStore {
    entries: DashMap<GameType, VecDeque<HistoryEntry>>,
    recorded: Mutex<HashSet<RoundId>>,
    capacity: usize,
}

impl InMemoryHistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            recorded: Mutex::new(HashSet::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self, game_type: GameType) -> usize {
        self.entries.get(&game_type).map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.is_empty())
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new(1_000)
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, entry: HistoryEntry) -> Result<bool, EngineError> {
        {
            let mut recorded = self
                .recorded
                .lock()
                .map_err(|_| EngineError::History("history index poisoned".to_string()))?;
            if !recorded.insert(entry.round_id.clone()) {
                return Ok(false);
            }
        }

        let mut ring = self.entries.entry(entry.game_type).or_default();
        ring.push_back(entry);
        while ring.len() > self.capacity {
            if let Some(evicted) = ring.pop_front() {
                if let Ok(mut recorded) = self.recorded.lock() {
                    recorded.remove(&evicted.round_id);
                }
            }
        }
        Ok(true)
    }

    async fn list_recent(&self, game_type: GameType, limit: usize) -> Result<Vec<HistoryEntry>, EngineError> {
        Ok(self
            .entries
            .get(&game_type)
            .map(|ring| ring.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::{Outcome, TableId, VRFBundle};
    use chrono::Utc;

    fn entry(number: u64) -> HistoryEntry {
        HistoryEntry {
            round_id: RoundId::new(TableId::from("sicbo-1"), number),
            game_type: GameType::SicBo,
            outcome: Outcome::SicBo { dice: [1, 2, 3] },
            fairness: VRFBundle {
                vrf_output: String::new(),
                vrf_proof: String::new(),
                public_key: String::new(),
                input_message: String::new(),
            },
            settled_at: Utc::now(),
            bet_count: 0,
            total_staked: 0,
            total_paid: 0,
        }
    }

    #[tokio::test]
    async fn test_list_recent_newest_first() {
        let store = InMemoryHistoryStore::new(10);
        for n in 1..=5 {
            assert!(store.append(entry(n)).await.unwrap());
        }
        let recent = store.list_recent(GameType::SicBo, 3).await.unwrap();
        let numbers: Vec<u64> = recent.iter().map(|e| e.round_id.number).collect();
        assert_eq!(numbers, vec![5, 4, 3]);
        assert!(store.list_recent(GameType::WinGo, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_round_ignored() {
        let store = InMemoryHistoryStore::new(10);
        assert!(store.append(entry(1)).await.unwrap());
        assert!(!store.append(entry(1)).await.unwrap());
        assert_eq!(store.len(GameType::SicBo), 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let store = InMemoryHistoryStore::new(2);
        for n in 1..=3 {
            store.append(entry(n)).await.unwrap();
        }
        let numbers: Vec<u64> = store
            .list_recent(GameType::SicBo, 10)
            .await
            .unwrap()
            .iter()
            .map(|e| e.round_id.number)
            .collect();
        assert_eq!(numbers, vec![3, 2]);
    }
}

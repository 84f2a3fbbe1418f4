//! Engine counters, rendered in Prometheus text exposition format

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Process-wide counters shared by every table
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    pub bets_placed_total: Arc<AtomicU64>,
    pub bets_rejected_total: Arc<AtomicU64>,
    pub cash_outs_total: Arc<AtomicU64>,
    pub rounds_settled_total: Arc<AtomicU64>,
    pub rounds_voided_total: Arc<AtomicU64>,
    pub stake_total: Arc<AtomicU64>,
    pub payout_total: Arc<AtomicU64>,
    pub refunded_total: Arc<AtomicU64>,
    settlement_micros_total: Arc<AtomicU64>,
    settlement_micros_max: Arc<AtomicU64>,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_bet_placed(&self, stake: u64) {
        self.bets_placed_total.fetch_add(1, Ordering::Relaxed);
        self.stake_total.fetch_add(stake, Ordering::Relaxed);
    }

    pub fn record_bet_rejected(&self) {
        self.bets_rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cash_out(&self) {
        self.cash_outs_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_settlement(&self, paid: u64, elapsed: Duration) {
        self.rounds_settled_total.fetch_add(1, Ordering::Relaxed);
        self.payout_total.fetch_add(paid, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.settlement_micros_total.fetch_add(micros, Ordering::Relaxed);
        self.settlement_micros_max.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn record_void(&self, refunded: u64) {
        self.rounds_voided_total.fetch_add(1, Ordering::Relaxed);
        self.refunded_total.fetch_add(refunded, Ordering::Relaxed);
    }

    /// Mean settlement latency in milliseconds
    pub fn avg_settlement_ms(&self) -> f64 {
        let rounds = self.rounds_settled_total.load(Ordering::Relaxed);
        if rounds == 0 {
            return 0.0;
        }
        self.settlement_micros_total.load(Ordering::Relaxed) as f64 / rounds as f64 / 1000.0
    }

    /// Generate Prometheus metrics format
    pub fn to_prometheus_format(&self) -> String {
        let mut output = String::new();

        let counters = [
            ("bets_placed_total", "Bets accepted into a round", &self.bets_placed_total),
            ("bets_rejected_total", "Bet submissions refused", &self.bets_rejected_total),
            ("cash_outs_total", "Crash bets cashed out mid-flight", &self.cash_outs_total),
            ("rounds_settled_total", "Rounds settled", &self.rounds_settled_total),
            ("rounds_voided_total", "Rounds voided with stakes refunded", &self.rounds_voided_total),
            ("stake_total", "Total stake reserved, minor units", &self.stake_total),
            ("payout_total", "Total paid to winning bets, minor units", &self.payout_total),
            ("refunded_total", "Total stake refunded by voids, minor units", &self.refunded_total),
        ];

        for (name, help, value) in counters {
            output.push_str(&format!(
                "# HELP roundhouse_{name} {help}\n\
                 # TYPE roundhouse_{name} counter\n\
                 roundhouse_{name} {}\n\n",
                value.load(Ordering::Relaxed)
            ));
        }

        output.push_str(&format!(
            "# HELP roundhouse_settlement_duration_ms Settlement latency\n\
             # TYPE roundhouse_settlement_duration_ms gauge\n\
             roundhouse_settlement_duration_ms{{stat=\"avg\"}} {}\n\
             roundhouse_settlement_duration_ms{{stat=\"max\"}} {}\n",
            self.avg_settlement_ms(),
            self.settlement_micros_max.load(Ordering::Relaxed) as f64 / 1000.0
        ));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render() {
        let metrics = EngineMetrics::new();
        metrics.record_bet_placed(100);
        metrics.record_bet_placed(50);
        metrics.record_bet_rejected();
        metrics.record_settlement(300, Duration::from_millis(4));

        let text = metrics.to_prometheus_format();
        assert!(text.contains("roundhouse_bets_placed_total 2"));
        assert!(text.contains("roundhouse_stake_total 150"));
        assert!(text.contains("roundhouse_bets_rejected_total 1"));
        assert!(text.contains("roundhouse_payout_total 300"));
        assert_eq!(metrics.avg_settlement_ms(), 4.0);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = EngineMetrics::new();
        let shared = metrics.clone();
        shared.record_void(75);
        assert_eq!(metrics.rounds_voided_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.refunded_total.load(Ordering::Relaxed), 75);
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;
use lazy_static::lazy_static;
use parking_lot::Mutex;

pub const TX_ACCEPTED: &str = "transactions_accepted_total";
pub const TX_REJECTED: &str = "transactions_rejected_total";
pub const TX_CONFIRMED: &str = "transactions_confirmed_total";
pub const TX_EXPIRED: &str = "transactions_expired_total";
pub const SIG_ACCEPTED: &str = "signatures_accepted_total";
pub const SIG_REJECTED: &str = "signatures_rejected_total";
pub const BLOCKS_FORGED: &str = "blocks_forged_total";
pub const POOL_SIZE: &str = "txpool_size";
pub const CHAIN_HEIGHT: &str = "chain_height";

/// Metrics registry (simple, Prometheus-style)
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    counters: Arc<Mutex<BTreeMap<String, u64>>>,
    gauges: Arc<Mutex<BTreeMap<String, f64>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_counter(&self, name: &str) {
        self.add_counter(name, 1);
    }

    pub fn add_counter(&self, name: &str, by: u64) {
        let mut counters = self.counters.lock();
        *counters.entry(name.to_string()).or_insert(0) += by;
    }

    pub fn set_gauge(&self, name: &str, val: f64) {
        self.gauges.lock().insert(name.to_string(), val);
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> (BTreeMap<String, u64>, BTreeMap<String, f64>) {
        (self.counters.lock().clone(), self.gauges.lock().clone())
    }

    /// Render in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let (counters, gauges) = self.snapshot();
        let mut out = String::new();
        for (name, v) in counters {
            out.push_str(&format!("# TYPE {} counter\n{} {}\n", name, name, v));
        }
        for (name, v) in gauges {
            out.push_str(&format!("# TYPE {} gauge\n{} {}\n", name, name, v));
        }
        out
    }
}

lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_counters_and_gauges() {
        let m = MetricsRegistry::new();
        m.inc_counter(TX_ACCEPTED);
        m.add_counter(TX_ACCEPTED, 2);
        m.set_gauge(CHAIN_HEIGHT, 7.0);
        assert_eq!(m.counter(TX_ACCEPTED), 3);
        let text = m.render();
        assert!(text.contains("transactions_accepted_total 3"));
        assert!(text.contains("chain_height 7"));
    }
}

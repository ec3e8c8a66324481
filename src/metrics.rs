use dashmap::DashMap;

/// Counter sink handed to the stores so nothing keeps process-wide tallies
pub trait Metrics: Send + Sync {
    fn incr(&self, name: &'static str, by: u64);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetrics;

impl Metrics for NoMetrics {
    fn incr(&self, _name: &'static str, _by: u64) {}
}

/// Keeps running totals in memory
#[derive(Debug, Default)]
pub struct CountingMetrics {
    counters: DashMap<&'static str, u64>,
}

impl CountingMetrics {
    pub fn new() -> CountingMetrics {
        Default::default()
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).map(|v| *v).unwrap_or(0)
    }

    /// All counters, sorted by name
    pub fn read_all(&self) -> Vec<(&'static str, u64)> {
        let mut v: Vec<(&'static str, u64)> =
            self.counters.iter().map(|r| (*r.key(), *r.value())).collect();
        v.sort();
        v
    }
}

impl Metrics for CountingMetrics {
    fn incr(&self, name: &'static str, by: u64) {
        *self.counters.entry(name).or_insert(0) += by;
    }
}

use crate::fleet::types::{FuelSample, MAX_FUEL_LEVEL, MIN_FUEL_LEVEL};
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_MAX_SAMPLES: usize = 600;

/// Per-truck rolling fuel history.
///
/// Samples stay in arrival order. Out-of-order timestamps are kept where they
/// land; chart consumers sort if they need chronological order.
#[derive(Debug, Clone)]
pub struct FuelHistory {
    by_truck_id: HashMap<String, VecDeque<FuelSample>>,
    max_samples: usize,
}

impl Default for FuelHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SAMPLES)
    }
}

impl FuelHistory {
    pub fn new(max_samples: usize) -> Self {
        Self {
            by_truck_id: HashMap::new(),
            max_samples: max_samples.max(1),
        }
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    pub fn append(&mut self, truck_id: &str, timestamp: i64, fuel_level: f64) {
        let max_samples = self.max_samples;
        let buffer = self
            .by_truck_id
            .entry(truck_id.to_string())
            .or_insert_with(|| VecDeque::with_capacity(max_samples.min(64)));

        buffer.push_back(FuelSample {
            timestamp,
            fuel_level: fuel_level.clamp(MIN_FUEL_LEVEL, MAX_FUEL_LEVEL),
        });

        if buffer.len() > max_samples {
            let overflow = buffer.len() - max_samples;
            buffer.drain(0..overflow);
        }
    }

    pub fn samples(&self, truck_id: &str) -> Vec<FuelSample> {
        self.by_truck_id
            .get(truck_id)
            .map(|buffer| buffer.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, truck_id: &str) -> Option<FuelSample> {
        self.by_truck_id
            .get(truck_id)
            .and_then(|buffer| buffer.back().copied())
    }

    pub fn len(&self, truck_id: &str) -> usize {
        self.by_truck_id.get(truck_id).map_or(0, VecDeque::len)
    }

    pub fn tracked_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.by_truck_id.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Drops one truck's buffer, or every buffer when `truck_id` is `None`.
    pub fn clear(&mut self, truck_id: Option<&str>) {
        match truck_id {
            Some(id) => {
                self.by_truck_id.remove(id);
            }
            None => self.by_truck_id.clear(),
        }
    }
}

//! Payload-keyed calculation response cache.
//!
//! Keys are the serialized request payload, so two requests built from the
//! same form state hit the same entry. Bounded FIFO eviction.

use std::collections::VecDeque;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use super::triggers::CalculationResponse;

/// Bounded cache of calculation responses
#[derive(Debug)]
pub struct CalculationCache {
    entries: DashMap<String, CalculationResponse>,
    insertion_order: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl CalculationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            insertion_order: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    fn key_for(payload: &Value) -> String {
        payload.to_string()
    }

    /// Look up a previously seen response for this request payload.
    pub fn lookup(&self, payload: &Value) -> Option<CalculationResponse> {
        let key = Self::key_for(payload);
        let hit = self.entries.get(&key).map(|entry| entry.value().clone());
        if hit.is_some() {
            debug!(key_len = key.len(), "Calculation cache hit");
        }
        hit
    }

    /// Store a response under its request payload.
    pub fn store(&self, payload: &Value, response: CalculationResponse) {
        let key = Self::key_for(payload);
        let mut order = self.insertion_order.lock();
        if !self.entries.contains_key(&key) {
            if order.len() == self.capacity {
                if let Some(evicted) = order.pop_front() {
                    self.entries.remove(&evicted);
                }
            }
            order.push_back(key.clone());
        }
        self.entries.insert(key, response);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::models::Utxo;

/// Name of the strategy used when the caller does not pick one
pub const DEFAULT_SELECTION_ALGO: &str = "largest-first";

/// Chooses inputs covering an amount of one token
pub trait InputSelector: Send + Sync {
    /// `candidates` are spendable UTXOs of a single token ordered by value descending.
    /// Returns the chosen inputs; their sum may fall short when funds are insufficient.
    fn select(&self, candidates: &[Utxo], amount: i64) -> Vec<Utxo>;
}

/// Takes the biggest outputs until the amount is covered
#[derive(Debug, Default, Clone, Copy)]
pub struct LargestFirst;

impl InputSelector for LargestFirst {
    fn select(&self, candidates: &[Utxo], amount: i64) -> Vec<Utxo> {
        let mut sorted: Vec<&Utxo> = candidates.iter().collect();
        sorted.sort_by(|a, b| b.value.cmp(&a.value));

        let mut selected = Vec::new();
        let mut total = 0i64;
        for utxo in sorted {
            if total >= amount {
                break;
            }
            total += utxo.value;
            selected.push(utxo.clone());
        }
        selected
    }
}

/// Named selection strategies
#[derive(Clone)]
pub struct SelectorRegistry {
    selectors: HashMap<String, Arc<dyn InputSelector>>,
}

impl Default for SelectorRegistry {
    fn default() -> Self {
        let mut registry = Self {
            selectors: HashMap::new(),
        };
        registry.register(DEFAULT_SELECTION_ALGO, Arc::new(LargestFirst));
        registry
    }
}

impl SelectorRegistry {
    pub fn register(&mut self, name: &str, selector: Arc<dyn InputSelector>) {
        self.selectors.insert(name.to_string(), selector);
    }

    /// Strategy by name, or the default one for `None`
    pub fn get(&self, name: Option<&str>) -> Option<Arc<dyn InputSelector>> {
        self.selectors
            .get(name.unwrap_or(DEFAULT_SELECTION_ALGO))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Authorities;

    fn utxo(index: i32, value: i64) -> Utxo {
        Utxo {
            tx_id: "tx".to_string(),
            index,
            token_id: "00".to_string(),
            address: "A".to_string(),
            value,
            authorities: Authorities::NONE,
            timelock: None,
            heightlock: None,
            locked: false,
            spent_by: None,
            tx_proposal_id: None,
            tx_proposal_index: None,
        }
    }

    #[test]
    fn test_largest_first_selects_biggest() {
        let candidates = vec![utxo(0, 7), utxo(1, 4), utxo(2, 1)];
        let selected = LargestFirst.select(&candidates, 9);
        let values: Vec<i64> = selected.iter().map(|u| u.value).collect();
        assert_eq!(values, vec![7, 4]);
    }

    #[test]
    fn test_largest_first_ignores_input_order() {
        let candidates = vec![utxo(0, 1), utxo(1, 7), utxo(2, 4)];
        let selected = LargestFirst.select(&candidates, 5);
        assert_eq!(selected.iter().map(|u| u.value).collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn test_largest_first_returns_all_when_short() {
        let candidates = vec![utxo(0, 2), utxo(1, 1)];
        let selected = LargestFirst.select(&candidates, 10);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = SelectorRegistry::default();
        assert!(registry.get(None).is_some());
        assert!(registry.get(Some("largest-first")).is_some());
        assert!(registry.get(Some("random")).is_none());
    }
}

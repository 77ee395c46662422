use std::collections::HashMap;
use std::sync::Arc;

use crate::types::RewardItem;

pub const GOLD_ITEM_ID: u64 = 1;
pub const EXP_ITEM_ID: u64 = 2;

/// Display names for item ids.
pub trait ItemNames: Send + Sync {
    fn name(&self, id: u64) -> String;
}

/// Static id → name table. Unknown ids render as `item#<id>`.
#[derive(Clone, Debug)]
pub struct ItemCatalog {
    names: HashMap<u64, String>,
}

impl ItemCatalog {
    pub fn new(names: HashMap<u64, String>) -> Self {
        let mut catalog = Self::default();
        catalog.names.extend(names);
        catalog
    }
}

impl Default for ItemCatalog {
    fn default() -> Self {
        let names = HashMap::from([
            (GOLD_ITEM_ID, "Gold".to_string()),
            (EXP_ITEM_ID, "Experience".to_string()),
        ]);
        Self { names }
    }
}

impl ItemNames for ItemCatalog {
    fn name(&self, id: u64) -> String {
        self.names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("item#{}", id))
    }
}

#[derive(Clone)]
pub struct RewardSummarizer {
    currency_id: u64,
    experience_id: u64,
    names: Arc<dyn ItemNames>,
}

impl RewardSummarizer {
    pub fn new(currency_id: u64, experience_id: u64, names: Arc<dyn ItemNames>) -> Self {
        Self {
            currency_id,
            experience_id,
            names,
        }
    }

    /// Joins one entry per item with `/`.
    ///
    /// Gold and experience items get a shorthand entry *and* the generic entry, so they show up
    /// twice. Whether that duplication is intended is unconfirmed; keep it until it is.
    pub fn summarize(&self, items: &[RewardItem]) -> String {
        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            if item.id == self.currency_id {
                parts.push(format!("gold:{}", item.count));
            } else if item.id == self.experience_id {
                parts.push(format!("exp:{}", item.count));
            }
            parts.push(format!(
                "{}({})x{}",
                self.names.name(item.id),
                item.id,
                item.count
            ));
        }
        parts.join("/")
    }
}

impl Default for RewardSummarizer {
    fn default() -> Self {
        Self::new(GOLD_ITEM_ID, EXP_ITEM_ID, Arc::new(ItemCatalog::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: u64, count: u64) -> RewardItem {
        RewardItem { id, count }
    }

    #[test]
    fn currency_item_yields_two_segments() {
        let summary = RewardSummarizer::default().summarize(&[item(GOLD_ITEM_ID, 100)]);
        assert_eq!(summary, "gold:100/Gold(1)x100");
        assert_eq!(summary.split('/').count(), 2);
    }

    #[test]
    fn experience_item_yields_two_segments() {
        let summary = RewardSummarizer::default().summarize(&[item(EXP_ITEM_ID, 30)]);
        assert_eq!(summary, "exp:30/Experience(2)x30");
    }

    #[test]
    fn ordinary_items_yield_one_segment_each_in_order() {
        let names = ItemCatalog::new(HashMap::from([(20001, "Carrot Seed".to_string())]));
        let summarizer = RewardSummarizer::new(GOLD_ITEM_ID, EXP_ITEM_ID, Arc::new(names));
        let summary = summarizer.summarize(&[item(20001, 5), item(1, 10), item(777, 1)]);
        assert_eq!(
            summary,
            "Carrot Seed(20001)x5/gold:10/Gold(1)x10/item#777(777)x1"
        );
    }

    #[test]
    fn empty_items_give_empty_summary() {
        assert_eq!(RewardSummarizer::default().summarize(&[]), "");
    }
}

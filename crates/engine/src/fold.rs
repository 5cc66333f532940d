//! Folded/expanded state of multi-item transactions.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::sort_order::{SortItem, SortOrderState};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FoldState {
    expanded: BTreeSet<Uuid>,
}

impl FoldState {
    /// Every group starts folded.
    pub fn regenerate(&mut self) {
        self.expanded.clear();
    }

    /// Single-item transactions have nothing to fold and always report
    /// `false`.
    pub fn is_folded(&self, order: &SortOrderState, transaction_id: Uuid) -> bool {
        let grouped = order
            .values()
            .flatten()
            .any(|entry| matches!(entry, SortItem::Group(_)) && entry.transaction_id() == transaction_id);
        grouped && !self.expanded.contains(&transaction_id)
    }

    /// Flips the state and returns whether the transaction is now expanded.
    pub fn toggle(&mut self, transaction_id: Uuid) -> bool {
        if self.expanded.remove(&transaction_id) {
            false
        } else {
            self.expanded.insert(transaction_id);
            true
        }
    }

    pub fn expand(&mut self, transaction_id: Uuid) {
        self.expanded.insert(transaction_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn groups_start_folded_and_toggle() {
        let group = Uuid::new_v4();
        let single = Uuid::new_v4();
        let mut order = SortOrderState::new();
        order.insert(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            vec![
                SortItem::Group(vec![group, Uuid::new_v4(), Uuid::new_v4()]),
                SortItem::Single(single),
            ],
        );
        let mut fold = FoldState::default();
        fold.regenerate();

        assert!(fold.is_folded(&order, group));
        assert!(!fold.is_folded(&order, single));

        assert!(fold.toggle(group));
        assert!(!fold.is_folded(&order, group));
        assert!(!fold.toggle(group));
        assert!(fold.is_folded(&order, group));
    }
}

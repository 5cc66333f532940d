//! Display order of transactions inside each date and of items inside each
//! multi-item transaction.
//!
//! Two states are kept: `def`, derived from the loaded snapshot, and `cur`,
//! the order as edited. Saving compares positions derived from `cur` with the
//! loaded ones; discarding copies `def` back over `cur`.
//!
//! A multi-item transaction is stored as a tuple whose index 0 is the
//! transaction id itself, so item indices start at 1. The API does not hide
//! that offset: [`SortOrder::update_item_position`] takes tuple indices.

use std::collections::{BTreeMap, HashMap};

use api_types::ledger::Transaction;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::{EngineError, ResultEngine};

/// One entry of a date bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SortItem {
    /// A transaction with a single item.
    Single(Uuid),
    /// `[transaction_id, item_id_1, item_id_2, ...]`.
    Group(Vec<Uuid>),
}

impl SortItem {
    pub fn transaction_id(&self) -> Uuid {
        match self {
            Self::Single(id) => *id,
            Self::Group(ids) => ids[0],
        }
    }

    /// Item ids in display order. Empty for [`SortItem::Single`].
    pub fn item_ids(&self) -> &[Uuid] {
        match self {
            Self::Single(_) => &[],
            Self::Group(ids) => &ids[1..],
        }
    }

    /// Tuple index of `item_id` (>= 1), if the entry is a group holding it.
    pub fn tuple_index(&self, item_id: Uuid) -> Option<usize> {
        match self {
            Self::Single(_) => None,
            Self::Group(ids) => ids.iter().skip(1).position(|id| *id == item_id).map(|i| i + 1),
        }
    }
}

/// Date → entries, index 0 being the top of the day.
pub type SortOrderState = BTreeMap<NaiveDate, Vec<SortItem>>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SortOrder {
    def: SortOrderState,
    cur: SortOrderState,
}

impl SortOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds both states from freshly loaded transactions.
    ///
    /// Within a date, transactions are ordered by `order_position` ascending
    /// (ties keep load order) and the bucket is then reversed: the highest
    /// position, or the last loaded on ties, ends up on top. Items keep
    /// ascending `order_position`.
    pub fn gen_default(&mut self, transactions: &[Transaction]) {
        let mut grouped: BTreeMap<NaiveDate, Vec<&Transaction>> = BTreeMap::new();
        for transaction in transactions {
            grouped.entry(transaction.date).or_default().push(transaction);
        }

        let mut state = SortOrderState::new();
        for (date, mut bucket) in grouped {
            bucket.sort_by_key(|t| t.order_position);
            let entries = bucket
                .into_iter()
                .rev()
                .map(|transaction| {
                    if transaction.items.len() > 1 {
                        let mut items: Vec<_> = transaction.items.iter().collect();
                        items.sort_by_key(|item| item.order_position);
                        let mut ids = Vec::with_capacity(items.len() + 1);
                        ids.push(transaction.id);
                        ids.extend(items.into_iter().map(|item| item.id));
                        SortItem::Group(ids)
                    } else {
                        SortItem::Single(transaction.id)
                    }
                })
                .collect();
            state.insert(date, entries);
        }

        self.def = state.clone();
        self.cur = state;
    }

    pub fn def(&self) -> &SortOrderState {
        &self.def
    }

    pub fn cur(&self) -> &SortOrderState {
        &self.cur
    }

    /// Current entries of `date`, empty when the date has none.
    pub fn bucket(&self, date: NaiveDate) -> &[SortItem] {
        self.cur.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Moves the entry at `old_index` of `date` to `new_index`.
    pub fn update_transaction_position(
        &mut self,
        date: NaiveDate,
        old_index: usize,
        new_index: usize,
    ) -> ResultEngine<()> {
        let bucket = self
            .cur
            .get_mut(&date)
            .ok_or_else(|| EngineError::KeyNotFound(format!("date {date}")))?;
        let len = bucket.len();
        if old_index >= len || new_index >= len {
            return Err(EngineError::IndexOutOfBounds(format!(
                "move {old_index} -> {new_index} in {date} with {len} transactions"
            )));
        }
        let entry = bucket.remove(old_index);
        bucket.insert(new_index, entry);
        Ok(())
    }

    /// Moves the item at tuple index `old_index` to `new_index`.
    ///
    /// Both indices are tuple indices: index 0 is the transaction id and is
    /// never a valid item index.
    pub fn update_item_position(
        &mut self,
        transaction_id: Uuid,
        old_index: usize,
        new_index: usize,
    ) -> ResultEngine<()> {
        let ids = self.group_mut(transaction_id)?;
        let len = ids.len();
        if old_index == 0 || new_index == 0 || old_index >= len || new_index >= len {
            return Err(EngineError::IndexOutOfBounds(format!(
                "move item {old_index} -> {new_index} in transaction {transaction_id} \
                 (valid tuple indices are 1..{len})"
            )));
        }
        let id = ids.remove(old_index);
        ids.insert(new_index, id);
        Ok(())
    }

    pub fn discard_changes(&mut self) {
        self.cur = self.def.clone();
    }

    /// Date and index of `transaction_id` in the current order.
    pub fn locate_transaction(&self, transaction_id: Uuid) -> Option<(NaiveDate, usize)> {
        locate(&self.cur, transaction_id)
    }

    pub fn entry(&self, transaction_id: Uuid) -> Option<&SortItem> {
        let (date, index) = self.locate_transaction(transaction_id)?;
        self.cur.get(&date).and_then(|bucket| bucket.get(index))
    }

    /// Inserts `entry` at `index` of `date`, creating the bucket if needed.
    pub fn insert_transaction(
        &mut self,
        date: NaiveDate,
        index: usize,
        entry: SortItem,
    ) -> ResultEngine<()> {
        let len = self.cur.get(&date).map_or(0, Vec::len);
        if index > len {
            return Err(EngineError::IndexOutOfBounds(format!(
                "insert at {index} in {date} with {len} transactions"
            )));
        }
        self.cur.entry(date).or_default().insert(index, entry);
        Ok(())
    }

    /// Removes the entry of `transaction_id` and returns where it was.
    ///
    /// A bucket left empty is dropped.
    pub fn remove_transaction(
        &mut self,
        transaction_id: Uuid,
    ) -> ResultEngine<(NaiveDate, usize, SortItem)> {
        let (date, index) = self
            .locate_transaction(transaction_id)
            .ok_or_else(|| EngineError::KeyNotFound(transaction_id.to_string()))?;
        let bucket = self
            .cur
            .get_mut(&date)
            .ok_or_else(|| EngineError::KeyNotFound(format!("date {date}")))?;
        let entry = bucket.remove(index);
        if bucket.is_empty() {
            self.cur.remove(&date);
        }
        Ok((date, index, entry))
    }

    /// Turns the single entry of `transaction_id` into a group holding
    /// `sole_item`. Groups are left untouched.
    pub fn promote(&mut self, transaction_id: Uuid, sole_item: Uuid) -> ResultEngine<()> {
        let entry = self.entry_mut(transaction_id)?;
        if let SortItem::Single(id) = *entry {
            *entry = SortItem::Group(vec![id, sole_item]);
        }
        Ok(())
    }

    /// Inserts `item_id` at tuple `index` (1..=len) of a group.
    pub fn insert_item(
        &mut self,
        transaction_id: Uuid,
        index: usize,
        item_id: Uuid,
    ) -> ResultEngine<()> {
        let ids = self.group_mut(transaction_id)?;
        if index == 0 || index > ids.len() {
            return Err(EngineError::IndexOutOfBounds(format!(
                "insert item at {index} in transaction {transaction_id}"
            )));
        }
        ids.insert(index, item_id);
        Ok(())
    }

    /// Removes `item_id` from its group and returns its tuple index.
    ///
    /// A group left with one item becomes a single entry again.
    pub fn remove_item(&mut self, transaction_id: Uuid, item_id: Uuid) -> ResultEngine<usize> {
        let entry = self.entry_mut(transaction_id)?;
        let index = entry
            .tuple_index(item_id)
            .ok_or_else(|| EngineError::KeyNotFound(item_id.to_string()))?;
        let demoted = match entry {
            SortItem::Group(ids) => {
                ids.remove(index);
                (ids.len() == 2).then(|| ids[0])
            }
            SortItem::Single(_) => None,
        };
        if let Some(id) = demoted {
            *entry = SortItem::Single(id);
        }
        Ok(index)
    }

    /// Target `order_position` of the live transactions of every date whose
    /// live order differs from the loaded one. Entries for which
    /// `is_deleted` holds are left out on both sides; the top of a bucket
    /// of `n` live entries gets `n - 1`, the bottom gets 0.
    ///
    /// Dates whose order is untouched are not listed: their transactions
    /// keep the positions they were loaded with, gaps and ties included.
    pub fn transaction_positions(&self, is_deleted: impl Fn(Uuid) -> bool) -> HashMap<Uuid, i64> {
        let live = |bucket: &[SortItem]| -> Vec<Uuid> {
            bucket
                .iter()
                .map(SortItem::transaction_id)
                .filter(|id| !is_deleted(*id))
                .collect()
        };

        let mut positions = HashMap::new();
        for (date, bucket) in &self.cur {
            let current = live(bucket);
            let loaded = live(self.def.get(date).map(Vec::as_slice).unwrap_or(&[]));
            if current == loaded {
                continue;
            }
            let len = current.len();
            for (index, id) in current.into_iter().enumerate() {
                positions.insert(id, (len - 1 - index) as i64);
            }
        }
        positions
    }

    /// Target `order_position` of the live items of every group whose live
    /// item order differs from the loaded one (tuple index minus one, staged
    /// deletions left out). Items of single entries are never listed.
    pub fn item_positions(&self, is_deleted: impl Fn(Uuid) -> bool) -> HashMap<Uuid, i64> {
        let live = |entry: &SortItem| -> Vec<Uuid> {
            entry
                .item_ids()
                .iter()
                .copied()
                .filter(|id| !is_deleted(*id))
                .collect()
        };

        let mut positions = HashMap::new();
        for entry in self.cur.values().flatten() {
            let current = live(entry);
            if current.is_empty() {
                continue;
            }
            let loaded = locate(&self.def, entry.transaction_id())
                .and_then(|(date, index)| self.def.get(&date).and_then(|b| b.get(index)))
                .map(|entry| live(entry))
                .unwrap_or_default();
            if current == loaded {
                continue;
            }
            for (index, id) in current.into_iter().enumerate() {
                positions.insert(id, index as i64);
            }
        }
        positions
    }

    fn entry_mut(&mut self, transaction_id: Uuid) -> ResultEngine<&mut SortItem> {
        let (date, index) = self
            .locate_transaction(transaction_id)
            .ok_or_else(|| EngineError::KeyNotFound(transaction_id.to_string()))?;
        self.cur
            .get_mut(&date)
            .and_then(|bucket| bucket.get_mut(index))
            .ok_or_else(|| EngineError::KeyNotFound(transaction_id.to_string()))
    }

    fn group_mut(&mut self, transaction_id: Uuid) -> ResultEngine<&mut Vec<Uuid>> {
        match self.entry_mut(transaction_id)? {
            SortItem::Group(ids) => Ok(ids),
            SortItem::Single(_) => Err(EngineError::IndexOutOfBounds(format!(
                "transaction {transaction_id} has a single item"
            ))),
        }
    }
}

fn locate(state: &SortOrderState, transaction_id: Uuid) -> Option<(NaiveDate, usize)> {
    state.iter().find_map(|(date, bucket)| {
        bucket
            .iter()
            .position(|entry| entry.transaction_id() == transaction_id)
            .map(|index| (*date, index))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_types::ledger::Item;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn transaction(day: u32, order_position: i64, items: usize) -> Transaction {
        let id = Uuid::new_v4();
        Transaction {
            id,
            date: date(day),
            name: String::new(),
            order_position,
            items: (0..items)
                .map(|position| Item {
                    id: Uuid::new_v4(),
                    transaction_id: id,
                    name: String::new(),
                    amount: "1.00".to_string(),
                    category_id: None,
                    account_id: None,
                    order_position: position as i64,
                })
                .collect(),
        }
    }

    fn ids(bucket: &[SortItem]) -> Vec<Uuid> {
        bucket.iter().map(SortItem::transaction_id).collect()
    }

    #[test]
    fn gen_default_puts_highest_position_on_top() {
        let low = transaction(1, 0, 1);
        let high = transaction(1, 1, 1);
        let other_day = transaction(2, 0, 1);
        let mut order = SortOrder::new();

        order.gen_default(&[high.clone(), low.clone(), other_day.clone()]);

        assert_eq!(ids(order.bucket(date(1))), vec![high.id, low.id]);
        assert_eq!(ids(order.bucket(date(2))), vec![other_day.id]);
        assert_eq!(order.def(), order.cur());
    }

    #[test]
    fn gen_default_reverses_load_order_on_ties() {
        let first = transaction(1, 0, 1);
        let second = transaction(1, 0, 1);
        let mut order = SortOrder::new();

        order.gen_default(&[first.clone(), second.clone()]);

        assert_eq!(ids(order.bucket(date(1))), vec![second.id, first.id]);
    }

    #[test]
    fn gen_default_groups_multi_item_transactions() {
        let mut multi = transaction(1, 0, 3);
        multi.items.reverse();
        let mut order = SortOrder::new();

        order.gen_default(&[multi.clone()]);

        let mut expected = vec![multi.id];
        let mut items = multi.items.clone();
        items.sort_by_key(|item| item.order_position);
        expected.extend(items.iter().map(|item| item.id));
        assert_eq!(order.bucket(date(1)), &[SortItem::Group(expected)]);
    }

    #[test]
    fn moves_keep_every_id_once() {
        let transactions: Vec<_> = (0..5).map(|i| transaction(1, i, 1)).collect();
        let mut order = SortOrder::new();
        order.gen_default(&transactions);
        let before = ids(order.bucket(date(1)));

        order.update_transaction_position(date(1), 0, 4).unwrap();
        order.update_transaction_position(date(1), 3, 1).unwrap();
        order.update_transaction_position(date(1), 2, 2).unwrap();

        let mut after = ids(order.bucket(date(1)));
        assert_ne!(after, before);
        let mut sorted_before = before.clone();
        sorted_before.sort();
        after.sort();
        assert_eq!(after, sorted_before);
    }

    #[test]
    fn item_moves_use_tuple_indices() {
        let multi = transaction(1, 0, 3);
        let mut order = SortOrder::new();
        order.gen_default(&[multi.clone()]);

        assert!(matches!(
            order.update_item_position(multi.id, 0, 1),
            Err(EngineError::IndexOutOfBounds(_))
        ));
        assert!(matches!(
            order.update_item_position(multi.id, 1, 4),
            Err(EngineError::IndexOutOfBounds(_))
        ));

        order.update_item_position(multi.id, 3, 1).unwrap();
        let entry = order.entry(multi.id).unwrap();
        assert_eq!(
            entry.item_ids(),
            &[multi.items[2].id, multi.items[0].id, multi.items[1].id]
        );
    }

    #[test]
    fn out_of_range_move_is_rejected() {
        let mut order = SortOrder::new();
        order.gen_default(&[transaction(1, 0, 1)]);

        assert!(matches!(
            order.update_transaction_position(date(1), 0, 1),
            Err(EngineError::IndexOutOfBounds(_))
        ));
        assert!(matches!(
            order.update_transaction_position(date(9), 0, 0),
            Err(EngineError::KeyNotFound(_))
        ));
    }

    #[test]
    fn discard_restores_default() {
        let transactions: Vec<_> = (0..3).map(|i| transaction(1, i, 1)).collect();
        let mut order = SortOrder::new();
        order.gen_default(&transactions);

        order.update_transaction_position(date(1), 0, 2).unwrap();
        assert_ne!(order.def(), order.cur());

        order.discard_changes();
        assert_eq!(order.def(), order.cur());
    }

    #[test]
    fn remove_item_demotes_group_of_one() {
        let single = transaction(1, 0, 1);
        let sole = single.items[0].id;
        let added = Uuid::new_v4();
        let mut order = SortOrder::new();
        order.gen_default(&[single.clone()]);

        order.promote(single.id, sole).unwrap();
        order.insert_item(single.id, 2, added).unwrap();
        assert_eq!(order.entry(single.id).unwrap().item_ids(), &[sole, added]);

        assert_eq!(order.remove_item(single.id, added).unwrap(), 2);
        assert_eq!(order.entry(single.id), Some(&SortItem::Single(single.id)));
    }

    #[test]
    fn untouched_dates_keep_their_loaded_positions() {
        let sparse = transaction(1, 3, 1);
        let tied = transaction(1, 7, 1);
        let also_tied = transaction(1, 7, 1);
        let multi = transaction(2, 0, 2);
        let mut order = SortOrder::new();
        order.gen_default(&[sparse, tied, also_tied, multi]);

        assert!(order.transaction_positions(|_| false).is_empty());
        assert!(order.item_positions(|_| false).is_empty());
    }

    #[test]
    fn reordered_dates_count_down_from_top() {
        let transactions: Vec<_> = (0..3).map(|i| transaction(1, i * 5, 1)).collect();
        let multi = transaction(2, 0, 3);
        let mut all = transactions.clone();
        all.push(multi.clone());
        let mut order = SortOrder::new();
        order.gen_default(&all);

        // [t2, t1, t0] -> [t0, t2, t1]
        order.update_transaction_position(date(1), 2, 0).unwrap();
        order.update_item_position(multi.id, 3, 1).unwrap();

        let positions = order.transaction_positions(|_| false);
        assert_eq!(positions[&transactions[0].id], 2);
        assert_eq!(positions[&transactions[2].id], 1);
        assert_eq!(positions[&transactions[1].id], 0);
        assert!(!positions.contains_key(&multi.id));

        let items = order.item_positions(|_| false);
        assert_eq!(items[&multi.items[2].id], 0);
        assert_eq!(items[&multi.items[0].id], 1);
        assert_eq!(items[&multi.items[1].id], 2);
        assert!(!items.contains_key(&transactions[0].items[0].id));
    }

    #[test]
    fn staged_deletions_are_left_out_of_positions() {
        let transactions: Vec<_> = (0..3).map(|i| transaction(1, i, 1)).collect();
        let multi = transaction(2, 0, 3);
        let mut all = transactions.clone();
        all.push(multi.clone());
        let mut order = SortOrder::new();
        order.gen_default(&all);
        let deleted = [transactions[1].id, multi.items[0].id];
        let is_deleted = |id: Uuid| deleted.contains(&id);

        assert!(order.transaction_positions(is_deleted).is_empty());
        assert!(order.item_positions(is_deleted).is_empty());

        // [t2, t1, t0] -> [t0, t2, t1], t1 staged for deletion.
        order.update_transaction_position(date(1), 2, 0).unwrap();
        let positions = order.transaction_positions(is_deleted);
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[&transactions[0].id], 1);
        assert_eq!(positions[&transactions[2].id], 0);
    }

    #[test]
    fn removing_last_transaction_drops_bucket() {
        let only = transaction(1, 0, 1);
        let mut order = SortOrder::new();
        order.gen_default(&[only.clone()]);

        let (removed_date, index, entry) = order.remove_transaction(only.id).unwrap();

        assert_eq!((removed_date, index), (date(1), 0));
        assert_eq!(entry, SortItem::Single(only.id));
        assert!(order.cur().is_empty());
        order.insert_transaction(date(1), 0, entry).unwrap();
        assert_eq!(order.def(), order.cur());
    }
}

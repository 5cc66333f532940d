//! Loaded and live copies of the transaction ledger.
//!
//! `original` is what the backend returned on the last load, `current` is
//! what the user sees. Every field write goes through [`RecordStore`] so the
//! pending change trackers always hold exactly the fields that differ from
//! the baseline of their record: the original row, or for a staged creation
//! the blank record it was created as.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use api_types::{
    catalog::{Account, Category},
    ledger::{Item, Transaction},
};
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine,
    fields::{Field, FieldSet, ItemField, TransactionField},
    pending::PendingChanges,
};

/// Everything fetched by a load.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub transactions: Vec<Transaction>,
    pub categories: Vec<Category>,
    pub accounts: Vec<Account>,
}

/// Points at a transaction or at one of its items.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordRef {
    Transaction(Uuid),
    Item { transaction_id: Uuid, item_id: Uuid },
}

impl RecordRef {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Transaction(id) => *id,
            Self::Item { item_id, .. } => *item_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Template {
    Transaction(Transaction),
    Item(Item),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordStore {
    original: Vec<Transaction>,
    current: Vec<Transaction>,
    /// Staged creations, with the blank record each one started as.
    created: BTreeMap<Uuid, Template>,
    deleted: BTreeSet<Uuid>,
    transaction_changes: PendingChanges<TransactionField>,
    item_changes: PendingChanges<ItemField>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces both copies with `transactions` and forgets every pending
    /// change.
    pub fn load(&mut self, transactions: Vec<Transaction>) {
        self.current = transactions.clone();
        self.original = transactions;
        self.clear_tracking();
    }

    /// Resets the live copy to the loaded one.
    pub fn discard(&mut self) {
        self.current = self.original.clone();
        self.clear_tracking();
    }

    fn clear_tracking(&mut self) {
        self.created.clear();
        self.deleted.clear();
        self.transaction_changes.clear();
        self.item_changes.clear();
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.current
    }

    pub fn original_transactions(&self) -> &[Transaction] {
        &self.original
    }

    pub fn transaction(&self, id: Uuid) -> Option<&Transaction> {
        self.current.iter().find(|t| t.id == id)
    }

    pub fn original_transaction(&self, id: Uuid) -> Option<&Transaction> {
        self.original.iter().find(|t| t.id == id)
    }

    pub fn item(&self, item_id: Uuid) -> Option<&Item> {
        self.current
            .iter()
            .flat_map(|t| t.items.iter())
            .find(|item| item.id == item_id)
    }

    pub fn original_item(&self, item_id: Uuid) -> Option<&Item> {
        self.original
            .iter()
            .flat_map(|t| t.items.iter())
            .find(|item| item.id == item_id)
    }

    pub fn transaction_changes(&self) -> &PendingChanges<TransactionField> {
        &self.transaction_changes
    }

    pub fn item_changes(&self) -> &PendingChanges<ItemField> {
        &self.item_changes
    }

    /// `true` when `id` has pending field changes.
    pub fn has_change(&self, id: Uuid) -> bool {
        self.transaction_changes.has_change(id) || self.item_changes.has_change(id)
    }

    pub fn is_pending_creation(&self, id: Uuid) -> bool {
        self.created.contains_key(&id)
    }

    pub fn is_pending_deletion(&self, id: Uuid) -> bool {
        self.deleted.contains(&id)
    }

    pub fn pending_creations(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.created.keys().copied()
    }

    pub fn pending_deletions(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.deleted.iter().copied()
    }

    /// `true` when anything differs from the loaded snapshot, order aside.
    pub fn is_dirty(&self) -> bool {
        !self.created.is_empty()
            || !self.deleted.is_empty()
            || !self.transaction_changes.is_empty()
            || !self.item_changes.is_empty()
    }

    /// Writes `field` into the live transaction and returns the previous value.
    pub fn update_transaction(
        &mut self,
        id: Uuid,
        field: TransactionField,
    ) -> ResultEngine<TransactionField> {
        let key = field.key();
        let baseline = match self.created.get(&id) {
            Some(Template::Transaction(template)) => Some(TransactionField::read(template, key)),
            _ => self
                .original_transaction(id)
                .map(|t| TransactionField::read(t, key)),
        };
        let transaction = self
            .current
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| EngineError::KeyNotFound(id.to_string()))?;
        let previous = TransactionField::read(transaction, key);
        field.write(transaction);

        if baseline.as_ref() == Some(&field) {
            self.transaction_changes.remove(id, key);
        } else {
            self.transaction_changes.set(id, field);
        }
        Ok(previous)
    }

    /// Writes `field` into the live item and returns the previous value.
    pub fn update_item(&mut self, item_id: Uuid, field: ItemField) -> ResultEngine<ItemField> {
        let key = field.key();
        let baseline = match self.created.get(&item_id) {
            Some(Template::Item(template)) => Some(ItemField::read(template, key)),
            _ => self.original_item(item_id).map(|i| ItemField::read(i, key)),
        };
        let item = self
            .current
            .iter_mut()
            .flat_map(|t| t.items.iter_mut())
            .find(|item| item.id == item_id)
            .ok_or_else(|| EngineError::KeyNotFound(item_id.to_string()))?;
        let previous = ItemField::read(item, key);
        field.write(item);

        if baseline.as_ref() == Some(&field) {
            self.item_changes.remove(item_id, key);
        } else {
            self.item_changes.set(item_id, field);
        }
        Ok(previous)
    }

    /// Flags `target` to be deleted on save. Returns `false` when it already
    /// was.
    pub fn stage_delete(&mut self, target: RecordRef) -> ResultEngine<bool> {
        self.ensure_exists(target)?;
        Ok(self.deleted.insert(target.id()))
    }

    /// Clears the deletion flag of `target`. Returns `false` when it was not
    /// flagged.
    pub fn unstage_delete(&mut self, target: RecordRef) -> ResultEngine<bool> {
        self.ensure_exists(target)?;
        Ok(self.deleted.remove(&target.id()))
    }

    fn ensure_exists(&self, target: RecordRef) -> ResultEngine<()> {
        let found = match target {
            RecordRef::Transaction(id) => self.transaction(id).is_some(),
            RecordRef::Item {
                transaction_id,
                item_id,
            } => self
                .transaction(transaction_id)
                .is_some_and(|t| t.items.iter().any(|item| item.id == item_id)),
        };
        if found {
            Ok(())
        } else {
            Err(EngineError::KeyNotFound(target.id().to_string()))
        }
    }

    /// Adds a freshly built transaction (and its items) as staged creations.
    pub fn insert_created_transaction(&mut self, transaction: Transaction) {
        for item in &transaction.items {
            self.created.insert(item.id, Template::Item(item.clone()));
        }
        let mut template = transaction.clone();
        template.items.clear();
        self.created
            .insert(transaction.id, Template::Transaction(template));
        self.current.push(transaction);
    }

    /// Removes a staged transaction creation and returns it as it currently
    /// is.
    pub fn remove_created_transaction(&mut self, id: Uuid) -> ResultEngine<Transaction> {
        if !matches!(self.created.get(&id), Some(Template::Transaction(_))) {
            return Err(EngineError::KeyNotFound(id.to_string()));
        }
        let position = self
            .current
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| EngineError::KeyNotFound(id.to_string()))?;
        let transaction = self.current.remove(position);
        for item in &transaction.items {
            self.forget(item.id);
        }
        self.forget(id);
        self.transaction_changes.remove_owner(id);
        Ok(transaction)
    }

    /// Appends a freshly built item to its transaction as a staged creation.
    pub fn insert_created_item(&mut self, item: Item) -> ResultEngine<()> {
        let transaction = self
            .current
            .iter_mut()
            .find(|t| t.id == item.transaction_id)
            .ok_or_else(|| EngineError::KeyNotFound(item.transaction_id.to_string()))?;
        self.created.insert(item.id, Template::Item(item.clone()));
        transaction.items.push(item);
        Ok(())
    }

    /// Removes a staged item creation and returns it as it currently is.
    pub fn remove_created_item(&mut self, item_id: Uuid) -> ResultEngine<Item> {
        if !matches!(self.created.get(&item_id), Some(Template::Item(_))) {
            return Err(EngineError::KeyNotFound(item_id.to_string()));
        }
        let item = self
            .current
            .iter_mut()
            .find_map(|t| {
                t.items
                    .iter()
                    .position(|item| item.id == item_id)
                    .map(|position| t.items.remove(position))
            })
            .ok_or_else(|| EngineError::KeyNotFound(item_id.to_string()))?;
        self.forget(item_id);
        Ok(item)
    }

    fn forget(&mut self, id: Uuid) {
        self.created.remove(&id);
        self.deleted.remove(&id);
        self.item_changes.remove_owner(id);
    }

    /// Makes the live copy the new baseline after a successful save.
    ///
    /// Deleted records are dropped, temporary ids (including references to
    /// new categories and accounts) are replaced through `ids`, and order
    /// positions are set from the saved order. Records missing from the
    /// position maps keep the position they had.
    pub fn adopt(
        &mut self,
        ids: &HashMap<Uuid, Uuid>,
        transaction_positions: &HashMap<Uuid, i64>,
        item_positions: &HashMap<Uuid, i64>,
    ) {
        let real = |id: Uuid| ids.get(&id).copied().unwrap_or(id);
        let deleted = std::mem::take(&mut self.deleted);

        self.current.retain(|t| !deleted.contains(&t.id));
        for transaction in &mut self.current {
            transaction.items.retain(|item| !deleted.contains(&item.id));
            if let Some(position) = transaction_positions.get(&transaction.id) {
                transaction.order_position = *position;
            }
            for item in &mut transaction.items {
                if let Some(position) = item_positions.get(&item.id) {
                    item.order_position = *position;
                }
                item.id = real(item.id);
                item.transaction_id = real(item.transaction_id);
                item.category_id = item.category_id.map(real);
                item.account_id = item.account_id.map(real);
            }
            transaction.id = real(transaction.id);
        }

        self.original = self.current.clone();
        self.clear_tracking();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{ItemKey, TransactionKey};
    use chrono::NaiveDate;

    fn loaded() -> (RecordStore, Uuid, Uuid) {
        let transaction_id = Uuid::new_v4();
        let item_id = Uuid::new_v4();
        let mut store = RecordStore::new();
        store.load(vec![Transaction {
            id: transaction_id,
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            name: "Groceries".to_string(),
            order_position: 0,
            items: vec![Item {
                id: item_id,
                transaction_id,
                name: "Milk".to_string(),
                amount: "10.00".to_string(),
                category_id: None,
                account_id: None,
                order_position: 0,
            }],
        }]);
        (store, transaction_id, item_id)
    }

    #[test]
    fn returning_to_original_clears_pending_change() {
        let (mut store, _, item_id) = loaded();

        store
            .update_item(item_id, ItemField::Amount("12".into()))
            .unwrap();
        assert!(store.has_change(item_id));

        let previous = store
            .update_item(item_id, ItemField::Amount("10.00".into()))
            .unwrap();
        assert_eq!(previous, ItemField::Amount("12".into()));
        assert!(!store.has_change(item_id));
        assert!(!store.is_dirty());
    }

    #[test]
    fn original_comparison_is_exact() {
        let (mut store, _, item_id) = loaded();

        store
            .update_item(item_id, ItemField::Amount("10".into()))
            .unwrap();

        assert_eq!(
            store.item_changes().get(item_id, ItemKey::Amount),
            Some(&ItemField::Amount("10".into()))
        );
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let (mut store, _, _) = loaded();
        let result = store.update_transaction(Uuid::new_v4(), TransactionField::Name("x".into()));
        assert!(matches!(result, Err(EngineError::KeyNotFound(_))));
    }

    #[test]
    fn staged_deletion_keeps_record() {
        let (mut store, transaction_id, item_id) = loaded();
        let target = RecordRef::Item {
            transaction_id,
            item_id,
        };

        assert!(store.stage_delete(target).unwrap());
        assert!(!store.stage_delete(target).unwrap());
        assert!(store.is_pending_deletion(item_id));
        assert!(store.item(item_id).is_some());

        assert!(store.unstage_delete(target).unwrap());
        assert!(!store.is_dirty());
    }

    #[test]
    fn created_record_compares_against_blank() {
        let (mut store, transaction_id, _) = loaded();
        let item = Item {
            id: Uuid::new_v4(),
            transaction_id,
            name: String::new(),
            amount: String::new(),
            category_id: None,
            account_id: None,
            order_position: 0,
        };
        store.insert_created_item(item.clone()).unwrap();

        store.update_item(item.id, ItemField::Name("Bread".into())).unwrap();
        assert!(store.has_change(item.id));
        store.update_item(item.id, ItemField::Name(String::new())).unwrap();
        assert!(!store.has_change(item.id));

        let removed = store.remove_created_item(item.id).unwrap();
        assert_eq!(removed, item);
        assert!(!store.is_dirty());
    }

    #[test]
    fn discard_restores_original() {
        let (mut store, transaction_id, _) = loaded();
        store
            .update_transaction(transaction_id, TransactionField::Name("Market".into()))
            .unwrap();

        store.discard();

        assert_eq!(store.transactions(), store.original_transactions());
        assert!(
            store
                .transaction_changes()
                .get(transaction_id, TransactionKey::Name)
                .is_none()
        );
    }
}

//! In-process [`Persistence`] implementation.
//!
//! Keeps the rows in memory behind a mutex, records every call it receives
//! and can be told to fail the next call of a given method. Used by the
//! integration tests and by the `memory` backend of the CLI.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use api_types::{
    catalog::{Account, Category, NewAccount, NewCategory},
    ledger::{
        InsertedId, InsertedTransaction, Item, ItemUpsertRow, NewItem, NewTransaction,
        Transaction, TransactionUpsertRow,
    },
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    persistence::{Persistence, PersistenceError, ResultPersistence},
    store::Snapshot,
};

/// A call received by the backend. Batches record their size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    FetchTransactions,
    FetchCategories,
    FetchAccounts,
    InsertItems(usize),
    InsertTransactionAndItems(usize),
    UpsertTransactions(usize),
    UpsertItems(usize),
    DeleteTransaction(Uuid),
    DeleteItem(Uuid),
    InsertCategories(usize),
    InsertAccounts(usize),
    UpsertCategories(usize),
    UpsertAccounts(usize),
    DeleteCategory(Uuid),
    DeleteAccount(Uuid),
}

impl Call {
    /// Name of the [`Persistence`] method.
    pub fn method(&self) -> &'static str {
        match self {
            Self::FetchTransactions => "fetch_transactions",
            Self::FetchCategories => "fetch_categories",
            Self::FetchAccounts => "fetch_accounts",
            Self::InsertItems(_) => "insert_items",
            Self::InsertTransactionAndItems(_) => "insert_transaction_and_items",
            Self::UpsertTransactions(_) => "upsert_transactions",
            Self::UpsertItems(_) => "upsert_items",
            Self::DeleteTransaction(_) => "delete_transaction",
            Self::DeleteItem(_) => "delete_item",
            Self::InsertCategories(_) => "insert_categories",
            Self::InsertAccounts(_) => "insert_accounts",
            Self::UpsertCategories(_) => "upsert_categories",
            Self::UpsertAccounts(_) => "upsert_accounts",
            Self::DeleteCategory(_) => "delete_category",
            Self::DeleteAccount(_) => "delete_account",
        }
    }
}

#[derive(Debug, Default)]
struct State {
    data: Snapshot,
    calls: Vec<Call>,
    failures: HashMap<&'static str, PersistenceError>,
}

impl State {
    /// Logs `call` and returns the failure armed for its method, if any.
    fn enter(&mut self, call: Call) -> ResultPersistence<()> {
        let method = call.method();
        debug!(method, "memory backend call");
        self.calls.push(call);
        match self.failures.remove(method) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn transaction_mut(&mut self, id: Uuid) -> ResultPersistence<&mut Transaction> {
        self.data
            .transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| PersistenceError::Rejected(format!("transaction {id} does not exist")))
    }

    fn take_item(&mut self, id: Uuid) -> Option<Item> {
        self.data.transactions.iter_mut().find_map(|t| {
            t.items
                .iter()
                .position(|item| item.id == id)
                .map(|position| t.items.remove(position))
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(data: Snapshot) -> Self {
        Self {
            state: Mutex::new(State {
                data,
                ..State::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current rows, as a fetch would return them.
    pub fn snapshot(&self) -> Snapshot {
        self.lock().data.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Makes the next call of `method` fail with `error`. The call is still
    /// logged but changes nothing.
    pub fn fail_next(&self, method: &'static str, error: PersistenceError) {
        self.lock().failures.insert(method, error);
    }
}

fn new_item(transaction_id: Uuid, id: Uuid, fields: api_types::ledger::ItemFields) -> Item {
    Item {
        id,
        transaction_id,
        name: fields.name,
        amount: fields.amount,
        category_id: fields.category_id,
        account_id: fields.account_id,
        order_position: 0,
    }
}

impl Persistence for MemoryBackend {
    async fn fetch_transactions(&self) -> ResultPersistence<Vec<Transaction>> {
        let mut state = self.lock();
        state.enter(Call::FetchTransactions)?;
        let mut transactions = state.data.transactions.clone();
        for transaction in &mut transactions {
            transaction.items.sort_by_key(|item| item.order_position);
        }
        Ok(transactions)
    }

    async fn fetch_categories(&self) -> ResultPersistence<Vec<Category>> {
        let mut state = self.lock();
        state.enter(Call::FetchCategories)?;
        Ok(state.data.categories.clone())
    }

    async fn fetch_accounts(&self) -> ResultPersistence<Vec<Account>> {
        let mut state = self.lock();
        state.enter(Call::FetchAccounts)?;
        Ok(state.data.accounts.clone())
    }

    async fn insert_items(&self, items: Vec<NewItem>) -> ResultPersistence<Vec<InsertedId>> {
        let mut state = self.lock();
        state.enter(Call::InsertItems(items.len()))?;
        // Check every parent first so a rejected batch inserts nothing.
        for item in &items {
            state.transaction_mut(item.transaction_id)?;
        }
        let mut inserted = Vec::with_capacity(items.len());
        for item in items {
            let id = Uuid::new_v4();
            state
                .transaction_mut(item.transaction_id)?
                .items
                .push(new_item(item.transaction_id, id, item.fields));
            inserted.push(InsertedId { id });
        }
        Ok(inserted)
    }

    async fn insert_transaction_and_items(
        &self,
        transaction: NewTransaction,
    ) -> ResultPersistence<InsertedTransaction> {
        let mut state = self.lock();
        state.enter(Call::InsertTransactionAndItems(transaction.items.len()))?;
        let id = Uuid::new_v4();
        let items: Vec<Item> = transaction
            .items
            .into_iter()
            .map(|fields| new_item(id, Uuid::new_v4(), fields))
            .collect();
        let item_ids = items.iter().map(|item| item.id).collect();
        state.data.transactions.push(Transaction {
            id,
            date: transaction.date,
            name: transaction.name,
            order_position: 0,
            items,
        });
        Ok(InsertedTransaction { id, item_ids })
    }

    async fn upsert_transactions(&self, rows: Vec<TransactionUpsertRow>) -> ResultPersistence<()> {
        let mut state = self.lock();
        state.enter(Call::UpsertTransactions(rows.len()))?;
        for row in rows {
            match state.data.transactions.iter_mut().find(|t| t.id == row.id) {
                Some(transaction) => {
                    transaction.date = row.date;
                    transaction.name = row.name;
                    transaction.order_position = row.order_position;
                }
                None => state.data.transactions.push(Transaction {
                    id: row.id,
                    date: row.date,
                    name: row.name,
                    order_position: row.order_position,
                    items: Vec::new(),
                }),
            }
        }
        Ok(())
    }

    async fn upsert_items(&self, rows: Vec<ItemUpsertRow>) -> ResultPersistence<()> {
        let mut state = self.lock();
        state.enter(Call::UpsertItems(rows.len()))?;
        for row in &rows {
            state.transaction_mut(row.transaction_id)?;
        }
        for row in rows {
            state.take_item(row.id);
            state.transaction_mut(row.transaction_id)?.items.push(Item {
                id: row.id,
                transaction_id: row.transaction_id,
                name: row.name,
                amount: row.amount,
                category_id: row.category_id,
                account_id: row.account_id,
                order_position: row.order_position,
            });
        }
        Ok(())
    }

    async fn delete_transaction(&self, id: Uuid) -> ResultPersistence<()> {
        let mut state = self.lock();
        state.enter(Call::DeleteTransaction(id))?;
        state.data.transactions.retain(|t| t.id != id);
        Ok(())
    }

    async fn delete_item(&self, id: Uuid) -> ResultPersistence<()> {
        let mut state = self.lock();
        state.enter(Call::DeleteItem(id))?;
        state.take_item(id);
        Ok(())
    }

    async fn insert_categories(&self, rows: Vec<NewCategory>) -> ResultPersistence<Vec<InsertedId>> {
        let mut state = self.lock();
        state.enter(Call::InsertCategories(rows.len()))?;
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            let id = Uuid::new_v4();
            state.data.categories.push(Category {
                id,
                name: row.name,
                order_position: row.order_position,
            });
            inserted.push(InsertedId { id });
        }
        Ok(inserted)
    }

    async fn insert_accounts(&self, rows: Vec<NewAccount>) -> ResultPersistence<Vec<InsertedId>> {
        let mut state = self.lock();
        state.enter(Call::InsertAccounts(rows.len()))?;
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            let id = Uuid::new_v4();
            state.data.accounts.push(Account {
                id,
                name: row.name,
                order_position: row.order_position,
                starting_amount: row.starting_amount,
            });
            inserted.push(InsertedId { id });
        }
        Ok(inserted)
    }

    async fn upsert_categories(&self, rows: Vec<Category>) -> ResultPersistence<()> {
        let mut state = self.lock();
        state.enter(Call::UpsertCategories(rows.len()))?;
        for row in rows {
            upsert_by_id(&mut state.data.categories, row, |c| c.id);
        }
        Ok(())
    }

    async fn upsert_accounts(&self, rows: Vec<Account>) -> ResultPersistence<()> {
        let mut state = self.lock();
        state.enter(Call::UpsertAccounts(rows.len()))?;
        for row in rows {
            upsert_by_id(&mut state.data.accounts, row, |a| a.id);
        }
        Ok(())
    }

    async fn delete_category(&self, id: Uuid) -> ResultPersistence<()> {
        let mut state = self.lock();
        state.enter(Call::DeleteCategory(id))?;
        state.data.categories.retain(|c| c.id != id);
        Ok(())
    }

    async fn delete_account(&self, id: Uuid) -> ResultPersistence<()> {
        let mut state = self.lock();
        state.enter(Call::DeleteAccount(id))?;
        state.data.accounts.retain(|a| a.id != id);
        Ok(())
    }
}

fn upsert_by_id<T>(rows: &mut Vec<T>, row: T, id: impl Fn(&T) -> Uuid) {
    match rows.iter_mut().find(|existing| id(existing) == id(&row)) {
        Some(existing) => *existing = row,
        None => rows.push(row),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_types::ledger::ItemFields;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn armed_failure_fires_once_and_changes_nothing() {
        let backend = MemoryBackend::new();
        backend.fail_next(
            "insert_transaction_and_items",
            PersistenceError::Unavailable("down".into()),
        );
        let new = NewTransaction {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            name: "Rent".into(),
            items: vec![ItemFields::default()],
        };

        let failed = backend.insert_transaction_and_items(new.clone()).await;
        assert_eq!(failed, Err(PersistenceError::Unavailable("down".into())));
        assert!(backend.snapshot().transactions.is_empty());

        let inserted = backend.insert_transaction_and_items(new).await.unwrap();
        let stored = backend.snapshot().transactions;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, inserted.id);
        assert_eq!(stored[0].items[0].id, inserted.item_ids[0]);
        assert_eq!(
            backend.calls(),
            vec![
                Call::InsertTransactionAndItems(1),
                Call::InsertTransactionAndItems(1)
            ]
        );
    }

    #[tokio::test]
    async fn items_need_an_existing_transaction() {
        let backend = MemoryBackend::new();
        let result = backend
            .insert_items(vec![NewItem {
                transaction_id: Uuid::new_v4(),
                fields: ItemFields::default(),
            }])
            .await;

        assert!(matches!(result, Err(PersistenceError::Rejected(_))));
    }
}

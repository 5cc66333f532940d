//! The persistence boundary the engine talks to.
//!
//! Implementations live outside the engine ([`crate::memory::MemoryBackend`]
//! for tests and demos, the REST client crate for the hosted backend). Every
//! method is a single request; the engine never retries.

use std::future::Future;

use api_types::{
    catalog::{Account, Category, NewAccount, NewCategory},
    ledger::{
        InsertedId, InsertedTransaction, ItemUpsertRow, NewItem, NewTransaction, Transaction,
        TransactionUpsertRow,
    },
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// The backend refused the request (constraint, auth, bad row).
    #[error("Request rejected: {0}")]
    Rejected(String),
    /// The backend could not be reached or failed internally.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    /// The backend answered with something the engine cannot read.
    #[error("Malformed response: {0}")]
    Malformed(String),
}

pub type ResultPersistence<T> = Result<T, PersistenceError>;

pub trait Persistence: Send + Sync {
    /// Every transaction with its items embedded.
    fn fetch_transactions(
        &self,
    ) -> impl Future<Output = ResultPersistence<Vec<Transaction>>> + Send;

    fn fetch_categories(&self) -> impl Future<Output = ResultPersistence<Vec<Category>>> + Send;

    fn fetch_accounts(&self) -> impl Future<Output = ResultPersistence<Vec<Account>>> + Send;

    /// Returns the assigned ids in the order of `items`.
    fn insert_items(
        &self,
        items: Vec<NewItem>,
    ) -> impl Future<Output = ResultPersistence<Vec<InsertedId>>> + Send;

    /// Inserts a transaction and its items atomically.
    fn insert_transaction_and_items(
        &self,
        transaction: NewTransaction,
    ) -> impl Future<Output = ResultPersistence<InsertedTransaction>> + Send;

    fn upsert_transactions(
        &self,
        rows: Vec<TransactionUpsertRow>,
    ) -> impl Future<Output = ResultPersistence<()>> + Send;

    fn upsert_items(
        &self,
        rows: Vec<ItemUpsertRow>,
    ) -> impl Future<Output = ResultPersistence<()>> + Send;

    /// Deleting a transaction also deletes its items.
    fn delete_transaction(&self, id: Uuid) -> impl Future<Output = ResultPersistence<()>> + Send;

    fn delete_item(&self, id: Uuid) -> impl Future<Output = ResultPersistence<()>> + Send;

    fn insert_categories(
        &self,
        rows: Vec<NewCategory>,
    ) -> impl Future<Output = ResultPersistence<Vec<InsertedId>>> + Send;

    fn insert_accounts(
        &self,
        rows: Vec<NewAccount>,
    ) -> impl Future<Output = ResultPersistence<Vec<InsertedId>>> + Send;

    fn upsert_categories(
        &self,
        rows: Vec<Category>,
    ) -> impl Future<Output = ResultPersistence<()>> + Send;

    fn upsert_accounts(
        &self,
        rows: Vec<Account>,
    ) -> impl Future<Output = ResultPersistence<()>> + Send;

    fn delete_category(&self, id: Uuid) -> impl Future<Output = ResultPersistence<()>> + Send;

    fn delete_account(&self, id: Uuid) -> impl Future<Output = ResultPersistence<()>> + Send;
}

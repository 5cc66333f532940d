//! Optimistic edit tracking for a personal finance ledger.
//!
//! A [`Session`] holds a loaded snapshot of transactions (with their items),
//! categories and accounts, and lets the user edit, reorder, create and
//! delete records entirely in memory. Every edit is recorded as a minimal
//! field diff against the loaded rows, an order change or a staged
//! creation/deletion, and can be undone and redone. Saving turns the staged
//! state into the smallest batch of persistence calls ([`reconcile`]) and
//! re-baselines the session on success.
//!
//! The backend is abstracted by [`Persistence`]; [`Editor`] runs a session
//! against one.

pub use catalog::{CatalogEditor, CatalogPlan};
pub use editor::Editor;
pub use error::EngineError;
pub use events::{EventEmitter, FocusTarget, ListenerId, SessionEvent};
pub use fields::{
    CatalogField, CatalogKey, CatalogRecord, Field, FieldSet, ItemField, ItemKey,
    TransactionField, TransactionKey,
};
pub use history::{Change, History, HistoryItem, ItemChange, TransactionChange};
pub use money::{Cents, normalize_amount};
pub use pending::PendingChanges;
pub use persistence::{Persistence, PersistenceError, ResultPersistence};
pub use reconcile::{SavePlan, SaveReport};
pub use session::{Placement, Session, Status};
pub use sort_order::{SortItem, SortOrder, SortOrderState};
pub use store::{RecordRef, RecordStore, Snapshot};

mod catalog;
mod editor;
mod error;
mod events;
mod fields;
mod fold;
mod history;
pub mod memory;
mod money;
mod pending;
mod persistence;
pub mod reconcile;
mod session;
mod sort_order;
mod store;

pub type ResultEngine<T> = Result<T, EngineError>;

//! Undo/redo history of discrete edits.
//!
//! The history only stores what happened; applying an entry (or its inverse)
//! is done by the session that owns the records. The timeline is linear: any
//! new edit drops the redo branch.

use api_types::ledger::{Item, Transaction};
use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine,
    fields::{Field, ItemField, ItemKey, TransactionField, TransactionKey},
    store::RecordRef,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change<T> {
    pub old: T,
    pub new: T,
}

impl<T> Change<T> {
    pub fn new(old: T, new: T) -> Self {
        Self { old, new }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionChange {
    /// A date change also moves the transaction to the top of the new date.
    /// `old_index` is where it sat in the old date.
    Date {
        values: Change<NaiveDate>,
        old_index: usize,
    },
    Name(Change<String>),
}

impl TransactionChange {
    /// Pairs two values of the same field. `old_index` is only kept for date
    /// changes.
    pub fn between(
        old: TransactionField,
        new: TransactionField,
        old_index: usize,
    ) -> ResultEngine<Self> {
        Ok(match (old, new) {
            (TransactionField::Date(old), TransactionField::Date(new)) => Self::Date {
                values: Change::new(old, new),
                old_index,
            },
            (TransactionField::Name(old), TransactionField::Name(new)) => {
                Self::Name(Change::new(old, new))
            }
            (old, new) => {
                return Err(EngineError::InvalidField(format!(
                    "cannot pair {:?} with {:?}",
                    old.key(),
                    new.key()
                )));
            }
        })
    }

    pub fn key(&self) -> TransactionKey {
        match self {
            Self::Date { .. } => TransactionKey::Date,
            Self::Name(_) => TransactionKey::Name,
        }
    }

    pub fn old_field(&self) -> TransactionField {
        match self {
            Self::Date { values, .. } => TransactionField::Date(values.old),
            Self::Name(change) => TransactionField::Name(change.old.clone()),
        }
    }

    pub fn new_field(&self) -> TransactionField {
        match self {
            Self::Date { values, .. } => TransactionField::Date(values.new),
            Self::Name(change) => TransactionField::Name(change.new.clone()),
        }
    }

    fn is_noop(&self) -> bool {
        match self {
            Self::Date { values, .. } => values.old == values.new,
            Self::Name(change) => change.old == change.new,
        }
    }

    /// Replaces the `new` side with the one of `newer`. Returns `false`, and
    /// changes nothing, when the two target different keys.
    fn absorb(&mut self, newer: &Self) -> bool {
        match (self, newer) {
            (Self::Date { values, .. }, Self::Date { values: newer, .. }) => {
                values.new = newer.new;
                true
            }
            (Self::Name(change), Self::Name(newer)) => {
                change.new.clone_from(&newer.new);
                true
            }
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemChange {
    Name(Change<String>),
    Amount(Change<String>),
    CategoryId(Change<Option<Uuid>>),
    AccountId(Change<Option<Uuid>>),
}

impl ItemChange {
    /// Pairs two values of the same field.
    pub fn between(old: ItemField, new: ItemField) -> ResultEngine<Self> {
        Ok(match (old, new) {
            (ItemField::Name(old), ItemField::Name(new)) => Self::Name(Change::new(old, new)),
            (ItemField::Amount(old), ItemField::Amount(new)) => {
                Self::Amount(Change::new(old, new))
            }
            (ItemField::CategoryId(old), ItemField::CategoryId(new)) => {
                Self::CategoryId(Change::new(old, new))
            }
            (ItemField::AccountId(old), ItemField::AccountId(new)) => {
                Self::AccountId(Change::new(old, new))
            }
            (old, new) => {
                return Err(EngineError::InvalidField(format!(
                    "cannot pair {:?} with {:?}",
                    old.key(),
                    new.key()
                )));
            }
        })
    }

    pub fn key(&self) -> ItemKey {
        match self {
            Self::Name(_) => ItemKey::Name,
            Self::Amount(_) => ItemKey::Amount,
            Self::CategoryId(_) => ItemKey::CategoryId,
            Self::AccountId(_) => ItemKey::AccountId,
        }
    }

    pub fn old_field(&self) -> ItemField {
        match self {
            Self::Name(change) => ItemField::Name(change.old.clone()),
            Self::Amount(change) => ItemField::Amount(change.old.clone()),
            Self::CategoryId(change) => ItemField::CategoryId(change.old),
            Self::AccountId(change) => ItemField::AccountId(change.old),
        }
    }

    pub fn new_field(&self) -> ItemField {
        match self {
            Self::Name(change) => ItemField::Name(change.new.clone()),
            Self::Amount(change) => ItemField::Amount(change.new.clone()),
            Self::CategoryId(change) => ItemField::CategoryId(change.new),
            Self::AccountId(change) => ItemField::AccountId(change.new),
        }
    }

    fn is_noop(&self) -> bool {
        match self {
            Self::Name(change) | Self::Amount(change) => change.old == change.new,
            Self::CategoryId(change) | Self::AccountId(change) => change.old == change.new,
        }
    }

    fn absorb(&mut self, newer: &Self) -> bool {
        match (self, newer) {
            (Self::Name(change), Self::Name(newer)) | (Self::Amount(change), Self::Amount(newer)) => {
                change.new.clone_from(&newer.new);
                true
            }
            (Self::CategoryId(change), Self::CategoryId(newer))
            | (Self::AccountId(change), Self::AccountId(newer)) => {
                change.new = newer.new;
                true
            }
            _ => false,
        }
    }
}

/// One undoable step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HistoryItem {
    TransactionPositionChange {
        date: NaiveDate,
        old_index: usize,
        new_index: usize,
    },
    /// Indices are tuple indices (the first item is at 1).
    ItemPositionChange {
        transaction_id: Uuid,
        date: NaiveDate,
        old_index: usize,
        new_index: usize,
    },
    TransactionValueChange {
        transaction_id: Uuid,
        change: TransactionChange,
    },
    ItemValueChange {
        transaction_id: Uuid,
        item_id: Uuid,
        change: ItemChange,
    },
    /// A staged transaction creation; `index` is its place in its date.
    TransactionCreated {
        transaction: Transaction,
        index: usize,
    },
    /// A staged item creation; `index` is its tuple index.
    ItemCreated { item: Item, index: usize },
    DeletionStaged { target: RecordRef, staged: bool },
}

impl HistoryItem {
    /// A value change whose coalesced run ended on the value it started from.
    fn is_noop(&self) -> bool {
        match self {
            HistoryItem::TransactionValueChange { change, .. } => change.is_noop(),
            HistoryItem::ItemValueChange { change, .. } => change.is_noop(),
            _ => false,
        }
    }

    /// Coalesces `newer` into `self` when both change the same field of the
    /// same record. Position changes never coalesce.
    fn absorb(&mut self, newer: &HistoryItem) -> bool {
        match (self, newer) {
            (
                HistoryItem::TransactionValueChange {
                    transaction_id,
                    change,
                },
                HistoryItem::TransactionValueChange {
                    transaction_id: newer_id,
                    change: newer_change,
                },
            ) if transaction_id == newer_id => change.absorb(newer_change),
            (
                HistoryItem::ItemValueChange { item_id, change, .. },
                HistoryItem::ItemValueChange {
                    item_id: newer_id,
                    change: newer_change,
                    ..
                },
            ) if item_id == newer_id => change.absorb(newer_change),
            _ => false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct History {
    undo: Vec<HistoryItem>,
    redo: Vec<HistoryItem>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new step and drops the redo branch.
    pub fn add(&mut self, item: HistoryItem) {
        self.undo.push(item);
        self.redo.clear();
    }

    /// Like [`History::add`], but merges into the top entry when it is a value
    /// change of the same field of the same record. The merged entry keeps
    /// its `old` value, and is dropped once it no longer changes anything.
    pub fn upsert(&mut self, item: HistoryItem) {
        if let Some(top) = self.undo.last_mut()
            && top.absorb(&item)
        {
            if top.is_noop() {
                self.undo.pop();
            }
            self.redo.clear();
            return;
        }
        self.add(item);
    }

    /// Pops the most recent step to undo.
    pub fn take_undo(&mut self) -> Option<HistoryItem> {
        self.undo.pop()
    }

    /// Pops the most recently undone step to redo.
    pub fn take_redo(&mut self) -> Option<HistoryItem> {
        self.redo.pop()
    }

    /// Stores a step that has just been undone.
    pub fn push_undone(&mut self, item: HistoryItem) {
        self.redo.push(item);
    }

    /// Stores a step that has just been redone, keeping the redo branch.
    pub fn push_redone(&mut self, item: HistoryItem) {
        self.undo.push(item);
    }

    pub fn clear_redo(&mut self) {
        self.redo.clear();
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Undo stack, oldest first.
    pub fn undo_stack(&self) -> &[HistoryItem] {
        &self.undo
    }

    /// Redo stack, the next step to redo last.
    pub fn redo_stack(&self) -> &[HistoryItem] {
        &self.redo
    }
}

//! Editable fields, one closed sum type per owner kind.
//!
//! A field value carries its own key, so a change can never name a field the
//! owner does not have.

use std::{fmt::Debug, hash::Hash};

use api_types::{
    catalog::{Account, Category, NewAccount, NewCategory},
    ledger::{Item, Transaction},
};
use chrono::NaiveDate;
use uuid::Uuid;

use crate::{ResultEngine, money::normalize_amount};

/// A field value that knows which field it belongs to.
pub trait Field: Clone + Debug + PartialEq {
    type Key: Copy + Debug + Eq + Hash + Ord;

    fn key(&self) -> Self::Key;
}

/// The editable fields of one record type.
pub trait FieldSet: Field {
    type Record;

    /// Reads the field `key` out of `record`.
    fn read(record: &Self::Record, key: Self::Key) -> Self;

    /// Writes this value into `record`.
    fn write(&self, record: &mut Self::Record);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransactionKey {
    Date,
    Name,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionField {
    Date(NaiveDate),
    Name(String),
}

impl Field for TransactionField {
    type Key = TransactionKey;

    fn key(&self) -> TransactionKey {
        match self {
            Self::Date(_) => TransactionKey::Date,
            Self::Name(_) => TransactionKey::Name,
        }
    }
}

impl FieldSet for TransactionField {
    type Record = Transaction;

    fn read(record: &Transaction, key: TransactionKey) -> Self {
        match key {
            TransactionKey::Date => Self::Date(record.date),
            TransactionKey::Name => Self::Name(record.name.clone()),
        }
    }

    fn write(&self, record: &mut Transaction) {
        match self {
            Self::Date(date) => record.date = *date,
            Self::Name(name) => record.name.clone_from(name),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemKey {
    Name,
    Amount,
    CategoryId,
    AccountId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemField {
    Name(String),
    Amount(String),
    /// `None` means "No Category".
    CategoryId(Option<Uuid>),
    /// `None` means "No Account".
    AccountId(Option<Uuid>),
}

impl Field for ItemField {
    type Key = ItemKey;

    fn key(&self) -> ItemKey {
        match self {
            Self::Name(_) => ItemKey::Name,
            Self::Amount(_) => ItemKey::Amount,
            Self::CategoryId(_) => ItemKey::CategoryId,
            Self::AccountId(_) => ItemKey::AccountId,
        }
    }
}

impl FieldSet for ItemField {
    type Record = Item;

    fn read(record: &Item, key: ItemKey) -> Self {
        match key {
            ItemKey::Name => Self::Name(record.name.clone()),
            ItemKey::Amount => Self::Amount(record.amount.clone()),
            ItemKey::CategoryId => Self::CategoryId(record.category_id),
            ItemKey::AccountId => Self::AccountId(record.account_id),
        }
    }

    fn write(&self, record: &mut Item) {
        match self {
            Self::Name(name) => record.name.clone_from(name),
            Self::Amount(amount) => record.amount.clone_from(amount),
            Self::CategoryId(id) => record.category_id = *id,
            Self::AccountId(id) => record.account_id = *id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CatalogKey {
    Name,
    StartingAmount,
}

/// Editable fields of categories and accounts.
///
/// `StartingAmount` only exists on accounts; see [`CatalogRecord`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatalogField {
    Name(String),
    StartingAmount(String),
}

impl Field for CatalogField {
    type Key = CatalogKey;

    fn key(&self) -> CatalogKey {
        match self {
            Self::Name(_) => CatalogKey::Name,
            Self::StartingAmount(_) => CatalogKey::StartingAmount,
        }
    }
}

/// A flat, ordered record edited through a catalog editor.
pub trait CatalogRecord: Clone + Debug + PartialEq {
    /// Label used in logs and error messages.
    const KIND: &'static str;

    /// Insert payload.
    type New: Clone + Debug + PartialEq;

    fn id(&self) -> Uuid;
    fn set_id(&mut self, id: Uuid);
    fn order_position(&self) -> i64;
    fn set_order_position(&mut self, position: i64);

    /// A record with every field empty.
    fn blank(id: Uuid) -> Self;

    fn supports(key: CatalogKey) -> bool;

    /// Returns `None` when the record kind has no such field.
    fn read(&self, key: CatalogKey) -> Option<CatalogField>;

    /// Writes `field`; fields the record kind does not have are ignored.
    fn write(&mut self, field: &CatalogField);

    fn to_new(&self) -> Self::New;

    /// Brings amount fields to the two fractional digits the backend stores.
    fn normalize(&mut self) -> ResultEngine<()> {
        Ok(())
    }
}

impl CatalogRecord for Category {
    const KIND: &'static str = "category";
    type New = NewCategory;

    fn id(&self) -> Uuid {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }

    fn order_position(&self) -> i64 {
        self.order_position
    }

    fn set_order_position(&mut self, position: i64) {
        self.order_position = position;
    }

    fn blank(id: Uuid) -> Self {
        Self {
            id,
            name: String::new(),
            order_position: 0,
        }
    }

    fn supports(key: CatalogKey) -> bool {
        key == CatalogKey::Name
    }

    fn read(&self, key: CatalogKey) -> Option<CatalogField> {
        match key {
            CatalogKey::Name => Some(CatalogField::Name(self.name.clone())),
            CatalogKey::StartingAmount => None,
        }
    }

    fn write(&mut self, field: &CatalogField) {
        if let CatalogField::Name(name) = field {
            self.name.clone_from(name);
        }
    }

    fn to_new(&self) -> NewCategory {
        NewCategory {
            name: self.name.clone(),
            order_position: self.order_position,
        }
    }
}

impl CatalogRecord for Account {
    const KIND: &'static str = "account";
    type New = NewAccount;

    fn id(&self) -> Uuid {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }

    fn order_position(&self) -> i64 {
        self.order_position
    }

    fn set_order_position(&mut self, position: i64) {
        self.order_position = position;
    }

    fn blank(id: Uuid) -> Self {
        Self {
            id,
            name: String::new(),
            order_position: 0,
            starting_amount: String::new(),
        }
    }

    fn supports(_key: CatalogKey) -> bool {
        true
    }

    fn read(&self, key: CatalogKey) -> Option<CatalogField> {
        Some(match key {
            CatalogKey::Name => CatalogField::Name(self.name.clone()),
            CatalogKey::StartingAmount => {
                CatalogField::StartingAmount(self.starting_amount.clone())
            }
        })
    }

    fn write(&mut self, field: &CatalogField) {
        match field {
            CatalogField::Name(name) => self.name.clone_from(name),
            CatalogField::StartingAmount(amount) => self.starting_amount.clone_from(amount),
        }
    }

    fn to_new(&self) -> NewAccount {
        NewAccount {
            name: self.name.clone(),
            order_position: self.order_position,
            starting_amount: self.starting_amount.clone(),
        }
    }

    fn normalize(&mut self) -> ResultEngine<()> {
        self.starting_amount = normalize_amount(&self.starting_amount)?;
        Ok(())
    }
}

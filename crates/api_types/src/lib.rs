use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod ledger {
    use super::*;

    /// A dated ledger entry made of one or more line items.
    ///
    /// Rows are fetched with their items embedded. `order_position` orders
    /// transactions sharing the same `date`: the highest position is shown on
    /// top.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Transaction {
        pub id: Uuid,
        /// Serialized as `YYYY-MM-DD`.
        pub date: NaiveDate,
        pub name: String,
        #[serde(default)]
        pub order_position: i64,
        #[serde(default)]
        pub items: Vec<Item>,
    }

    /// A single line of a [`Transaction`].
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Item {
        pub id: Uuid,
        pub transaction_id: Uuid,
        pub name: String,
        /// Decimal string. The backend stores exactly two fractional digits;
        /// while editing the string is unrestricted.
        pub amount: String,
        pub category_id: Option<Uuid>,
        pub account_id: Option<Uuid>,
        /// Ascending position inside the owning transaction.
        #[serde(default)]
        pub order_position: i64,
    }

    /// Scalar fields of an item as sent on insert.
    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ItemFields {
        pub name: String,
        pub amount: String,
        pub category_id: Option<Uuid>,
        pub account_id: Option<Uuid>,
    }

    /// Insert payload for an item attached to an already persisted transaction.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct NewItem {
        pub transaction_id: Uuid,
        #[serde(flatten)]
        pub fields: ItemFields,
    }

    /// Insert payload for a transaction together with its items.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct NewTransaction {
        pub date: NaiveDate,
        pub name: String,
        pub items: Vec<ItemFields>,
    }

    /// Id assigned by the backend to an inserted row.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct InsertedId {
        pub id: Uuid,
    }

    /// Ids assigned to an inserted transaction and its items, in input order.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct InsertedTransaction {
        pub id: Uuid,
        pub item_ids: Vec<Uuid>,
    }

    /// Full transaction row sent on upsert. `id` is the conflict key.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TransactionUpsertRow {
        pub id: Uuid,
        pub date: NaiveDate,
        pub name: String,
        pub order_position: i64,
    }

    /// Full item row sent on upsert. `id` is the conflict key.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ItemUpsertRow {
        pub id: Uuid,
        pub transaction_id: Uuid,
        pub name: String,
        pub amount: String,
        pub category_id: Option<Uuid>,
        pub account_id: Option<Uuid>,
        pub order_position: i64,
    }
}

pub mod catalog {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Category {
        pub id: Uuid,
        pub name: String,
        #[serde(default)]
        pub order_position: i64,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Account {
        pub id: Uuid,
        pub name: String,
        #[serde(default)]
        pub order_position: i64,
        /// Decimal string with two fractional digits.
        #[serde(default)]
        pub starting_amount: String,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct NewCategory {
        pub name: String,
        pub order_position: i64,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct NewAccount {
        pub name: String,
        pub order_position: i64,
        pub starting_amount: String,
    }
}

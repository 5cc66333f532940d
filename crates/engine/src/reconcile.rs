//! Turns the staged edits of a session into persistence calls.
//!
//! [`plan`] is pure: it reads the record store, the sort order and the
//! catalog editors and lists every row that has to be inserted, upserted or
//! deleted. [`execute`] sends a plan to a [`Persistence`] backend in a fixed
//! order:
//!
//! 1. catalog inserts, then transaction and item inserts, collecting the
//!    temporary id → real id map;
//! 2. temporary ids are replaced everywhere they appear in the remaining
//!    rows;
//! 3. one upsert batch per table, skipped when empty;
//! 4. deletions, items before transactions.
//!
//! The first failing call aborts the rest. The session keeps its trackers
//! untouched in that case, so nothing a failed save did is observed locally.

use std::collections::HashMap;

use api_types::{
    catalog::{Account, Category},
    ledger::{
        InsertedId, Item, ItemFields, ItemUpsertRow, NewItem, NewTransaction,
        TransactionUpsertRow,
    },
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine,
    catalog::{CatalogEditor, CatalogPlan},
    money::normalize_amount,
    persistence::{Persistence, PersistenceError},
    sort_order::SortOrder,
    store::RecordStore,
};

/// A staged transaction creation, sent with its items in one call.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedTransaction {
    pub temp_id: Uuid,
    /// Temporary ids of `payload.items`, in the same order.
    pub item_temp_ids: Vec<Uuid>,
    pub payload: NewTransaction,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SavePlan {
    pub new_transactions: Vec<PlannedTransaction>,
    /// Staged items under persisted transactions, with their temporary id.
    pub new_items: Vec<(Uuid, NewItem)>,
    pub transaction_rows: Vec<TransactionUpsertRow>,
    pub item_rows: Vec<ItemUpsertRow>,
    pub deleted_items: Vec<Uuid>,
    pub deleted_transactions: Vec<Uuid>,
    pub categories: CatalogPlan<Category>,
    pub accounts: CatalogPlan<Account>,
    /// Target positions of the live transactions of reordered dates, keyed
    /// by current id.
    pub transaction_positions: HashMap<Uuid, i64>,
    /// Target positions of the live items of reordered groups, keyed by
    /// current id.
    pub item_positions: HashMap<Uuid, i64>,
}

impl SavePlan {
    pub fn is_empty(&self) -> bool {
        self.new_transactions.is_empty()
            && self.new_items.is_empty()
            && self.transaction_rows.is_empty()
            && self.item_rows.is_empty()
            && self.deleted_items.is_empty()
            && self.deleted_transactions.is_empty()
            && self.categories.is_empty()
            && self.accounts.is_empty()
    }
}

/// Outcome of a successful [`execute`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SaveReport {
    /// Temporary id → id assigned by the backend.
    pub ids: HashMap<Uuid, Uuid>,
    pub inserted: usize,
    pub upserted: usize,
    pub deleted: usize,
}

fn item_fields(item: &Item) -> ResultEngine<ItemFields> {
    Ok(ItemFields {
        name: item.name.clone(),
        amount: normalize_amount(&item.amount)?,
        category_id: item.category_id,
        account_id: item.account_id,
    })
}

fn item_row(item: &Item, order_position: i64) -> ResultEngine<ItemUpsertRow> {
    Ok(ItemUpsertRow {
        id: item.id,
        transaction_id: item.transaction_id,
        name: item.name.clone(),
        amount: normalize_amount(&item.amount)?,
        category_id: item.category_id,
        account_id: item.account_id,
        order_position,
    })
}

/// Lists every call a save has to make.
///
/// Created records take their fields from the live copy, which is their
/// blank template with the pending changes applied. Existing records get a
/// full upsert row when they have pending changes or when their target
/// order position differs from the loaded one. Only dates and groups whose
/// live order changed get target positions; everything else keeps the
/// position it was loaded with.
pub fn plan(
    store: &RecordStore,
    order: &SortOrder,
    categories: &CatalogEditor<Category>,
    accounts: &CatalogEditor<Account>,
) -> ResultEngine<SavePlan> {
    let is_deleted = |id: Uuid| store.is_pending_deletion(id);
    let transaction_positions = order.transaction_positions(is_deleted);
    let item_positions = order.item_positions(is_deleted);
    let mut plan = SavePlan::default();

    for transaction in store.transactions() {
        let id = transaction.id;
        let created = store.is_pending_creation(id);
        if store.is_pending_deletion(id) {
            // Items go with their transaction.
            if !created {
                plan.deleted_transactions.push(id);
            }
            continue;
        }

        let original = store.original_transaction(id);
        let position = transaction_positions
            .get(&id)
            .copied()
            .or(original.map(|t| t.order_position))
            .ok_or_else(|| EngineError::KeyNotFound(format!("sort entry of {id}")))?;
        let moved = original.is_none_or(|original| original.order_position != position);
        if created || moved || store.transaction_changes().has_change(id) {
            plan.transaction_rows.push(TransactionUpsertRow {
                id,
                date: transaction.date,
                name: transaction.name.clone(),
                order_position: position,
            });
        }

        let mut planned = created.then(|| PlannedTransaction {
            temp_id: id,
            item_temp_ids: Vec::new(),
            payload: NewTransaction {
                date: transaction.date,
                name: transaction.name.clone(),
                items: Vec::new(),
            },
        });

        for item in &transaction.items {
            let item_created = store.is_pending_creation(item.id);
            if store.is_pending_deletion(item.id) {
                if !item_created {
                    plan.deleted_items.push(item.id);
                }
                continue;
            }

            let original = store.original_item(item.id);
            let position = item_positions
                .get(&item.id)
                .copied()
                .or(original.map(|i| i.order_position))
                .unwrap_or(0);
            let moved = original.is_none_or(|original| original.order_position != position);
            if item_created || moved || store.item_changes().has_change(item.id) {
                plan.item_rows.push(item_row(item, position)?);
            }

            if let Some(planned) = planned.as_mut() {
                planned.item_temp_ids.push(item.id);
                planned.payload.items.push(item_fields(item)?);
            } else if item_created {
                plan.new_items.push((
                    item.id,
                    NewItem {
                        transaction_id: id,
                        fields: item_fields(item)?,
                    },
                ));
            }
        }

        if let Some(planned) = planned {
            plan.new_transactions.push(planned);
        }
    }

    plan.categories = categories.plan()?;
    plan.accounts = accounts.plan()?;
    plan.transaction_positions = transaction_positions;
    plan.item_positions = item_positions;

    debug!(
        new_transactions = plan.new_transactions.len(),
        new_items = plan.new_items.len(),
        transaction_rows = plan.transaction_rows.len(),
        item_rows = plan.item_rows.len(),
        deleted_transactions = plan.deleted_transactions.len(),
        deleted_items = plan.deleted_items.len(),
        "save planned"
    );
    Ok(plan)
}

fn record_ids(
    ids: &mut HashMap<Uuid, Uuid>,
    temp_ids: &[Uuid],
    inserted: &[InsertedId],
) -> ResultEngine<()> {
    if temp_ids.len() != inserted.len() {
        return Err(PersistenceError::Malformed(format!(
            "expected {} inserted ids, got {}",
            temp_ids.len(),
            inserted.len()
        ))
        .into());
    }
    ids.extend(temp_ids.iter().copied().zip(inserted.iter().map(|row| row.id)));
    Ok(())
}

fn substitute(ids: &HashMap<Uuid, Uuid>, id: &mut Uuid) {
    if let Some(real) = ids.get(id) {
        *id = *real;
    }
}

fn substitute_fields(ids: &HashMap<Uuid, Uuid>, fields: &mut ItemFields) {
    if let Some(id) = fields.category_id.as_mut() {
        substitute(ids, id);
    }
    if let Some(id) = fields.account_id.as_mut() {
        substitute(ids, id);
    }
}

/// Sends `plan` to `backend`. See the module documentation for the order of
/// the calls.
pub async fn execute<P: Persistence>(plan: SavePlan, backend: &P) -> ResultEngine<SaveReport> {
    match run(plan, backend).await {
        Ok(report) => {
            info!(
                inserted = report.inserted,
                upserted = report.upserted,
                deleted = report.deleted,
                "save committed"
            );
            Ok(report)
        }
        Err(error) => {
            warn!(%error, "save aborted");
            Err(error)
        }
    }
}

async fn run<P: Persistence>(plan: SavePlan, backend: &P) -> ResultEngine<SaveReport> {
    let SavePlan {
        new_transactions,
        new_items,
        mut transaction_rows,
        mut item_rows,
        deleted_items,
        deleted_transactions,
        categories,
        accounts,
        ..
    } = plan;
    let mut report = SaveReport::default();

    if !categories.inserts.is_empty() {
        let (temp_ids, rows): (Vec<_>, Vec<_>) = categories.inserts.into_iter().unzip();
        let inserted = backend.insert_categories(rows).await?;
        record_ids(&mut report.ids, &temp_ids, &inserted)?;
        report.inserted += inserted.len();
    }
    if !accounts.inserts.is_empty() {
        let (temp_ids, rows): (Vec<_>, Vec<_>) = accounts.inserts.into_iter().unzip();
        let inserted = backend.insert_accounts(rows).await?;
        record_ids(&mut report.ids, &temp_ids, &inserted)?;
        report.inserted += inserted.len();
    }

    for mut planned in new_transactions {
        for fields in &mut planned.payload.items {
            substitute_fields(&report.ids, fields);
        }
        let inserted = backend.insert_transaction_and_items(planned.payload).await?;
        if inserted.item_ids.len() != planned.item_temp_ids.len() {
            return Err(PersistenceError::Malformed(format!(
                "transaction {} came back with {} items, {} were sent",
                inserted.id,
                inserted.item_ids.len(),
                planned.item_temp_ids.len()
            ))
            .into());
        }
        report.ids.insert(planned.temp_id, inserted.id);
        report
            .ids
            .extend(planned.item_temp_ids.into_iter().zip(inserted.item_ids.iter().copied()));
        report.inserted += 1 + inserted.item_ids.len();
    }

    if !new_items.is_empty() {
        let (temp_ids, mut rows): (Vec<_>, Vec<_>) = new_items.into_iter().unzip();
        for row in &mut rows {
            substitute_fields(&report.ids, &mut row.fields);
        }
        let inserted = backend.insert_items(rows).await?;
        record_ids(&mut report.ids, &temp_ids, &inserted)?;
        report.inserted += inserted.len();
    }

    for row in &mut transaction_rows {
        substitute(&report.ids, &mut row.id);
    }
    for row in &mut item_rows {
        substitute(&report.ids, &mut row.id);
        substitute(&report.ids, &mut row.transaction_id);
        if let Some(id) = row.category_id.as_mut() {
            substitute(&report.ids, id);
        }
        if let Some(id) = row.account_id.as_mut() {
            substitute(&report.ids, id);
        }
    }

    if !transaction_rows.is_empty() {
        report.upserted += transaction_rows.len();
        backend.upsert_transactions(transaction_rows).await?;
    }
    if !item_rows.is_empty() {
        report.upserted += item_rows.len();
        backend.upsert_items(item_rows).await?;
    }
    if !categories.upserts.is_empty() {
        report.upserted += categories.upserts.len();
        backend.upsert_categories(categories.upserts).await?;
    }
    if !accounts.upserts.is_empty() {
        report.upserted += accounts.upserts.len();
        backend.upsert_accounts(accounts.upserts).await?;
    }

    for id in deleted_items {
        backend.delete_item(id).await?;
        report.deleted += 1;
    }
    for id in deleted_transactions {
        backend.delete_transaction(id).await?;
        report.deleted += 1;
    }
    for id in categories.deletions {
        backend.delete_category(id).await?;
        report.deleted += 1;
    }
    for id in accounts.deletions {
        backend.delete_account(id).await?;
        report.deleted += 1;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{ItemField, TransactionField};
    use api_types::ledger::Transaction;
    use chrono::NaiveDate;

    fn item(transaction_id: Uuid, amount: &str, order_position: i64) -> Item {
        Item {
            id: Uuid::new_v4(),
            transaction_id,
            name: String::new(),
            amount: amount.to_string(),
            category_id: None,
            account_id: None,
            order_position,
        }
    }

    fn transaction(order_position: i64, items: usize) -> Transaction {
        let id = Uuid::new_v4();
        Transaction {
            id,
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            name: "Shop".to_string(),
            order_position,
            items: (0..items)
                .map(|position| item(id, "1.00", if items == 1 { 0 } else { position as i64 }))
                .collect(),
        }
    }

    fn loaded(transactions: Vec<Transaction>) -> (RecordStore, SortOrder) {
        let mut store = RecordStore::new();
        let mut order = SortOrder::new();
        order.gen_default(&transactions);
        store.load(transactions);
        (store, order)
    }

    fn plan_of(store: &RecordStore, order: &SortOrder) -> SavePlan {
        plan(store, order, &CatalogEditor::new(), &CatalogEditor::new()).unwrap()
    }

    #[test]
    fn untouched_session_plans_nothing() {
        let (store, order) = loaded(vec![transaction(0, 1), transaction(1, 3)]);
        assert!(plan_of(&store, &order).is_empty());
    }

    #[test]
    fn changed_fields_produce_full_rows() {
        let shop = transaction(0, 1);
        let item_id = shop.items[0].id;
        let (mut store, order) = loaded(vec![shop.clone()]);

        store
            .update_item(item_id, ItemField::Amount("3,5".into()))
            .unwrap();
        store
            .update_transaction(shop.id, TransactionField::Name("Market".into()))
            .unwrap();
        let plan = plan_of(&store, &order);

        assert_eq!(
            plan.transaction_rows,
            vec![TransactionUpsertRow {
                id: shop.id,
                date: shop.date,
                name: "Market".into(),
                order_position: 0,
            }]
        );
        assert_eq!(plan.item_rows.len(), 1);
        assert_eq!(plan.item_rows[0].amount, "3.50");
        assert_eq!(plan.item_rows[0].order_position, 0);
    }

    #[test]
    fn reorder_only_updates_moved_positions() {
        let bottom = transaction(0, 1);
        let middle = transaction(1, 1);
        let top = transaction(2, 1);
        let (store, mut order) = loaded(vec![bottom.clone(), middle.clone(), top.clone()]);

        order
            .update_transaction_position(bottom.date, 0, 1)
            .unwrap();
        let plan = plan_of(&store, &order);

        let positions: Vec<_> = plan
            .transaction_rows
            .iter()
            .map(|row| (row.id, row.order_position))
            .collect();
        assert_eq!(positions, vec![(middle.id, 2), (top.id, 1)]);
        assert!(plan.item_rows.is_empty());
    }

    #[test]
    fn sparse_and_tied_positions_need_no_rows() {
        let (store, order) = loaded(vec![
            transaction(3, 1),
            transaction(7, 1),
            transaction(7, 1),
            transaction(40, 2),
        ]);
        assert!(plan_of(&store, &order).is_empty());
    }

    #[test]
    fn edited_row_keeps_its_loaded_position() {
        let shop = transaction(12, 1);
        let other = transaction(4, 1);
        let (mut store, order) = loaded(vec![shop.clone(), other]);

        store
            .update_transaction(shop.id, TransactionField::Name("Market".into()))
            .unwrap();
        let plan = plan_of(&store, &order);

        assert_eq!(plan.transaction_rows.len(), 1);
        assert_eq!(plan.transaction_rows[0].order_position, 12);
    }

    #[test]
    fn deleting_leaves_the_others_in_place() {
        let bottom = transaction(0, 1);
        let middle = transaction(1, 1);
        let top = transaction(2, 1);
        let (mut store, order) = loaded(vec![bottom, middle.clone(), top]);

        store
            .stage_delete(crate::store::RecordRef::Transaction(middle.id))
            .unwrap();
        let plan = plan_of(&store, &order);

        assert_eq!(plan.deleted_transactions, vec![middle.id]);
        assert!(plan.transaction_rows.is_empty());
    }

    #[test]
    fn invalid_amount_fails_the_plan() {
        let shop = transaction(0, 1);
        let item_id = shop.items[0].id;
        let (mut store, order) = loaded(vec![shop]);

        store
            .update_item(item_id, ItemField::Amount("abc".into()))
            .unwrap();

        let result = plan(&store, &order, &CatalogEditor::new(), &CatalogEditor::new());
        assert!(matches!(result, Err(EngineError::InvalidAmount(_))));
    }

    #[test]
    fn deleted_transaction_takes_its_items_along() {
        let shop = transaction(0, 2);
        let (mut store, order) = loaded(vec![shop.clone()]);

        store
            .update_item(shop.items[0].id, ItemField::Name("x".into()))
            .unwrap();
        store
            .stage_delete(crate::store::RecordRef::Transaction(shop.id))
            .unwrap();
        let plan = plan_of(&store, &order);

        assert_eq!(plan.deleted_transactions, vec![shop.id]);
        assert!(plan.deleted_items.is_empty());
        assert!(plan.item_rows.is_empty());
        assert!(plan.transaction_rows.is_empty());
    }
}

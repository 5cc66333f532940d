//! The editing session: one loaded ledger plus everything staged on it.
//!
//! All methods are synchronous. Network work is bracketed by
//! [`Session::begin_reload`] / [`Session::finish_reload`] and
//! [`Session::begin_save`] / [`Session::finish_save`], so the session is never
//! borrowed across an await; see [`crate::Editor`] for the async driver.

use api_types::{
    catalog::{Account, Category},
    ledger::{Item, Transaction},
};
use chrono::NaiveDate;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine,
    catalog::CatalogEditor,
    events::{EventEmitter, FocusTarget, ListenerId, SessionEvent},
    fields::{Field, ItemField, ItemKey, TransactionField, TransactionKey},
    fold::FoldState,
    history::{History, HistoryItem, ItemChange, TransactionChange},
    money::Cents,
    persistence::PersistenceError,
    reconcile::{self, SavePlan, SaveReport},
    sort_order::{SortItem, SortOrder},
    store::{RecordRef, RecordStore, Snapshot},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Idle,
    Loading,
    Saving,
}

/// Where a new item goes relative to the item it is created from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    Above,
    Below,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

#[derive(Debug, Default)]
pub struct Session {
    status: Status,
    store: RecordStore,
    order: SortOrder,
    fold: FoldState,
    history: History,
    categories: CatalogEditor<Category>,
    accounts: CatalogEditor<Account>,
    events: EventEmitter<SessionEvent>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn on_event(&mut self, callback: impl FnMut(&SessionEvent) + 'static) -> ListenerId {
        self.events.on(callback)
    }

    pub fn off_event(&mut self, id: ListenerId) {
        self.events.off(id);
    }

    fn conflict(&self, action: &str) -> EngineError {
        warn!(status = ?self.status, action, "rejected by session state");
        EngineError::StateConflict(format!("cannot {action} while {:?}", self.status))
    }

    fn ensure_editable(&self) -> ResultEngine<()> {
        if self.status == Status::Saving {
            return Err(self.conflict("edit"));
        }
        Ok(())
    }

    // Loading

    /// Replaces everything with `snapshot` and forgets all staged work.
    pub fn load(&mut self, snapshot: Snapshot) {
        self.order.gen_default(&snapshot.transactions);
        self.store.load(snapshot.transactions);
        self.categories.load(snapshot.categories);
        self.accounts.load(snapshot.accounts);
        self.fold.regenerate();
        self.history.clear();
    }

    pub fn begin_reload(&mut self) -> ResultEngine<()> {
        if self.status != Status::Idle {
            return Err(self.conflict("reload"));
        }
        self.status = Status::Loading;
        Ok(())
    }

    /// Completes a reload started with [`Session::begin_reload`]. On error the
    /// session keeps its previous state.
    pub fn finish_reload(&mut self, result: Result<Snapshot, PersistenceError>) -> ResultEngine<()> {
        if self.status != Status::Loading {
            return Err(self.conflict("finish a reload"));
        }
        self.status = Status::Idle;
        match result {
            Ok(snapshot) => {
                let transactions = snapshot.transactions.len();
                self.load(snapshot);
                info!(transactions, "session reloaded");
                self.events.emit(&SessionEvent::Reloaded);
                Ok(())
            }
            Err(error) => {
                warn!(%error, "reload failed");
                Err(error.into())
            }
        }
    }

    // Saving

    /// Plans the save and locks the session against edits until
    /// [`Session::finish_save`] or [`Session::abort_save`].
    pub fn begin_save(&mut self) -> ResultEngine<SavePlan> {
        if self.status != Status::Idle {
            return Err(self.conflict("save"));
        }
        let plan = reconcile::plan(&self.store, &self.order, &self.categories, &self.accounts)?;
        self.status = Status::Saving;
        Ok(plan)
    }

    /// Completes a save. On success the live copy becomes the new baseline
    /// with temporary ids replaced; on error nothing changes.
    pub fn finish_save(&mut self, result: ResultEngine<SaveReport>) -> ResultEngine<SaveReport> {
        if self.status != Status::Saving {
            return Err(self.conflict("finish a save"));
        }
        self.status = Status::Idle;
        let report = result?;

        let is_deleted = |id: Uuid| self.store.is_pending_deletion(id);
        let transaction_positions = self.order.transaction_positions(is_deleted);
        let item_positions = self.order.item_positions(is_deleted);
        self.store
            .adopt(&report.ids, &transaction_positions, &item_positions);
        self.categories.adopt(&report.ids);
        self.accounts.adopt(&report.ids);
        self.order.gen_default(self.store.transactions());
        self.fold.regenerate();
        self.history.clear();

        self.events.emit(&SessionEvent::Saved {
            inserted: report.inserted,
        });
        Ok(report)
    }

    /// Unlocks a session whose save never completed. Trackers are kept.
    pub fn abort_save(&mut self) {
        if self.status == Status::Saving {
            warn!("save aborted before completion");
            self.status = Status::Idle;
        }
    }

    /// Unlocks a session whose reload never completed (the fetch was
    /// dropped). The previously loaded state and every tracker are kept.
    pub fn abort_reload(&mut self) {
        if self.status == Status::Loading {
            warn!("reload aborted before completion");
            self.status = Status::Idle;
        }
    }

    /// Drops every staged edit.
    pub fn discard(&mut self) -> ResultEngine<()> {
        self.ensure_editable()?;
        self.store.discard();
        self.order.discard_changes();
        self.categories.discard();
        self.accounts.discard();
        self.history.clear();
        debug!("staged edits discarded");
        self.events.emit(&SessionEvent::Discarded);
        Ok(())
    }

    // Views

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn sort_order(&self) -> &SortOrder {
        &self.order
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn transaction(&self, id: Uuid) -> Option<&Transaction> {
        self.store.transaction(id)
    }

    pub fn item(&self, id: Uuid) -> Option<&Item> {
        self.store.item(id)
    }

    /// Live transactions, newest date first, each date in display order.
    pub fn ordered_transactions(&self) -> Vec<&Transaction> {
        self.order
            .cur()
            .values()
            .rev()
            .flatten()
            .filter_map(|entry| self.store.transaction(entry.transaction_id()))
            .collect()
    }

    /// Items of `transaction_id` in display order.
    pub fn ordered_items(&self, transaction_id: Uuid) -> Vec<&Item> {
        match self.order.entry(transaction_id) {
            Some(entry @ SortItem::Group(_)) => entry
                .item_ids()
                .iter()
                .filter_map(|id| self.store.item(*id))
                .collect(),
            _ => self
                .store
                .transaction(transaction_id)
                .map(|t| t.items.iter().collect())
                .unwrap_or_default(),
        }
    }

    /// Sum of the live item amounts, staged deletions and empty amounts left
    /// out. A sum that does not fit is an [`EngineError::InvalidAmount`].
    pub fn transaction_total(&self, transaction_id: Uuid) -> ResultEngine<Cents> {
        let transaction = self
            .store
            .transaction(transaction_id)
            .ok_or_else(|| EngineError::KeyNotFound(transaction_id.to_string()))?;
        transaction
            .items
            .iter()
            .filter(|item| !self.store.is_pending_deletion(item.id))
            .filter(|item| !item.amount.trim().is_empty())
            .try_fold(Cents::ZERO, |total, item| {
                total
                    .checked_add(item.amount.parse::<Cents>()?)
                    .ok_or_else(|| EngineError::InvalidAmount("amount too large".to_string()))
            })
    }

    pub fn is_dirty(&self) -> bool {
        self.store.is_dirty()
            || self.order.cur() != self.order.def()
            || self.categories.is_dirty()
            || self.accounts.is_dirty()
    }

    pub fn is_folded(&self, transaction_id: Uuid) -> bool {
        self.fold.is_folded(self.order.cur(), transaction_id)
    }

    /// Returns whether the transaction is now expanded.
    pub fn toggle_fold(&mut self, transaction_id: Uuid) -> bool {
        self.fold.toggle(transaction_id)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn categories(&self) -> &CatalogEditor<Category> {
        &self.categories
    }

    pub fn accounts(&self) -> &CatalogEditor<Account> {
        &self.accounts
    }

    pub fn categories_mut(&mut self) -> ResultEngine<&mut CatalogEditor<Category>> {
        self.ensure_editable()?;
        Ok(&mut self.categories)
    }

    pub fn accounts_mut(&mut self) -> ResultEngine<&mut CatalogEditor<Account>> {
        self.ensure_editable()?;
        Ok(&mut self.accounts)
    }

    // Edits

    /// Writes a transaction field. A new date moves the transaction to the
    /// top of that date. Consecutive writes to the same field coalesce into
    /// one history step.
    pub fn update_transaction(&mut self, id: Uuid, field: TransactionField) -> ResultEngine<()> {
        self.ensure_editable()?;
        let new = field.clone();
        let (previous, old_index) = self.write_transaction_field(id, field, None)?;
        if previous == new {
            return Ok(());
        }
        debug!(%id, key = ?new.key(), "transaction field updated");
        let change = TransactionChange::between(previous, new, old_index)?;
        self.history.upsert(HistoryItem::TransactionValueChange {
            transaction_id: id,
            change,
        });
        Ok(())
    }

    /// Writes an item field. Consecutive writes to the same field coalesce
    /// into one history step.
    pub fn update_item(&mut self, item_id: Uuid, field: ItemField) -> ResultEngine<()> {
        self.ensure_editable()?;
        let transaction_id = self
            .store
            .item(item_id)
            .map(|item| item.transaction_id)
            .ok_or_else(|| EngineError::KeyNotFound(item_id.to_string()))?;
        let new = field.clone();
        let previous = self.store.update_item(item_id, field)?;
        if previous == new {
            return Ok(());
        }
        debug!(%item_id, key = ?new.key(), "item field updated");
        let change = ItemChange::between(previous, new)?;
        self.history.upsert(HistoryItem::ItemValueChange {
            transaction_id,
            item_id,
            change,
        });
        Ok(())
    }

    pub fn move_transaction(
        &mut self,
        date: NaiveDate,
        old_index: usize,
        new_index: usize,
    ) -> ResultEngine<()> {
        self.ensure_editable()?;
        let transaction_id = self.move_transaction_entry(date, old_index, new_index)?;
        if old_index != new_index {
            self.history.add(HistoryItem::TransactionPositionChange {
                date,
                old_index,
                new_index,
            });
        }
        self.events.emit(&SessionEvent::Reordered {
            transaction_id,
            item_id: None,
        });
        Ok(())
    }

    /// Moves an item inside its transaction. Indices are tuple indices, the
    /// first item being at 1.
    pub fn move_item(
        &mut self,
        transaction_id: Uuid,
        old_index: usize,
        new_index: usize,
    ) -> ResultEngine<()> {
        self.ensure_editable()?;
        let item_id = self.move_item_entry(transaction_id, old_index, new_index)?;
        let (date, _) = self
            .order
            .locate_transaction(transaction_id)
            .ok_or_else(|| EngineError::KeyNotFound(transaction_id.to_string()))?;
        if old_index != new_index {
            self.history.add(HistoryItem::ItemPositionChange {
                transaction_id,
                date,
                old_index,
                new_index,
            });
        }
        self.events.emit(&SessionEvent::Reordered {
            transaction_id,
            item_id: Some(item_id),
        });
        Ok(())
    }

    /// Stages a blank transaction with one blank item at `index` of `date`
    /// and returns its temporary id.
    pub fn create_transaction(&mut self, date: NaiveDate, index: usize) -> ResultEngine<Uuid> {
        self.ensure_editable()?;
        let id = Uuid::new_v4();
        let transaction = Transaction {
            id,
            date,
            name: String::new(),
            order_position: 0,
            items: vec![blank_item(id)],
        };
        self.insert_transaction(transaction.clone(), index)?;
        debug!(%id, %date, index, "transaction staged");
        self.history
            .add(HistoryItem::TransactionCreated { transaction, index });
        Ok(id)
    }

    /// Stages a blank item next to `reference_item` and returns its temporary
    /// id. The transaction is unfolded.
    pub fn create_item(
        &mut self,
        transaction_id: Uuid,
        reference_item: Uuid,
        placement: Placement,
    ) -> ResultEngine<Uuid> {
        self.ensure_editable()?;
        let entry = self
            .order
            .entry(transaction_id)
            .ok_or_else(|| EngineError::KeyNotFound(transaction_id.to_string()))?;
        let reference = match entry {
            SortItem::Group(_) => entry.tuple_index(reference_item),
            SortItem::Single(_) => self
                .store
                .transaction(transaction_id)
                .filter(|t| t.items.iter().any(|item| item.id == reference_item))
                .map(|_| 1),
        }
        .ok_or_else(|| EngineError::KeyNotFound(reference_item.to_string()))?;
        let index = match placement {
            Placement::Above => reference,
            Placement::Below => reference + 1,
        };

        let item = blank_item(transaction_id);
        let id = item.id;
        self.insert_item(item.clone(), index)?;
        debug!(%id, %transaction_id, index, "item staged");
        self.history.add(HistoryItem::ItemCreated { item, index });
        Ok(id)
    }

    /// Flags a transaction or item for deletion on save. Returns `false`
    /// when it already was.
    pub fn stage_delete(&mut self, target: RecordRef) -> ResultEngine<bool> {
        self.set_deletion(target, true)
    }

    /// Returns `false` when `target` was not flagged.
    pub fn unstage_delete(&mut self, target: RecordRef) -> ResultEngine<bool> {
        self.set_deletion(target, false)
    }

    fn set_deletion(&mut self, target: RecordRef, staged: bool) -> ResultEngine<bool> {
        self.ensure_editable()?;
        let changed = self.write_deletion(target, staged)?;
        if changed {
            debug!(id = %target.id(), staged, "deletion flag changed");
            self.history.add(HistoryItem::DeletionStaged { target, staged });
        }
        Ok(changed)
    }

    // History

    /// Reverts the latest step. Returns where focus should go, or `None`
    /// when there is nothing to undo.
    pub fn undo(&mut self) -> ResultEngine<Option<FocusTarget>> {
        self.ensure_editable()?;
        let Some(step) = self.history.take_undo() else {
            return Ok(None);
        };
        match self.replay(&step, Direction::Undo) {
            Ok(focus) => {
                self.history.push_undone(step);
                self.events.emit(&SessionEvent::Focus(focus));
                Ok(Some(focus))
            }
            Err(error) => {
                self.history.push_redone(step);
                Err(error)
            }
        }
    }

    /// Reapplies the latest undone step.
    pub fn redo(&mut self) -> ResultEngine<Option<FocusTarget>> {
        self.ensure_editable()?;
        let Some(step) = self.history.take_redo() else {
            return Ok(None);
        };
        match self.replay(&step, Direction::Redo) {
            Ok(focus) => {
                self.history.push_redone(step);
                self.events.emit(&SessionEvent::Focus(focus));
                Ok(Some(focus))
            }
            Err(error) => {
                self.history.push_undone(step);
                Err(error)
            }
        }
    }

    fn replay(&mut self, step: &HistoryItem, direction: Direction) -> ResultEngine<FocusTarget> {
        let undo = direction == Direction::Undo;
        match step {
            HistoryItem::TransactionPositionChange {
                date,
                old_index,
                new_index,
            } => {
                let (from, to) = if undo {
                    (*new_index, *old_index)
                } else {
                    (*old_index, *new_index)
                };
                let transaction_id = self.move_transaction_entry(*date, from, to)?;
                Ok(FocusTarget::Transaction(transaction_id))
            }
            HistoryItem::ItemPositionChange {
                transaction_id,
                old_index,
                new_index,
                ..
            } => {
                let (from, to) = if undo {
                    (*new_index, *old_index)
                } else {
                    (*old_index, *new_index)
                };
                let item_id = self.move_item_entry(*transaction_id, from, to)?;
                Ok(FocusTarget::Item {
                    transaction_id: *transaction_id,
                    item_id,
                })
            }
            HistoryItem::TransactionValueChange {
                transaction_id,
                change,
            } => {
                let (field, index) = match (undo, change) {
                    (true, TransactionChange::Date { old_index, .. }) => {
                        (change.old_field(), Some(*old_index))
                    }
                    (true, _) => (change.old_field(), None),
                    (false, _) => (change.new_field(), None),
                };
                self.write_transaction_field(*transaction_id, field, index)?;
                Ok(FocusTarget::TransactionField {
                    transaction_id: *transaction_id,
                    key: change.key(),
                })
            }
            HistoryItem::ItemValueChange {
                transaction_id,
                item_id,
                change,
            } => {
                let field = if undo {
                    change.old_field()
                } else {
                    change.new_field()
                };
                self.store.update_item(*item_id, field)?;
                Ok(FocusTarget::ItemField {
                    transaction_id: *transaction_id,
                    item_id: *item_id,
                    key: change.key(),
                })
            }
            HistoryItem::TransactionCreated { transaction, index } => {
                if undo {
                    let (date, index) = self.remove_transaction(transaction.id)?;
                    let bucket = self.order.bucket(date);
                    let neighbour = bucket
                        .get(index)
                        .or_else(|| index.checked_sub(1).and_then(|i| bucket.get(i)))
                        .map_or(transaction.id, SortItem::transaction_id);
                    Ok(FocusTarget::Transaction(neighbour))
                } else {
                    self.insert_transaction(transaction.clone(), *index)?;
                    Ok(FocusTarget::TransactionField {
                        transaction_id: transaction.id,
                        key: TransactionKey::Name,
                    })
                }
            }
            HistoryItem::ItemCreated { item, index } => {
                if undo {
                    self.remove_item(item.transaction_id, item.id)?;
                    Ok(FocusTarget::Transaction(item.transaction_id))
                } else {
                    self.insert_item(item.clone(), *index)?;
                    Ok(FocusTarget::ItemField {
                        transaction_id: item.transaction_id,
                        item_id: item.id,
                        key: ItemKey::Name,
                    })
                }
            }
            HistoryItem::DeletionStaged { target, staged } => {
                self.write_deletion(*target, *staged != undo)?;
                Ok(match *target {
                    RecordRef::Transaction(id) => FocusTarget::Transaction(id),
                    RecordRef::Item {
                        transaction_id,
                        item_id,
                    } => FocusTarget::Item {
                        transaction_id,
                        item_id,
                    },
                })
            }
        }
    }

    // Edit paths shared by user edits and history replay. None of them
    // touches the history.

    /// Writes `field` and, for a new date, moves the transaction to `index`
    /// (the top when `None`) of that date. Returns the previous value and the
    /// index the transaction had before.
    fn write_transaction_field(
        &mut self,
        id: Uuid,
        field: TransactionField,
        index: Option<usize>,
    ) -> ResultEngine<(TransactionField, usize)> {
        let (date, old_index) = self
            .order
            .locate_transaction(id)
            .ok_or_else(|| EngineError::KeyNotFound(id.to_string()))?;
        let relocation = match &field {
            TransactionField::Date(new_date) if *new_date != date => {
                let target = index.unwrap_or(0);
                let len = self.order.bucket(*new_date).len();
                if target > len {
                    return Err(EngineError::IndexOutOfBounds(format!(
                        "insert at {target} in {new_date} with {len} transactions"
                    )));
                }
                Some((*new_date, target))
            }
            _ => None,
        };

        let previous = self.store.update_transaction(id, field)?;
        if let Some((new_date, target)) = relocation {
            let (_, _, entry) = self.order.remove_transaction(id)?;
            self.order.insert_transaction(new_date, target, entry)?;
        }
        Ok((previous, old_index))
    }

    fn move_transaction_entry(
        &mut self,
        date: NaiveDate,
        old_index: usize,
        new_index: usize,
    ) -> ResultEngine<Uuid> {
        self.order
            .update_transaction_position(date, old_index, new_index)?;
        self.order
            .bucket(date)
            .get(new_index)
            .map(SortItem::transaction_id)
            .ok_or_else(|| EngineError::IndexOutOfBounds(format!("{new_index} in {date}")))
    }

    fn move_item_entry(
        &mut self,
        transaction_id: Uuid,
        old_index: usize,
        new_index: usize,
    ) -> ResultEngine<Uuid> {
        self.order
            .update_item_position(transaction_id, old_index, new_index)?;
        self.order
            .entry(transaction_id)
            .and_then(|entry| entry.item_ids().get(new_index - 1).copied())
            .ok_or_else(|| EngineError::IndexOutOfBounds(format!("item {new_index}")))
    }

    fn write_deletion(&mut self, target: RecordRef, staged: bool) -> ResultEngine<bool> {
        if staged {
            self.store.stage_delete(target)
        } else {
            self.store.unstage_delete(target)
        }
    }

    fn insert_transaction(&mut self, transaction: Transaction, index: usize) -> ResultEngine<()> {
        let entry = if transaction.items.len() > 1 {
            let mut ids = Vec::with_capacity(transaction.items.len() + 1);
            ids.push(transaction.id);
            ids.extend(transaction.items.iter().map(|item| item.id));
            SortItem::Group(ids)
        } else {
            SortItem::Single(transaction.id)
        };
        self.order
            .insert_transaction(transaction.date, index, entry)?;
        self.store.insert_created_transaction(transaction);
        Ok(())
    }

    /// Returns the date and index the transaction was at.
    fn remove_transaction(&mut self, id: Uuid) -> ResultEngine<(NaiveDate, usize)> {
        if !self.store.is_pending_creation(id) {
            return Err(EngineError::KeyNotFound(id.to_string()));
        }
        let (date, index, _) = self.order.remove_transaction(id)?;
        self.store.remove_created_transaction(id)?;
        Ok((date, index))
    }

    /// Inserts `item` at tuple `index`, turning a single entry into a group
    /// when the transaction already has an item.
    fn insert_item(&mut self, item: Item, index: usize) -> ResultEngine<()> {
        let transaction_id = item.transaction_id;
        let entry = self
            .order
            .entry(transaction_id)
            .ok_or_else(|| EngineError::KeyNotFound(transaction_id.to_string()))?;
        let sole = match entry {
            SortItem::Single(_) => self
                .store
                .transaction(transaction_id)
                .and_then(|t| t.items.first())
                .map(|existing| existing.id),
            SortItem::Group(_) => None,
        };
        let max = match entry {
            SortItem::Group(ids) => ids.len(),
            SortItem::Single(_) if sole.is_some() => 2,
            SortItem::Single(_) => 1,
        };
        if index == 0 || index > max {
            return Err(EngineError::IndexOutOfBounds(format!(
                "insert item at {index} in transaction {transaction_id}"
            )));
        }
        let grouped = matches!(entry, SortItem::Group(_));

        if let Some(sole) = sole {
            self.order.promote(transaction_id, sole)?;
        }
        if grouped || sole.is_some() {
            self.order.insert_item(transaction_id, index, item.id)?;
        }
        self.store.insert_created_item(item)?;
        self.fold.expand(transaction_id);
        Ok(())
    }

    fn remove_item(&mut self, transaction_id: Uuid, item_id: Uuid) -> ResultEngine<()> {
        if !self.store.is_pending_creation(item_id) {
            return Err(EngineError::KeyNotFound(item_id.to_string()));
        }
        if let Some(SortItem::Group(_)) = self.order.entry(transaction_id) {
            self.order.remove_item(transaction_id, item_id)?;
        }
        self.store.remove_created_item(item_id)?;
        Ok(())
    }
}

fn blank_item(transaction_id: Uuid) -> Item {
    Item {
        id: Uuid::new_v4(),
        transaction_id,
        name: String::new(),
        amount: String::new(),
        category_id: None,
        account_id: None,
        order_position: 0,
    }
}

//! Editors for the flat, ordered catalog lists (categories and accounts).
//!
//! Catalog edits follow the same optimistic model as the ledger: the live
//! list is edited in memory, field diffs against the loaded rows are kept
//! minimal, and [`CatalogEditor::plan`] turns the edits into the rows to
//! insert, upsert and delete. They are not part of the undo history.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine,
    fields::{CatalogField, CatalogRecord, Field},
    pending::PendingChanges,
};

/// What saving a catalog has to send.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogPlan<R: CatalogRecord> {
    /// Staged creations with their temporary id, in list order.
    pub inserts: Vec<(Uuid, R::New)>,
    pub upserts: Vec<R>,
    pub deletions: Vec<Uuid>,
}

impl<R: CatalogRecord> CatalogPlan<R> {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.upserts.is_empty() && self.deletions.is_empty()
    }
}

impl<R: CatalogRecord> Default for CatalogPlan<R> {
    fn default() -> Self {
        Self {
            inserts: Vec::new(),
            upserts: Vec::new(),
            deletions: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatalogEditor<R: CatalogRecord> {
    original: Vec<R>,
    current: Vec<R>,
    created: BTreeSet<Uuid>,
    deleted: BTreeSet<Uuid>,
    changes: PendingChanges<CatalogField>,
}

impl<R: CatalogRecord> Default for CatalogEditor<R> {
    fn default() -> Self {
        Self {
            original: Vec::new(),
            current: Vec::new(),
            created: BTreeSet::new(),
            deleted: BTreeSet::new(),
            changes: PendingChanges::new(),
        }
    }
}

impl<R: CatalogRecord> CatalogEditor<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the list, ordered by ascending `order_position` (ties keep
    /// load order), and forgets every pending change.
    pub fn load(&mut self, mut records: Vec<R>) {
        records.sort_by_key(|r| r.order_position());
        self.current = records.clone();
        self.original = records;
        self.clear_tracking();
    }

    pub fn discard(&mut self) {
        self.current = self.original.clone();
        self.clear_tracking();
    }

    fn clear_tracking(&mut self) {
        self.created.clear();
        self.deleted.clear();
        self.changes.clear();
    }

    /// Live records in display order.
    pub fn records(&self) -> &[R] {
        &self.current
    }

    pub fn record(&self, id: Uuid) -> Option<&R> {
        self.current.iter().find(|r| r.id() == id)
    }

    pub fn changes(&self) -> &PendingChanges<CatalogField> {
        &self.changes
    }

    pub fn is_pending_creation(&self, id: Uuid) -> bool {
        self.created.contains(&id)
    }

    pub fn is_pending_deletion(&self, id: Uuid) -> bool {
        self.deleted.contains(&id)
    }

    /// `true` when a save would send anything. Positions that only differ
    /// because the loaded ones were not contiguous do not count.
    pub fn is_dirty(&self) -> bool {
        !self.created.is_empty()
            || !self.deleted.is_empty()
            || !self.changes.is_empty()
            || self
                .current
                .iter()
                .map(R::id)
                .ne(self.original.iter().map(R::id))
    }

    pub fn rename(&mut self, id: Uuid, name: impl Into<String>) -> ResultEngine<()> {
        self.update(id, CatalogField::Name(name.into()))
    }

    pub fn set_starting_amount(&mut self, id: Uuid, amount: impl Into<String>) -> ResultEngine<()> {
        self.update(id, CatalogField::StartingAmount(amount.into()))
    }

    /// Writes `field` into the live record and records or clears the diff.
    pub fn update(&mut self, id: Uuid, field: CatalogField) -> ResultEngine<()> {
        let key = field.key();
        if !R::supports(key) {
            return Err(EngineError::InvalidField(format!(
                "{} has no {key:?} field",
                R::KIND
            )));
        }
        let baseline = if self.created.contains(&id) {
            R::blank(id).read(key)
        } else {
            self.original
                .iter()
                .find(|r| r.id() == id)
                .and_then(|r| r.read(key))
        };
        let record = self
            .current
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or_else(|| EngineError::KeyNotFound(id.to_string()))?;
        record.write(&field);

        if baseline.as_ref() == Some(&field) {
            self.changes.remove(id, key);
        } else {
            self.changes.set(id, field);
        }
        debug!(kind = R::KIND, %id, ?key, "catalog field updated");
        Ok(())
    }

    pub fn move_record(&mut self, old_index: usize, new_index: usize) -> ResultEngine<()> {
        let len = self.current.len();
        if old_index >= len || new_index >= len {
            return Err(EngineError::IndexOutOfBounds(format!(
                "move {} {old_index} -> {new_index} with {len} records",
                R::KIND
            )));
        }
        let record = self.current.remove(old_index);
        self.current.insert(new_index, record);
        Ok(())
    }

    /// Stages a blank record at `index` and returns its temporary id.
    pub fn create(&mut self, index: usize) -> ResultEngine<Uuid> {
        if index > self.current.len() {
            return Err(EngineError::IndexOutOfBounds(format!(
                "create {} at {index} with {} records",
                R::KIND,
                self.current.len()
            )));
        }
        let id = Uuid::new_v4();
        self.current.insert(index, R::blank(id));
        self.created.insert(id);
        debug!(kind = R::KIND, %id, index, "catalog record staged");
        Ok(id)
    }

    pub fn stage_delete(&mut self, id: Uuid) -> ResultEngine<bool> {
        self.ensure_exists(id)?;
        Ok(self.deleted.insert(id))
    }

    pub fn unstage_delete(&mut self, id: Uuid) -> ResultEngine<bool> {
        self.ensure_exists(id)?;
        Ok(self.deleted.remove(&id))
    }

    fn ensure_exists(&self, id: Uuid) -> ResultEngine<()> {
        match self.record(id) {
            Some(_) => Ok(()),
            None => Err(EngineError::KeyNotFound(id.to_string())),
        }
    }

    /// `true` when the live order, staged deletions left out, differs from
    /// the loaded one.
    fn is_reordered(&self) -> bool {
        let live = |records: &[R]| -> Vec<Uuid> {
            records
                .iter()
                .map(R::id)
                .filter(|id| !self.deleted.contains(id))
                .collect()
        };
        live(&self.current) != live(&self.original)
    }

    /// Builds the rows a save has to send. When the list was reordered, the
    /// order position of a record is its index in the live list once staged
    /// deletions are left out; otherwise records keep the loaded position.
    pub fn plan(&self) -> ResultEngine<CatalogPlan<R>> {
        let mut plan = CatalogPlan::default();
        let reordered = self.is_reordered();
        let mut position = 0;
        for record in &self.current {
            let id = record.id();
            let created = self.created.contains(&id);
            if self.deleted.contains(&id) {
                if !created {
                    plan.deletions.push(id);
                }
                continue;
            }

            let mut row = record.clone();
            if reordered {
                row.set_order_position(position);
            }
            position += 1;
            row.normalize()?;
            if created {
                plan.inserts.push((id, row.to_new()));
                continue;
            }
            let moved = self
                .original
                .iter()
                .find(|r| r.id() == id)
                .is_none_or(|r| r.order_position() != row.order_position());
            if moved || self.changes.has_change(id) {
                plan.upserts.push(row);
            }
        }
        Ok(plan)
    }

    /// Makes the live list the new baseline after a successful save.
    pub fn adopt(&mut self, ids: &HashMap<Uuid, Uuid>) {
        let reordered = self.is_reordered();
        let deleted = std::mem::take(&mut self.deleted);
        self.current.retain(|r| !deleted.contains(&r.id()));
        for (index, record) in self.current.iter_mut().enumerate() {
            if let Some(real) = ids.get(&record.id()) {
                record.set_id(*real);
            }
            if reordered {
                record.set_order_position(index as i64);
            }
        }
        self.original = self.current.clone();
        self.clear_tracking();
    }
}

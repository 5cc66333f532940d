//! Field-level diff between the loaded snapshot and the live one.
//!
//! The tracker holds no knowledge of *why* a value changed: callers decide
//! whether a value still differs from the original and either set or remove
//! it. The tracker only guarantees that no owner entry is ever left empty.

use std::collections::{BTreeMap, btree_map};

use uuid::Uuid;

use crate::{EngineError, ResultEngine, fields::Field};

#[derive(Clone, Debug, PartialEq)]
pub struct PendingChanges<F: Field> {
    changes: BTreeMap<Uuid, BTreeMap<F::Key, F>>,
}

impl<F: Field> Default for PendingChanges<F> {
    fn default() -> Self {
        Self {
            changes: BTreeMap::new(),
        }
    }
}

impl<F: Field> PendingChanges<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` of `owner` to `value`, or removes it when `value` is `None`.
    ///
    /// A value belonging to another key is rejected and nothing changes.
    pub fn update(&mut self, owner: Uuid, key: F::Key, value: Option<F>) -> ResultEngine<()> {
        match value {
            Some(value) if value.key() != key => Err(EngineError::InvalidField(format!(
                "{value:?} is not a value for {key:?}"
            ))),
            Some(value) => {
                self.set(owner, value);
                Ok(())
            }
            None => {
                self.remove(owner, key);
                Ok(())
            }
        }
    }

    pub fn set(&mut self, owner: Uuid, value: F) {
        self.changes
            .entry(owner)
            .or_default()
            .insert(value.key(), value);
    }

    pub fn remove(&mut self, owner: Uuid, key: F::Key) {
        if let btree_map::Entry::Occupied(mut entry) = self.changes.entry(owner) {
            entry.get_mut().remove(&key);
            if entry.get().is_empty() {
                entry.remove();
            }
        }
    }

    /// Drops every pending field of `owner` and returns them.
    pub fn remove_owner(&mut self, owner: Uuid) -> Option<BTreeMap<F::Key, F>> {
        self.changes.remove(&owner)
    }

    pub fn has_change(&self, owner: Uuid) -> bool {
        self.changes.contains_key(&owner)
    }

    pub fn get(&self, owner: Uuid, key: F::Key) -> Option<&F> {
        self.changes.get(&owner).and_then(|fields| fields.get(&key))
    }

    /// Pending fields of `owner`, in key order.
    pub fn fields(&self, owner: Uuid) -> impl Iterator<Item = &F> {
        self.changes
            .get(&owner)
            .into_iter()
            .flat_map(|fields| fields.values())
    }

    pub fn owners(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.changes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{ItemField, ItemKey};

    #[test]
    fn set_then_remove_leaves_no_entry() {
        let owner = Uuid::new_v4();
        let mut pending = PendingChanges::<ItemField>::new();

        pending
            .update(owner, ItemKey::Name, Some(ItemField::Name("Rent".into())))
            .unwrap();
        pending
            .update(owner, ItemKey::Amount, Some(ItemField::Amount("10".into())))
            .unwrap();
        assert!(pending.has_change(owner));
        assert_eq!(pending.fields(owner).count(), 2);

        pending.update(owner, ItemKey::Name, None).unwrap();
        assert!(pending.has_change(owner));
        pending.update(owner, ItemKey::Amount, None).unwrap();
        assert!(!pending.has_change(owner));
        assert!(pending.is_empty());
    }

    #[test]
    fn removing_unknown_owner_does_not_create_entry() {
        let owner = Uuid::new_v4();
        let mut pending = PendingChanges::<ItemField>::new();

        pending.update(owner, ItemKey::Amount, None).unwrap();
        assert!(!pending.has_change(owner));
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn value_for_another_key_is_rejected() {
        let owner = Uuid::new_v4();
        let mut pending = PendingChanges::<ItemField>::new();

        let result = pending.update(owner, ItemKey::Name, Some(ItemField::Amount("10".into())));

        assert!(matches!(result, Err(EngineError::InvalidField(_))));
        assert!(!pending.has_change(owner));
    }

    #[test]
    fn set_overwrites_same_key() {
        let owner = Uuid::new_v4();
        let mut pending = PendingChanges::<ItemField>::new();

        pending.set(owner, ItemField::Amount("1".into()));
        pending.set(owner, ItemField::Amount("12".into()));

        assert_eq!(
            pending.get(owner, ItemKey::Amount),
            Some(&ItemField::Amount("12".into()))
        );
        assert_eq!(pending.fields(owner).count(), 1);
    }
}

//! Reference counter module for the Meridian Virtual Machine.
//!
//! The counter owns the arena that backs every compound item and keeps the
//! aggregate accounting the interpreter's limits rely on: a per-compound
//! stack-reference count, a per-compound multiset of parent edges, the
//! global stack item count, and the frontier of compounds whose last stack
//! reference was just dropped. The post-instruction sweep walks that
//! frontier and reclaims whole unreachable components, including cyclic
//! ones that plain reference counting cannot collect.

use crate::error::{VmError, VmResult};
use crate::stack_item::StackItem;
use hashbrown::{HashMap, HashSet};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A stable identity for a compound item, issued by the arena.
///
/// Compound equality is equality of this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompoundId(u64);

#[derive(Debug, Clone)]
enum CompoundStorage {
    /// Element storage of arrays and structs.
    Items(Vec<StackItem>),
    /// Entry storage of maps, in insertion order.
    Pairs(Vec<(StackItem, StackItem)>),
}

#[derive(Debug)]
struct CompoundEntry {
    storage: CompoundStorage,
    stack_references: usize,
    parent_edges: HashMap<CompoundId, usize>,
}

impl CompoundEntry {
    /// Number of slots the compound contributes to the aggregate stack item
    /// count. Map entries count twice (key + value).
    fn entry_count(&self) -> usize {
        match &self.storage {
            CompoundStorage::Items(items) => items.len(),
            CompoundStorage::Pairs(pairs) => pairs.len() * 2,
        }
    }
}

#[derive(Debug, Default)]
struct Tracker {
    compounds: HashMap<CompoundId, CompoundEntry>,
    references_count: usize,
    zero_referred: HashSet<CompoundId>,
    next_id: u64,
}

impl Tracker {
    fn register(&mut self, storage: CompoundStorage) -> CompoundId {
        let id = CompoundId(self.next_id);
        self.next_id += 1;

        let slots: Vec<StackItem> = match &storage {
            CompoundStorage::Items(items) => items.clone(),
            CompoundStorage::Pairs(pairs) => pairs
                .iter()
                .flat_map(|(key, value)| [key.clone(), value.clone()])
                .collect(),
        };

        self.compounds.insert(
            id,
            CompoundEntry {
                storage,
                stack_references: 0,
                parent_edges: HashMap::new(),
            },
        );

        for slot in &slots {
            self.attach(slot, id);
        }

        id
    }

    /// Accounts for a value stored into a slot of `parent`.
    fn attach(&mut self, child: &StackItem, parent: CompoundId) {
        self.references_count += 1;
        if let Some(child_id) = child.compound_id() {
            if let Some(entry) = self.compounds.get_mut(&child_id) {
                *entry.parent_edges.entry(parent).or_insert(0) += 1;
            }
        }
    }

    /// Accounts for a value removed or overwritten in a slot of `parent`.
    fn detach(&mut self, child: &StackItem, parent: CompoundId) {
        self.references_count = self.references_count.saturating_sub(1);
        if let Some(child_id) = child.compound_id() {
            if let Some(entry) = self.compounds.get_mut(&child_id) {
                if let Some(multiplicity) = entry.parent_edges.get_mut(&parent) {
                    *multiplicity -= 1;
                    if *multiplicity == 0 {
                        entry.parent_edges.remove(&parent);
                    }
                }
                if entry.stack_references == 0 {
                    self.zero_referred.insert(child_id);
                }
            }
        }
    }

    fn entry(&self, id: CompoundId) -> VmResult<&CompoundEntry> {
        self.compounds
            .get(&id)
            .ok_or_else(|| VmError::invalid_operation("compound is not tracked"))
    }

    fn items(&self, id: CompoundId) -> VmResult<&Vec<StackItem>> {
        match &self.entry(id)?.storage {
            CompoundStorage::Items(items) => Ok(items),
            CompoundStorage::Pairs(_) => Err(VmError::invalid_type(
                "Array".to_string(),
                "Map".to_string(),
            )),
        }
    }

    fn items_mut(&mut self, id: CompoundId) -> VmResult<&mut Vec<StackItem>> {
        let entry = self
            .compounds
            .get_mut(&id)
            .ok_or_else(|| VmError::invalid_operation("compound is not tracked"))?;
        match &mut entry.storage {
            CompoundStorage::Items(items) => Ok(items),
            CompoundStorage::Pairs(_) => Err(VmError::invalid_type(
                "Array".to_string(),
                "Map".to_string(),
            )),
        }
    }

    fn pairs(&self, id: CompoundId) -> VmResult<&Vec<(StackItem, StackItem)>> {
        match &self.entry(id)?.storage {
            CompoundStorage::Pairs(pairs) => Ok(pairs),
            CompoundStorage::Items(_) => Err(VmError::invalid_type(
                "Map".to_string(),
                "Array".to_string(),
            )),
        }
    }

    fn pairs_mut(&mut self, id: CompoundId) -> VmResult<&mut Vec<(StackItem, StackItem)>> {
        let entry = self
            .compounds
            .get_mut(&id)
            .ok_or_else(|| VmError::invalid_operation("compound is not tracked"))?;
        match &mut entry.storage {
            CompoundStorage::Pairs(pairs) => Ok(pairs),
            CompoundStorage::Items(_) => Err(VmError::invalid_type(
                "Map".to_string(),
                "Array".to_string(),
            )),
        }
    }

    fn clone_struct(&mut self, source: CompoundId) -> VmResult<CompoundId> {
        // breadth-first: struct children are cloned, everything else shared
        let root = self.register(CompoundStorage::Items(Vec::new()));
        let mut queue = VecDeque::from([(root, source)]);

        while let Some((destination, origin)) = queue.pop_front() {
            let origin_items = self.items(origin)?.clone();
            for item in origin_items {
                let slot = if let StackItem::Struct(child) = item {
                    let child_clone = self.register(CompoundStorage::Items(Vec::new()));
                    queue.push_back((child_clone, child));
                    StackItem::Struct(child_clone)
                } else {
                    item
                };
                self.items_mut(destination)?.push(slot.clone());
                self.attach(&slot, destination);
            }
        }

        Ok(root)
    }

    fn check_zero_referred(&mut self) -> usize {
        while let Some(&seed) = self.zero_referred.iter().next() {
            self.zero_referred.remove(&seed);
            let Some(entry) = self.compounds.get(&seed) else {
                continue;
            };
            if entry.stack_references > 0 {
                continue;
            }

            // Everything that can retain the seed is an ancestor through a
            // live parent edge; if no ancestor sits on a stack, the whole
            // component is unreachable.
            let mut component: HashSet<CompoundId> = HashSet::new();
            component.insert(seed);
            let mut queue = vec![seed];
            let mut retained = false;
            while let Some(id) = queue.pop() {
                let Some(entry) = self.compounds.get(&id) else {
                    continue;
                };
                if entry.stack_references > 0 {
                    retained = true;
                    break;
                }
                for (&parent, &multiplicity) in &entry.parent_edges {
                    if multiplicity > 0 && component.insert(parent) {
                        queue.push(parent);
                    }
                }
            }
            if retained {
                continue;
            }

            let ids: Vec<CompoundId> = component.iter().copied().collect();
            for id in &ids {
                self.zero_referred.remove(id);
            }
            for id in ids {
                let Some(entry) = self.compounds.remove(&id) else {
                    continue;
                };
                self.references_count = self
                    .references_count
                    .saturating_sub(entry.entry_count());

                let children: Vec<StackItem> = match entry.storage {
                    CompoundStorage::Items(items) => items,
                    CompoundStorage::Pairs(pairs) => pairs
                        .into_iter()
                        .flat_map(|(key, value)| [key, value])
                        .collect(),
                };
                for child in children {
                    let Some(child_id) = child.compound_id() else {
                        continue;
                    };
                    if component.contains(&child_id) {
                        continue;
                    }
                    if let Some(child_entry) = self.compounds.get_mut(&child_id) {
                        if let Some(multiplicity) = child_entry.parent_edges.get_mut(&id) {
                            *multiplicity -= 1;
                            if *multiplicity == 0 {
                                child_entry.parent_edges.remove(&id);
                            }
                        }
                        if child_entry.stack_references == 0 {
                            self.zero_referred.insert(child_id);
                        }
                    }
                }
            }
            log::debug!("reference sweep reclaimed an unreachable component");
        }

        self.references_count
    }
}

/// Tracks stack references, parent edges and the aggregate stack item count
/// for one engine. Cloning yields another handle to the same tracker.
#[derive(Clone, Debug)]
pub struct ReferenceCounter {
    inner: Arc<Mutex<Tracker>>,
}

impl ReferenceCounter {
    /// Creates a new reference counter with an empty arena.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Tracker::default())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tracker> {
        self.inner.lock().expect("Lock poisoned")
    }

    /// Returns the aggregate stack item count.
    pub fn count(&self) -> usize {
        self.lock().references_count
    }

    /// Returns the number of live tracked compounds.
    pub fn compound_count(&self) -> usize {
        self.lock().compounds.len()
    }

    /// Returns `true` while the compound is live in the arena.
    pub fn is_tracked(&self, id: CompoundId) -> bool {
        self.lock().compounds.contains_key(&id)
    }

    /// Returns the stack-reference count of a compound (0 if reclaimed).
    pub fn stack_references(&self, id: CompoundId) -> usize {
        self.lock()
            .compounds
            .get(&id)
            .map_or(0, |entry| entry.stack_references)
    }

    /// Allocates a new array holding the given items.
    pub fn create_array(&self, items: Vec<StackItem>) -> StackItem {
        StackItem::Array(self.lock().register(CompoundStorage::Items(items)))
    }

    /// Allocates a new struct holding the given items.
    pub fn create_struct(&self, items: Vec<StackItem>) -> StackItem {
        StackItem::Struct(self.lock().register(CompoundStorage::Items(items)))
    }

    /// Allocates a new empty map.
    pub fn create_map(&self) -> StackItem {
        StackItem::Map(self.lock().register(CompoundStorage::Pairs(Vec::new())))
    }

    /// Records that an item was pushed onto a stack.
    pub fn add_stack_reference(&self, item: &StackItem) {
        let mut tracker = self.lock();
        tracker.references_count += 1;
        if let Some(id) = item.compound_id() {
            if let Some(entry) = tracker.compounds.get_mut(&id) {
                entry.stack_references += 1;
            }
            tracker.zero_referred.remove(&id);
        }
    }

    /// Records that an item was popped or removed from a stack.
    pub fn remove_stack_reference(&self, item: &StackItem) {
        let mut tracker = self.lock();
        tracker.references_count = tracker.references_count.saturating_sub(1);
        if let Some(id) = item.compound_id() {
            let mut reached_zero = false;
            if let Some(entry) = tracker.compounds.get_mut(&id) {
                entry.stack_references = entry.stack_references.saturating_sub(1);
                reached_zero = entry.stack_references == 0;
            }
            if reached_zero {
                tracker.zero_referred.insert(id);
            }
        }
    }

    /// Returns the entry count of a compound (map entries counted once).
    pub fn compound_len(&self, id: CompoundId) -> VmResult<usize> {
        let tracker = self.lock();
        Ok(match &tracker.entry(id)?.storage {
            CompoundStorage::Items(items) => items.len(),
            CompoundStorage::Pairs(pairs) => pairs.len(),
        })
    }

    /// Returns clones of an array's or struct's elements.
    pub fn array_items(&self, id: CompoundId) -> VmResult<Vec<StackItem>> {
        Ok(self.lock().items(id)?.clone())
    }

    /// Returns a clone of the element at `index`.
    pub fn array_get(&self, id: CompoundId, index: usize) -> VmResult<StackItem> {
        let tracker = self.lock();
        let items = tracker.items(id)?;
        items
            .get(index)
            .cloned()
            .ok_or_else(|| VmError::out_of_range(format!("index {index} >= {}", items.len())))
    }

    /// Replaces the element at `index`.
    pub fn array_set(&self, id: CompoundId, index: usize, item: StackItem) -> VmResult<()> {
        let mut tracker = self.lock();
        let old = {
            let items = tracker.items_mut(id)?;
            if index >= items.len() {
                return Err(VmError::out_of_range(format!(
                    "index {index} >= {}",
                    items.len()
                )));
            }
            std::mem::replace(&mut items[index], item.clone())
        };
        tracker.detach(&old, id);
        tracker.attach(&item, id);
        Ok(())
    }

    /// Appends an element.
    pub fn array_append(&self, id: CompoundId, item: StackItem) -> VmResult<()> {
        let mut tracker = self.lock();
        tracker.items_mut(id)?.push(item.clone());
        tracker.attach(&item, id);
        Ok(())
    }

    /// Removes the element at `index`.
    pub fn array_remove(&self, id: CompoundId, index: usize) -> VmResult<()> {
        let mut tracker = self.lock();
        let old = {
            let items = tracker.items_mut(id)?;
            if index >= items.len() {
                return Err(VmError::out_of_range(format!(
                    "index {index} >= {}",
                    items.len()
                )));
            }
            items.remove(index)
        };
        tracker.detach(&old, id);
        Ok(())
    }

    /// Reverses an array or struct in place.
    pub fn array_reverse(&self, id: CompoundId) -> VmResult<()> {
        self.lock().items_mut(id)?.reverse();
        Ok(())
    }

    /// Looks up the value stored under `key`.
    pub fn map_get(&self, id: CompoundId, key: &StackItem) -> VmResult<Option<StackItem>> {
        let tracker = self.lock();
        Ok(tracker
            .pairs(id)?
            .iter()
            .find(|(stored, _)| stored.equals(key))
            .map(|(_, value)| value.clone()))
    }

    /// Returns `true` if the map contains `key`.
    pub fn map_contains(&self, id: CompoundId, key: &StackItem) -> VmResult<bool> {
        let tracker = self.lock();
        Ok(tracker.pairs(id)?.iter().any(|(stored, _)| stored.equals(key)))
    }

    /// Inserts or replaces the value stored under `key`.
    ///
    /// Keys must be primitive; an existing key keeps its insertion position.
    pub fn map_insert(&self, id: CompoundId, key: StackItem, value: StackItem) -> VmResult<()> {
        if !key.is_primitive() {
            return Err(VmError::invalid_type(
                "primitive key".to_string(),
                format!("{:?}", key.item_type()),
            ));
        }
        let mut tracker = self.lock();
        let existing = tracker
            .pairs(id)?
            .iter()
            .position(|(stored, _)| stored.equals(&key));
        match existing {
            Some(position) => {
                let old = {
                    let pairs = tracker.pairs_mut(id)?;
                    std::mem::replace(&mut pairs[position].1, value.clone())
                };
                tracker.detach(&old, id);
                tracker.attach(&value, id);
            }
            None => {
                tracker.pairs_mut(id)?.push((key.clone(), value.clone()));
                tracker.attach(&key, id);
                tracker.attach(&value, id);
            }
        }
        Ok(())
    }

    /// Removes the entry stored under `key`; returns whether it existed.
    pub fn map_remove(&self, id: CompoundId, key: &StackItem) -> VmResult<bool> {
        let mut tracker = self.lock();
        let existing = tracker
            .pairs(id)?
            .iter()
            .position(|(stored, _)| stored.equals(key));
        match existing {
            Some(position) => {
                let (old_key, old_value) = tracker.pairs_mut(id)?.remove(position);
                tracker.detach(&old_key, id);
                tracker.detach(&old_value, id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Returns the keys of a map in insertion order.
    pub fn map_keys(&self, id: CompoundId) -> VmResult<Vec<StackItem>> {
        let tracker = self.lock();
        Ok(tracker
            .pairs(id)?
            .iter()
            .map(|(key, _)| key.clone())
            .collect())
    }

    /// Returns the values of a map in insertion order.
    pub fn map_values(&self, id: CompoundId) -> VmResult<Vec<StackItem>> {
        let tracker = self.lock();
        Ok(tracker
            .pairs(id)?
            .iter()
            .map(|(_, value)| value.clone())
            .collect())
    }

    /// Returns the entries of a map in insertion order.
    pub fn map_pairs(&self, id: CompoundId) -> VmResult<Vec<(StackItem, StackItem)>> {
        Ok(self.lock().pairs(id)?.clone())
    }

    /// Deep-clones a struct: struct children are cloned breadth-first,
    /// every other element is shared.
    pub fn clone_struct(&self, source: CompoundId) -> VmResult<StackItem> {
        Ok(StackItem::Struct(self.lock().clone_struct(source)?))
    }

    /// Sweeps the zero-referred frontier, reclaiming unreachable compounds
    /// (cyclic ones included), and returns the aggregate stack item count.
    pub fn check_zero_referred(&self) -> usize {
        self.lock().check_zero_referred()
    }
}

impl Default for ReferenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_reference_accounting() {
        let counter = ReferenceCounter::new();

        let item = StackItem::from_int(7);
        counter.add_stack_reference(&item);
        assert_eq!(counter.count(), 1);
        counter.remove_stack_reference(&item);
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn test_compound_slots_counted() {
        let counter = ReferenceCounter::new();

        let array = counter.create_array(vec![StackItem::from_int(1), StackItem::from_int(2)]);
        // two element slots
        assert_eq!(counter.count(), 2);

        counter.add_stack_reference(&array);
        assert_eq!(counter.count(), 3);

        counter.remove_stack_reference(&array);
        assert_eq!(counter.check_zero_referred(), 0);
        assert_eq!(counter.compound_count(), 0);
    }

    #[test]
    fn test_map_slots_count_double() {
        let counter = ReferenceCounter::new();

        let map = counter.create_map();
        counter.add_stack_reference(&map);
        let id = map.compound_id().expect("map id");
        counter
            .map_insert(id, StackItem::from_int(1), StackItem::from_int(2))
            .expect("insert should succeed");

        // one stack slot + key + value
        assert_eq!(counter.count(), 3);

        counter.remove_stack_reference(&map);
        assert_eq!(counter.check_zero_referred(), 0);
    }

    #[test]
    fn test_cycle_reclaimed() {
        let counter = ReferenceCounter::new();

        let array = counter.create_array(Vec::new());
        let id = array.compound_id().expect("array id");
        counter.add_stack_reference(&array);
        counter.array_append(id, array.clone()).expect("append");

        // stack slot + self slot
        assert_eq!(counter.count(), 2);

        counter.remove_stack_reference(&array);
        assert_eq!(counter.check_zero_referred(), 0);
        assert!(!counter.is_tracked(id));
    }

    #[test]
    fn test_live_parent_retains_child() {
        let counter = ReferenceCounter::new();

        let inner = counter.create_array(Vec::new());
        let inner_id = inner.compound_id().expect("inner id");
        let outer = counter.create_array(vec![inner.clone()]);
        counter.add_stack_reference(&outer);
        counter.add_stack_reference(&inner);

        // dropping the inner's own stack reference must not reclaim it
        counter.remove_stack_reference(&inner);
        counter.check_zero_referred();
        assert!(counter.is_tracked(inner_id));

        // dropping the outer reclaims both
        counter.remove_stack_reference(&outer);
        assert_eq!(counter.check_zero_referred(), 0);
        assert!(!counter.is_tracked(inner_id));
    }

    #[test]
    fn test_nested_reclamation_cascades() {
        let counter = ReferenceCounter::new();

        let inner = counter.create_array(vec![StackItem::from_int(5)]);
        let inner_id = inner.compound_id().expect("inner id");
        let outer = counter.create_array(vec![inner]);
        counter.add_stack_reference(&outer);

        counter.remove_stack_reference(&outer);
        assert_eq!(counter.check_zero_referred(), 0);
        assert!(!counter.is_tracked(inner_id));
        assert_eq!(counter.compound_count(), 0);
    }

    #[test]
    fn test_struct_clone_identity() {
        let counter = ReferenceCounter::new();

        let shared = counter.create_array(vec![StackItem::from_int(9)]);
        let nested = counter.create_struct(vec![StackItem::from_int(1)]);
        let source = counter.create_struct(vec![
            StackItem::from_int(2),
            nested.clone(),
            shared.clone(),
        ]);
        let source_id = source.compound_id().expect("struct id");
        counter.add_stack_reference(&source);

        let clone = counter.clone_struct(source_id).expect("clone");
        counter.add_stack_reference(&clone);
        let clone_id = clone.compound_id().expect("clone id");
        assert_ne!(source_id, clone_id);

        let clone_items = counter.array_items(clone_id).expect("clone items");
        assert_eq!(clone_items.len(), 3);
        // nested struct cloned to a new identity
        assert_ne!(
            clone_items[1].compound_id().expect("nested clone id"),
            nested.compound_id().expect("nested id")
        );
        // non-struct compounds shared by reference
        assert_eq!(
            clone_items[2].compound_id().expect("shared id"),
            shared.compound_id().expect("shared id")
        );
    }

    #[test]
    fn test_map_insertion_order() {
        let counter = ReferenceCounter::new();
        let map = counter.create_map();
        counter.add_stack_reference(&map);
        let id = map.compound_id().expect("map id");

        counter
            .map_insert(id, StackItem::from_int(3), StackItem::from_int(30))
            .expect("insert");
        counter
            .map_insert(id, StackItem::from_int(1), StackItem::from_int(10))
            .expect("insert");
        counter
            .map_insert(id, StackItem::from_int(2), StackItem::from_int(20))
            .expect("insert");
        // replacing a value keeps the key's position
        counter
            .map_insert(id, StackItem::from_int(1), StackItem::from_int(11))
            .expect("insert");

        let keys = counter.map_keys(id).expect("keys");
        let ints: Vec<_> = keys
            .iter()
            .map(|key| key.as_int().expect("integer key"))
            .collect();
        assert_eq!(
            ints,
            vec![
                num_bigint::BigInt::from(3),
                num_bigint::BigInt::from(1),
                num_bigint::BigInt::from(2)
            ]
        );
    }

    #[test]
    fn test_non_primitive_map_key_rejected() {
        let counter = ReferenceCounter::new();
        let map = counter.create_map();
        let id = map.compound_id().expect("map id");
        let array = counter.create_array(Vec::new());

        assert!(counter
            .map_insert(id, array, StackItem::from_int(1))
            .is_err());
    }
}

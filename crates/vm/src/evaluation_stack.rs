//! Evaluation stack module for the Meridian Virtual Machine.
//!
//! A dense, random-access stack. Every push and pop is reported to the
//! engine's [`ReferenceCounter`] so the aggregate stack item accounting
//! stays exact. Index-bounded operations report failure through
//! [`VmResult`]; they never panic.

use crate::error::{VmError, VmResult};
use crate::reference_counter::ReferenceCounter;
use crate::stack_item::StackItem;

/// Represents an evaluation or alt stack of a frame.
pub struct EvaluationStack {
    /// The underlying stack storage, bottom first.
    items: Vec<StackItem>,

    /// The reference counter shared with the owning engine.
    reference_counter: ReferenceCounter,
}

impl EvaluationStack {
    /// Creates a new stack bound to the given reference counter.
    pub fn new(reference_counter: ReferenceCounter) -> Self {
        Self {
            items: Vec::new(),
            reference_counter,
        }
    }

    /// Returns the reference counter this stack reports to.
    pub fn reference_counter(&self) -> &ReferenceCounter {
        &self.reference_counter
    }

    /// Returns the number of items on the stack.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Pushes an item onto the stack.
    pub fn push(&mut self, item: StackItem) {
        self.reference_counter.add_stack_reference(&item);
        self.items.push(item);
    }

    /// Pops the item at the top of the stack.
    pub fn pop(&mut self) -> VmResult<StackItem> {
        match self.items.pop() {
            Some(item) => {
                self.reference_counter.remove_stack_reference(&item);
                Ok(item)
            }
            None => Err(VmError::stack_underflow(1, 0)),
        }
    }

    /// Returns the item `n` deep from the top without removing it;
    /// `peek(0)` is the top.
    pub fn peek(&self, n: usize) -> VmResult<&StackItem> {
        if n >= self.items.len() {
            return Err(VmError::stack_underflow(n + 1, self.items.len()));
        }
        Ok(&self.items[self.items.len() - 1 - n])
    }

    /// Returns the item `k` up from the bottom without removing it;
    /// `peek_from_bottom(0)` is the bottom.
    pub fn peek_from_bottom(&self, k: usize) -> VmResult<&StackItem> {
        self.items
            .get(k)
            .ok_or_else(|| VmError::stack_underflow(k + 1, self.items.len()))
    }

    /// Inserts an item `n` deep from the top; `insert(0, x)` is a push.
    pub fn insert(&mut self, n: usize, item: StackItem) -> VmResult<()> {
        if n > self.items.len() {
            return Err(VmError::stack_underflow(n, self.items.len()));
        }
        self.reference_counter.add_stack_reference(&item);
        let position = self.items.len() - n;
        self.items.insert(position, item);
        Ok(())
    }

    /// Removes and returns the item `n` deep from the top.
    pub fn remove(&mut self, n: usize) -> VmResult<StackItem> {
        if n >= self.items.len() {
            return Err(VmError::stack_underflow(n + 1, self.items.len()));
        }
        let position = self.items.len() - 1 - n;
        let item = self.items.remove(position);
        self.reference_counter.remove_stack_reference(&item);
        Ok(item)
    }

    /// Replaces the item `n` deep from the top.
    pub fn set(&mut self, n: usize, item: StackItem) -> VmResult<()> {
        if n >= self.items.len() {
            return Err(VmError::stack_underflow(n + 1, self.items.len()));
        }
        self.reference_counter.add_stack_reference(&item);
        let position = self.items.len() - 1 - n;
        let old = std::mem::replace(&mut self.items[position], item);
        self.reference_counter.remove_stack_reference(&old);
        Ok(())
    }

    /// Swaps the items `i` and `j` deep from the top.
    pub fn swap(&mut self, i: usize, j: usize) -> VmResult<()> {
        let len = self.items.len();
        if i >= len || j >= len {
            return Err(VmError::stack_underflow(i.max(j) + 1, len));
        }
        self.items.swap(len - 1 - i, len - 1 - j);
        Ok(())
    }

    /// Copies every item, bottom to top, onto `target`.
    pub fn copy_to(&self, target: &mut EvaluationStack) {
        for item in &self.items {
            target.push(item.clone());
        }
    }

    /// Clears the stack.
    pub fn clear(&mut self) {
        for item in &self.items {
            self.reference_counter.remove_stack_reference(item);
        }
        self.items.clear();
    }

    /// Returns an iterator over the items, bottom first.
    pub fn iter(&self) -> std::slice::Iter<'_, StackItem> {
        self.items.iter()
    }
}

impl Drop for EvaluationStack {
    fn drop(&mut self) {
        self.clear();
    }
}

//! Generation-checked slot storage for nodes, collections, and listeners.

use std::marker::PhantomData;

use mg_core::SlotHandle;

use crate::error::GraphError;

struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

/// A slot arena addressed by generation-checked handles.
///
/// Removing a value bumps its slot's generation, so handles issued before the
/// removal no longer resolve. A slot whose generation is exhausted is retired
/// instead of being reused.
pub(crate) struct Arena<H, T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    len: usize,
    _handle: PhantomData<fn() -> H>,
}

impl<H: SlotHandle, T> Arena<H, T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
            _handle: PhantomData,
        }
    }

    pub(crate) fn insert(&mut self, value: T) -> Result<H, GraphError> {
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.value = Some(value);
            self.len += 1;
            return Ok(H::from_parts(index, entry.generation));
        }

        let index = u32::try_from(self.entries.len()).map_err(|_| GraphError::CapacityExhausted)?;
        self.entries.push(Entry {
            generation: 0,
            value: Some(value),
        });
        self.len += 1;
        Ok(H::from_parts(index, 0))
    }

    pub(crate) fn get(&self, handle: H) -> Option<&T> {
        self.entries
            .get(handle.index() as usize)
            .filter(|entry| entry.generation == handle.generation())
            .and_then(|entry| entry.value.as_ref())
    }

    pub(crate) fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        self.entries
            .get_mut(handle.index() as usize)
            .filter(|entry| entry.generation == handle.generation())
            .and_then(|entry| entry.value.as_mut())
    }

    #[inline]
    pub(crate) fn contains(&self, handle: H) -> bool {
        self.get(handle).is_some()
    }

    pub(crate) fn remove(&mut self, handle: H) -> Option<T> {
        let entry = self
            .entries
            .get_mut(handle.index() as usize)
            .filter(|entry| entry.generation == handle.generation())?;
        let value = entry.value.take()?;
        self.len -= 1;
        if let Some(next) = entry.generation.checked_add(1) {
            entry.generation = next;
            self.free.push(handle.index());
        }
        Some(value)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Live handles and values, in slot order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (H, &T)> {
        self.entries.iter().enumerate().filter_map(|(index, entry)| {
            let value = entry.value.as_ref()?;
            let index = u32::try_from(index).ok()?;
            Some((H::from_parts(index, entry.generation), value))
        })
    }
}

impl<H: SlotHandle, T> Default for Arena<H, T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

//! Generation-keyed memoization
//!
//! Owners keep a generation counter that every mutation bumps. A [`Memo`]
//! remembers the generation its value was computed at and recomputes once
//! the owner has moved on, so a stale value can never be observed.

use std::cell::RefCell;

#[derive(Debug)]
pub(crate) struct Memo<T> {
    slot: RefCell<Option<(u64, T)>>,
}

impl<T: Clone> Memo<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: RefCell::new(None),
        }
    }

    pub(crate) fn get_or_compute(&self, generation: u64, compute: impl FnOnce() -> T) -> T {
        if let Some((cached_at, value)) = self.slot.borrow().as_ref()
            && *cached_at == generation
        {
            return value.clone();
        }

        let value = compute();
        *self.slot.borrow_mut() = Some((generation, value.clone()));
        value
    }

    #[cfg(test)]
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        matches!(self.slot.borrow().as_ref(), Some((cached_at, _)) if *cached_at == generation)
    }
}

impl<T: Clone> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            slot: RefCell::new(self.slot.borrow().clone()),
        }
    }
}

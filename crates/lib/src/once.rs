//! Typed once-per-run memoisation.
//!
//! A [`OnceTable`] maps a typed [`OnceKey`] (plus an optional sub-key, such as
//! a glob pattern) to a value computed by the first caller. Concurrent callers
//! of the same key block until the first computation finishes and then share
//! its result.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, OnceLock};

/// A process-wide key naming one memoised value of type `T`.
pub struct OnceKey<T> {
  name: &'static str,
  _marker: PhantomData<fn() -> T>,
}

impl<T> OnceKey<T> {
  pub const fn new(name: &'static str) -> Self {
    Self {
      name,
      _marker: PhantomData,
    }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }
}

type Slot = Box<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct OnceTable {
  slots: Mutex<HashMap<(TypeId, &'static str, String), Slot>>,
}

impl std::fmt::Debug for OnceTable {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let len = self.slots.lock().map(|s| s.len()).unwrap_or_default();
    f.debug_struct("OnceTable").field("entries", &len).finish()
  }
}

impl OnceTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Return the value for `key`, computing it with `compute` on first use.
  pub fn once<T, F>(&self, key: &OnceKey<T>, compute: F) -> T
  where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> T,
  {
    self.once_keyed(key, "", compute)
  }

  /// Like [`once`](Self::once) with an additional string sub-key.
  pub fn once_keyed<T, F>(&self, key: &OnceKey<T>, sub: &str, compute: F) -> T
  where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> T,
  {
    let cell = self.cell::<T>(key.name, sub);
    cell.get_or_init(compute).clone()
  }

  fn cell<T: Send + Sync + 'static>(&self, name: &'static str, sub: &str) -> Arc<OnceLock<T>> {
    let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let slot = slots
      .entry((TypeId::of::<T>(), name, sub.to_string()))
      .or_insert_with(|| Box::new(Arc::new(OnceLock::<T>::new())));
    match slot.downcast_ref::<Arc<OnceLock<T>>>() {
      Some(cell) => cell.clone(),
      None => {
        let cell = Arc::new(OnceLock::<T>::new());
        *slot = Box::new(cell.clone());
        cell
      }
    }
  }

  pub fn len(&self) -> usize {
    self.slots.lock().map(|s| s.len()).unwrap_or_default()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

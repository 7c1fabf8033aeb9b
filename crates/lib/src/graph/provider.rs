//! Typed write-once slots attached to module variants.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A process-global key naming a provider of type `T`.
///
/// ```
/// use blueprint_lib::graph::ProviderKey;
///
/// #[derive(Debug, Clone)]
/// struct SourceFiles(Vec<String>);
///
/// static SOURCE_FILES: ProviderKey<SourceFiles> = ProviderKey::new("source_files");
/// assert_eq!(SOURCE_FILES.name(), "source_files");
/// ```
pub struct ProviderKey<T> {
  name: &'static str,
  _marker: PhantomData<fn() -> T>,
}

impl<T> ProviderKey<T> {
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

impl<T: Send + Sync + 'static> ProviderKey<T> {
  pub(crate) fn id(&self) -> ProviderId {
    ProviderId {
      type_id: TypeId::of::<T>(),
      name: self.name,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ProviderId {
  type_id: TypeId,
  pub(crate) name: &'static str,
}

pub(crate) type ProviderValue = Arc<dyn Any + Send + Sync>;

/// Provider values published by one module variant.
#[derive(Clone, Default)]
pub struct ProviderTable {
  values: HashMap<ProviderId, ProviderValue>,
}

impl fmt::Debug for ProviderTable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut names: Vec<_> = self.values.keys().map(|k| k.name).collect();
    names.sort_unstable();
    f.debug_set().entries(names).finish()
  }
}

impl ProviderTable {
  pub fn get<T: Send + Sync + 'static>(&self, key: &ProviderKey<T>) -> Option<&T> {
    self.values.get(&key.id())?.downcast_ref::<T>()
  }

  pub(crate) fn contains(&self, id: ProviderId) -> bool {
    self.values.contains_key(&id)
  }

  /// Publish a value, refusing to overwrite an existing one.
  pub(crate) fn publish(&mut self, id: ProviderId, value: ProviderValue) -> Result<(), String> {
    if self.values.contains_key(&id) {
      return Err(format!("provider {:?} set twice", id.name));
    }
    self.values.insert(id, value);
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
}

/// A provider write buffered until the end of a wave.
pub(crate) struct PendingProvider {
  pub(crate) id: ProviderId,
  pub(crate) value: ProviderValue,
}

impl PendingProvider {
  pub(crate) fn new<T: Send + Sync + 'static>(key: &ProviderKey<T>, value: T) -> Self {
    Self {
      id: key.id(),
      value: Arc::new(value),
    }
  }
}

use std::{
  cell::RefCell,
  collections::HashMap,
  hash::Hash,
  rc::Rc,
};

use crate::structure::ObjectUuid;

/// Type-erased hooks a collection fires at its secondary indexes.
pub trait CollectionIndexBinding<O> {
  fn on_create(&self, id: ObjectUuid, obj: &Rc<RefCell<O>>);
  fn on_update(&self, id: ObjectUuid, obj: &Rc<RefCell<O>>);
  fn on_delete(&self, id: ObjectUuid, obj: &Rc<RefCell<O>>);
}

/// Secondary index over one field of a collection's objects: a map from
/// field value to the set of objects currently carrying that value.
///
/// The invariant maintained through the hooks is exact membership: after
/// every applied change, `indexed_objects(v)` contains an object iff its
/// indexed field equals `v`.
pub struct ObjectCollectionIndex<O, V> {
  extract: Box<dyn Fn(&O) -> V>,
  by_value: RefCell<HashMap<V, Vec<(ObjectUuid, Rc<RefCell<O>>)>>>,
  current: RefCell<HashMap<ObjectUuid, V>>,
}

impl<O, V> ObjectCollectionIndex<O, V>
where
  V: Eq + Hash + Clone,
{
  /// Builds an index keyed by `extract`'s result. Register the returned
  /// value with the owning collection; keep the `Rc` for lookups.
  pub fn new(extract: impl Fn(&O) -> V + 'static) -> Rc<Self> {
    Rc::new(Self {
      extract: Box::new(extract),
      by_value: RefCell::new(HashMap::new()),
      current: RefCell::new(HashMap::new()),
    })
  }

  /// Objects whose indexed field currently equals `value`.
  pub fn indexed_objects(&self, value: &V) -> Vec<Rc<RefCell<O>>> {
    self
      .by_value
      .borrow()
      .get(value)
      .map(|entries| entries.iter().map(|(_, obj)| obj.clone()).collect())
      .unwrap_or_default()
  }

  pub fn indexed_object_count(&self, value: &V) -> usize {
    self
      .by_value
      .borrow()
      .get(value)
      .map_or(0, |entries| entries.len())
  }

  fn insert(&self, id: ObjectUuid, value: V, obj: &Rc<RefCell<O>>) {
    self.current.borrow_mut().insert(id, value.clone());
    self
      .by_value
      .borrow_mut()
      .entry(value)
      .or_default()
      .push((id, obj.clone()));
  }

  fn remove(&self, id: ObjectUuid) {
    let Some(old) = self.current.borrow_mut().remove(&id) else {
      return;
    };
    let mut by_value = self.by_value.borrow_mut();
    if let Some(entries) = by_value.get_mut(&old) {
      entries.retain(|(entry_id, _)| *entry_id != id);
      if entries.is_empty() {
        by_value.remove(&old);
      }
    }
  }
}

impl<O, V> CollectionIndexBinding<O> for ObjectCollectionIndex<O, V>
where
  V: Eq + Hash + Clone,
{
  fn on_create(&self, id: ObjectUuid, obj: &Rc<RefCell<O>>) {
    let value = (self.extract)(&obj.borrow());
    self.insert(id, value, obj);
  }

  fn on_update(&self, id: ObjectUuid, obj: &Rc<RefCell<O>>) {
    let value = (self.extract)(&obj.borrow());
    if self.current.borrow().get(&id) == Some(&value) {
      return;
    }
    self.remove(id);
    self.insert(id, value, obj);
  }

  fn on_delete(&self, id: ObjectUuid, _obj: &Rc<RefCell<O>>) {
    self.remove(id);
  }
}

/*!
 * Searchable Object Holder
 *
 * Name-keyed registry of shared objects. Each operation is atomic with
 * respect to the map; nothing is linearized with mutation of the objects
 * themselves.
 */

use super::tripwire::TripWireDetector;
use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Registry of `Arc<X>` keyed by name
pub struct SearchableObjectHolder<X> {
    objects: Mutex<HashMap<String, Arc<X>, RandomState>>,
    tripwire: Option<TripWireDetector>,
}

impl<X> SearchableObjectHolder<X> {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::with_hasher(RandomState::new())),
            tripwire: None,
        }
    }

    /// Make lookups report nothing once `detector` has tripped
    pub fn with_tripwire(mut self, detector: TripWireDetector) -> Self {
        self.tripwire = Some(detector);
        self
    }

    #[inline]
    fn tripped(&self) -> bool {
        self.tripwire.as_ref().is_some_and(|t| t.is_tripped())
    }

    /// Insert under `name`; returns `false` if the name is taken
    pub fn add_object(&self, name: impl Into<String>, object: Arc<X>) -> bool {
        match self.objects.lock().entry(name.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(object);
                true
            }
        }
    }

    /// Remove by name
    pub fn remove_object(&self, name: &str) -> bool {
        self.objects.lock().remove(name).is_some()
    }

    /// Remove the first object matching `pred`
    pub fn remove_object_by(&self, mut pred: impl FnMut(&Arc<X>) -> bool) -> bool {
        let mut objects = self.objects.lock();
        let Some(name) = objects
            .iter()
            .find(|(_, object)| pred(object))
            .map(|(name, _)| name.clone())
        else {
            return false;
        };
        objects.remove(&name);
        true
    }

    /// Register the object stored under `from` under `to` as well
    ///
    /// Fails if `from` is missing or `to` is taken.
    pub fn copy_object(&self, from: &str, to: impl Into<String>) -> bool {
        let mut objects = self.objects.lock();
        let Some(object) = objects.get(from).cloned() else {
            return false;
        };
        match objects.entry(to.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(object);
                true
            }
        }
    }

    /// Look up by name
    pub fn find_object(&self, name: &str) -> Option<Arc<X>> {
        if self.tripped() {
            return None;
        }
        self.objects.lock().get(name).cloned()
    }

    /// First object matching `pred`
    pub fn find_object_by(&self, mut pred: impl FnMut(&Arc<X>) -> bool) -> Option<Arc<X>> {
        if self.tripped() {
            return None;
        }
        self.objects.lock().values().find(|object| pred(object)).cloned()
    }

    /// Snapshot of every held object
    pub fn objects(&self) -> Vec<Arc<X>> {
        self.objects.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    /// Only reliable when a single thread is adding objects
    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }
}

impl<X> Default for SearchableObjectHolder<X> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X> fmt::Debug for SearchableObjectHolder<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchableObjectHolder")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::TripLine;
    use std::thread;

    #[test]
    fn test_add_find_remove() {
        let holder = SearchableObjectHolder::new();
        assert!(holder.add_object("alpha", Arc::new(1)));
        assert!(!holder.add_object("alpha", Arc::new(2)));
        assert_eq!(holder.find_object("alpha").as_deref(), Some(&1));

        assert!(holder.remove_object("alpha"));
        assert!(!holder.remove_object("alpha"));
        assert!(holder.is_empty());
    }

    #[test]
    fn test_copy_shares_object() {
        let holder = SearchableObjectHolder::new();
        holder.add_object("a", Arc::new(String::from("shared")));
        assert!(holder.copy_object("a", "b"));
        assert!(!holder.copy_object("a", "b"));
        assert!(!holder.copy_object("missing", "c"));

        let a = holder.find_object("a").unwrap();
        let b = holder.find_object("b").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(holder.objects().len(), 2);
    }

    #[test]
    fn test_predicate_operations() {
        let holder = SearchableObjectHolder::new();
        for v in 0..5 {
            holder.add_object(format!("n{v}"), Arc::new(v));
        }
        assert_eq!(holder.find_object_by(|o| **o == 3).as_deref(), Some(&3));
        assert!(holder.remove_object_by(|o| **o == 3));
        assert!(holder.find_object_by(|o| **o == 3).is_none());
        assert_eq!(holder.len(), 4);
    }

    #[test]
    fn test_tripped_lookup_is_empty() {
        let line = TripLine::new();
        let trigger = line.trigger();
        let holder = SearchableObjectHolder::new().with_tripwire(line.detector());
        holder.add_object("x", Arc::new(1u8));
        assert!(holder.find_object("x").is_some());

        drop(trigger);
        assert!(holder.find_object("x").is_none());
        assert!(holder.find_object_by(|_| true).is_none());
    }

    #[test]
    fn test_concurrent_adds() {
        let holder = Arc::new(SearchableObjectHolder::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let holder = holder.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        assert!(holder.add_object(format!("{t}-{i}"), Arc::new(i)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(holder.len(), 400);
    }
}

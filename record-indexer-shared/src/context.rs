//! Typed per-run context shared by all pipeline stages.
//!
//! A [`Schema`] is a registry of typed slots. Each [`Selector`] is an opaque,
//! schema-scoped key for a value of one type, optionally with a lazy
//! initializer. A [`Container`] is one run's instance of a schema: stages and
//! worker clones of the same run share the same container and communicate
//! through it without knowing about each other's internals.
//!
//! A container may only be indexed by selectors minted from its own schema;
//! violating this is a programming error and panics.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

static SCHEMA_IDS: AtomicU64 = AtomicU64::new(0);

/// A registry of typed slots for one kind of indexing run.
///
/// Selectors are minted from the schema; containers are created from it.
/// The schema itself holds no values.
pub struct Schema {
    id: u64,
    name: String,
    slot_count: AtomicUsize,
}

impl Schema {
    /// Create a new schema with a diagnostic name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: SCHEMA_IDS.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            slot_count: AtomicUsize::new(0),
        }
    }

    /// The schema's diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mint a new typed slot.
    pub fn create_selector<V: Send + Sync + 'static>(&self) -> Selector<V> {
        Selector {
            schema_id: self.id,
            index: self.slot_count.fetch_add(1, Ordering::Relaxed),
            init: None,
            _marker: PhantomData,
        }
    }

    /// Mint a typed slot whose value is created on first read.
    ///
    /// Reading a container through this selector never returns `None`: if the
    /// slot is empty, the initializer runs and its result is stored.
    pub fn create_lazy_selector<V, F>(&self, init: F) -> Selector<V>
    where
        V: Send + Sync + 'static,
        F: Fn() -> V + Send + Sync + 'static,
    {
        Selector {
            schema_id: self.id,
            index: self.slot_count.fetch_add(1, Ordering::Relaxed),
            init: Some(Arc::new(init)),
            _marker: PhantomData,
        }
    }

    /// Create a fresh container for one run of this schema.
    pub fn create_container(&self) -> Container {
        let mut slots = Vec::new();
        slots.resize_with(self.slot_count.load(Ordering::Relaxed), || None);
        Container {
            schema_id: self.id,
            schema_name: Arc::from(self.name.as_str()),
            slots: Arc::new(RwLock::new(slots)),
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("slots", &self.slot_count.load(Ordering::Relaxed))
            .finish()
    }
}

/// An opaque key for one typed slot of a [`Schema`].
pub struct Selector<V> {
    schema_id: u64,
    index: usize,
    init: Option<Arc<dyn Fn() -> V + Send + Sync>>,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Clone for Selector<V> {
    fn clone(&self) -> Self {
        Self {
            schema_id: self.schema_id,
            index: self.index,
            init: self.init.clone(),
            _marker: PhantomData,
        }
    }
}

impl<V> fmt::Debug for Selector<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("schema_id", &self.schema_id)
            .field("index", &self.index)
            .finish()
    }
}

type Slot = Option<Arc<dyn Any + Send + Sync>>;

/// One run's mutable instance of a [`Schema`].
///
/// Cloning is cheap and clones share the same slots, so the container can be
/// handed to every worker of a run. Values must be either immutable after
/// first write or internally thread-safe; the container guarantees only the
/// atomicity of individual `set`/`get`/`remove` calls.
#[derive(Clone)]
pub struct Container {
    schema_id: u64,
    schema_name: Arc<str>,
    slots: Arc<RwLock<Vec<Slot>>>,
}

impl Container {
    fn check_schema<V>(&self, selector: &Selector<V>) {
        assert_eq!(
            self.schema_id, selector.schema_id,
            "selector does not belong to schema '{}'",
            self.schema_name
        );
    }

    /// Store a value in the selector's slot, replacing any previous value.
    pub fn set<V: Send + Sync + 'static>(&self, selector: &Selector<V>, value: V) {
        self.check_schema(selector);
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        if slots.len() <= selector.index {
            slots.resize_with(selector.index + 1, || None);
        }
        slots[selector.index] = Some(Arc::new(value));
    }

    /// Read the selector's slot.
    ///
    /// For lazy selectors an empty slot is initialized first, so the result
    /// is `None` only for plain selectors whose slot was never written.
    pub fn get<V: Send + Sync + 'static>(&self, selector: &Selector<V>) -> Option<Arc<V>> {
        self.check_schema(selector);
        {
            let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
            if let Some(Some(value)) = slots.get(selector.index) {
                return value.clone().downcast::<V>().ok();
            }
        }
        let init = selector.init.as_ref()?;
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        if slots.len() <= selector.index {
            slots.resize_with(selector.index + 1, || None);
        }
        // Re-check: another thread may have initialized the slot meanwhile.
        if slots[selector.index].is_none() {
            slots[selector.index] = Some(Arc::new(init()));
        }
        slots[selector.index]
            .as_ref()
            .and_then(|v| v.clone().downcast::<V>().ok())
    }

    /// Take the value out of the selector's slot, leaving it empty.
    pub fn remove<V: Send + Sync + 'static>(&self, selector: &Selector<V>) -> Option<Arc<V>> {
        self.check_schema(selector);
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots
            .get_mut(selector.index)
            .and_then(|slot| slot.take())
            .and_then(|v| v.downcast::<V>().ok())
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("schema", &self.schema_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_set_and_get() {
        let schema = Schema::new("test");
        let selector = schema.create_selector::<i64>();
        let container = schema.create_container();

        assert!(container.get(&selector).is_none());
        container.set(&selector, 42);
        assert_eq!(*container.get(&selector).expect("value set"), 42);
    }

    #[test]
    fn test_remove_empties_slot() {
        let schema = Schema::new("test");
        let selector = schema.create_selector::<String>();
        let container = schema.create_container();

        container.set(&selector, "hello".to_string());
        let removed = container.remove(&selector).expect("value set");
        assert_eq!(*removed, "hello");
        assert!(container.get(&selector).is_none());
        assert!(container.remove(&selector).is_none());
    }

    #[test]
    fn test_lazy_selector_initializes_once() {
        let schema = Schema::new("test");
        let selector = schema.create_lazy_selector(|| AtomicU32::new(0));
        let container = schema.create_container();

        let counter = container.get(&selector).expect("lazy init");
        counter.fetch_add(7, Ordering::SeqCst);

        let again = container.get(&selector).expect("same slot");
        assert_eq!(again.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_clones_share_slots() {
        let schema = Schema::new("test");
        let selector = schema.create_selector::<u64>();
        let container = schema.create_container();
        let clone = container.clone();

        clone.set(&selector, 9);
        assert_eq!(*container.get(&selector).expect("shared"), 9);
    }

    #[test]
    fn test_selector_minted_after_container() {
        let schema = Schema::new("test");
        let container = schema.create_container();
        let late = schema.create_selector::<bool>();

        container.set(&late, true);
        assert!(*container.get(&late).expect("grown slot"));
    }

    #[test]
    #[should_panic(expected = "selector does not belong")]
    fn test_foreign_selector_panics() {
        let schema = Schema::new("test");
        let other = Schema::new("other");
        let selector = other.create_selector::<i64>();
        let container = schema.create_container();

        container.set(&selector, 1);
    }

    #[test]
    fn test_shared_across_threads() {
        let schema = Schema::new("test");
        let selector = schema.create_lazy_selector(|| AtomicU32::new(0));
        let container = schema.create_container();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let container = container.clone();
                let selector = selector.clone();
                std::thread::spawn(move || {
                    let counter = container.get(&selector).expect("lazy init");
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker thread");
        }

        let counter = container.get(&selector).expect("lazy init");
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }
}

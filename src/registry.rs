//! Thread-safe converter cache keyed by type descriptor.
//!
//! Non-generic types are kept in a per-class slot pair (non-null, nullable);
//! generic types keep a per-class candidate list matched on the full argument
//! list. Each entry remembers the classes its converter was built from so a
//! mapping change for one class can drop every converter that embeds it.
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::descriptor::{ClassId, TypeDescriptor};

/// Converter stored without its type, see `TypeRegistry::get`.
pub(crate) type ErasedConverter = Arc<dyn Any + Send + Sync>;
pub(crate) type Dependencies = Arc<HashSet<ClassId>>;

#[derive(Clone)]
struct Cached {
    converter: ErasedConverter,
    dependencies: Dependencies,
}

impl Cached {
    fn involves(&self, class: ClassId) -> bool { self.dependencies.contains(&class) }
}

#[derive(Default)]
struct Slots {
    non_null: Option<Cached>,
    nullable: Option<Cached>,
}

impl Slots {
    fn slot(&mut self, nullable: bool) -> &mut Option<Cached> {
        if nullable { &mut self.nullable } else { &mut self.non_null }
    }
}

struct Candidate {
    args: Vec<TypeDescriptor>,
    nullable: bool,
    cached: Cached,
}

#[derive(Default)]
pub(crate) struct TypeRegistry {
    simple: RwLock<HashMap<ClassId, Slots>>,
    parameterized: RwLock<HashMap<ClassId, Vec<Candidate>>>,
}

impl TypeRegistry {
    pub(crate) fn new() -> Self { Self::default() }

    /// Typed lookup. A stored converter of another type counts as a miss.
    pub(crate) fn get<C: Clone + 'static>(&self, descriptor: &TypeDescriptor) -> Option<(C, Dependencies)> {
        let cached = self.get_erased(descriptor)?;
        let converter = cached.converter.downcast_ref::<C>()?.clone();
        Some((converter, cached.dependencies))
    }

    fn get_erased(&self, descriptor: &TypeDescriptor) -> Option<Cached> {
        let class = descriptor.class_id()?;
        if descriptor.args().is_empty() {
            let simple = self.simple.read();
            let slots = simple.get(&class)?;
            let slot = if descriptor.is_nullable() { &slots.nullable } else { &slots.non_null };
            return slot.clone();
        }
        let parameterized = self.parameterized.read();
        let mut matches = parameterized.get(&class)?.iter()
            .filter(|c| c.nullable == descriptor.is_nullable() && c.args == descriptor.args());
        let found = matches.next()?;
        // Ambiguous entries are treated as a miss.
        if matches.next().is_some() {
            return None;
        }
        Some(found.cached.clone())
    }

    /// Store `converter` under `descriptor`. Storing the identical converter
    /// again is a no-op; descriptors with placeholders are never stored.
    pub(crate) fn put<C: Send + Sync + 'static>(
        &self,
        descriptor: &TypeDescriptor,
        converter: C,
        same_as: impl Fn(&C) -> bool,
        dependencies: Dependencies,
    ) {
        let Some(class) = descriptor.class_id() else { return };
        if !descriptor.is_concrete() {
            return;
        }
        let fresh = Cached { converter: Arc::new(converter), dependencies };
        let unchanged = |cached: &Cached| cached.converter.downcast_ref::<C>().is_some_and(&same_as);

        if descriptor.args().is_empty() {
            let mut simple = self.simple.write();
            let slot = simple.entry(class).or_default().slot(descriptor.is_nullable());
            if slot.as_ref().is_some_and(|c| unchanged(c)) {
                return;
            }
            *slot = Some(fresh);
            return;
        }

        let mut parameterized = self.parameterized.write();
        let candidates = parameterized.entry(class).or_default();
        let existing = candidates.iter_mut()
            .find(|c| c.nullable == descriptor.is_nullable() && c.args == descriptor.args());
        match existing {
            Some(candidate) if unchanged(&candidate.cached) => {}
            Some(candidate) => candidate.cached = fresh,
            None => candidates.push(Candidate {
                args: descriptor.args().to_vec(),
                nullable: descriptor.is_nullable(),
                cached: fresh,
            }),
        }
    }

    /// Drop every converter for `class` and every converter built on it.
    pub(crate) fn remove(&self, class: ClassId) {
        let mut simple = self.simple.write();
        simple.remove(&class);
        for slots in simple.values_mut() {
            for slot in [&mut slots.non_null, &mut slots.nullable] {
                if slot.as_ref().is_some_and(|c| c.involves(class)) {
                    *slot = None;
                }
            }
        }
        drop(simple);

        let mut parameterized = self.parameterized.write();
        parameterized.remove(&class);
        for candidates in parameterized.values_mut() {
            candidates.retain(|c| !c.cached.involves(class));
        }
    }

    pub(crate) fn clear(&self) {
        self.simple.write().clear();
        self.parameterized.write().clear();
    }

    pub(crate) fn len(&self) -> usize {
        let simple: usize = self.simple.read().values()
            .map(|s| usize::from(s.non_null.is_some()) + usize::from(s.nullable.is_some()))
            .sum();
        let parameterized: usize = self.parameterized.read().values().map(Vec::len).sum();
        simple + parameterized
    }
}

// ------------------------------- Tests ------------------------------------ //

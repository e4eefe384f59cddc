//! Built-in converters: the scalar table keyed by class identity, and the
//! `Typed` impls that route std, chrono and friends into it or into a
//! generic built-in factory.
pub(crate) mod collection;
pub(crate) mod enums;
pub(crate) mod misc;
pub(crate) mod scalar;
pub(crate) mod time;
pub(crate) mod wrapper;

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::convert::{Deserializer, Serializer};
use crate::descriptor::ClassId;
use crate::registry::ErasedConverter;
use crate::shape::Typed;

pub use enums::EnumDef;
pub use wrapper::Opt;

/// Implements `Typed` as a table scalar for each listed type.
macro_rules! scalar_types {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::shape::Typed for $ty {
                fn descriptor() -> $crate::descriptor::TypeDescriptor {
                    $crate::descriptor::TypeDescriptor::of::<Self>()
                }
                fn shape() -> $crate::shape::Shape<Self> { $crate::shape::Shape::Scalar }
            }
        )*
    };
}
pub(crate) use scalar_types;

struct Entry {
    deserializer: ErasedConverter,
    serializer: ErasedConverter,
}

/// Exact class-identity lookup, no subtype matching.
pub(crate) struct BuiltinTable {
    entries: HashMap<ClassId, Entry>,
}

impl BuiltinTable {
    fn standard() -> Self {
        let mut table = Self { entries: HashMap::new() };
        scalar::register(&mut table);
        time::register(&mut table);
        misc::register(&mut table);
        table
    }

    pub(crate) fn add<T, C>(&mut self, converter: C)
    where
        T: Typed,
        C: Deserializer<T> + Serializer<T> + 'static,
    {
        let Some(class) = T::descriptor().class_id() else { return };
        let converter = Arc::new(converter);
        let deserializer: Arc<dyn Deserializer<T>> = converter.clone();
        let serializer: Arc<dyn Serializer<T>> = converter;
        self.entries.insert(class, Entry { deserializer: Arc::new(deserializer), serializer: Arc::new(serializer) });
    }

    pub(crate) fn deserializer<T: 'static>(&self, class: ClassId) -> Option<Arc<dyn Deserializer<T>>> {
        self.entries.get(&class)?.deserializer.downcast_ref::<Arc<dyn Deserializer<T>>>().cloned()
    }

    pub(crate) fn serializer<T: 'static>(&self, class: ClassId) -> Option<Arc<dyn Serializer<T>>> {
        self.entries.get(&class)?.serializer.downcast_ref::<Arc<dyn Serializer<T>>>().cloned()
    }

    pub(crate) fn contains(&self, class: ClassId) -> bool { self.entries.contains_key(&class) }
}

static TABLE: Lazy<BuiltinTable> = Lazy::new(BuiltinTable::standard);

pub(crate) fn table() -> &'static BuiltinTable { &TABLE }

// ------------------------------- Tests ------------------------------------ //

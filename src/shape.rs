//! The `Typed` trait: the runtime type information every convertible type
//! hands to the resolution engine.
use std::sync::Arc;

use crate::class::ClassDef;
use crate::convert::{Deserializer, Serializer};
use crate::descriptor::TypeDescriptor;
use crate::error::Result;
use crate::resolve::Resolver;
use crate::sealed::SealedDef;
use crate::builtin::enums::EnumDef;

/// A Rust type the engine can convert.
///
/// `descriptor` is the cache and precedence key; `shape` tells the engine
/// which resolution step can build a converter for it. Generic types append
/// their arguments' descriptors:
///
/// ```
/// use json_bind::{ClassDef, Shape, TypeDescriptor, Typed};
///
/// struct Wrapper<V> { items: Vec<V> }
///
/// impl<V: Typed> Typed for Wrapper<V> {
///     fn descriptor() -> TypeDescriptor {
///         TypeDescriptor::of::<Self>().with_arg(V::descriptor())
///     }
///     fn shape() -> Shape<Self> {
///         ClassDef::new()
///             .property::<Vec<V>>("items", |w: &Wrapper<V>| &w.items)
///             .into()
///     }
/// }
/// ```
pub trait Typed: Sized + 'static {
    fn descriptor() -> TypeDescriptor;
    fn shape() -> Shape<Self>;
}

/// How a type is converted, in resolution-step terms.
pub enum Shape<T> {
    /// Entry in the built-in scalar table, looked up by class identity.
    Scalar,
    /// Generic built-in (collections, wrappers) with its own factories.
    Builtin(Builtin<T>),
    /// Unit-variant enum written as a JSON string.
    Enum(EnumDef<T>),
    /// Reflective object: constructors, fields and properties.
    Class(ClassDef<T>),
    /// Closed set of subtypes selected by a discriminator property.
    Sealed(SealedDef<T>),
    /// No introspection available.
    Opaque,
}

impl<T> From<ClassDef<T>> for Shape<T> {
    fn from(def: ClassDef<T>) -> Self { Self::Class(def) }
}

impl<T> From<SealedDef<T>> for Shape<T> {
    fn from(def: SealedDef<T>) -> Self { Self::Sealed(def) }
}

impl<T> From<EnumDef<T>> for Shape<T> {
    fn from(def: EnumDef<T>) -> Self { Self::Enum(def) }
}

pub type DeserializerFactory<T> = fn(&mut Resolver<'_>, &TypeDescriptor) -> Result<Arc<dyn Deserializer<T>>>;
pub type SerializerFactory<T> = fn(&mut Resolver<'_>, &TypeDescriptor) -> Result<Arc<dyn Serializer<T>>>;

/// Converter factories for a generic built-in. Each factory receives the
/// resolver so it can resolve its element types recursively.
pub struct Builtin<T> {
    pub(crate) deserializer: DeserializerFactory<T>,
    pub(crate) serializer: SerializerFactory<T>,
}

impl<T> Builtin<T> {
    pub fn new(deserializer: DeserializerFactory<T>, serializer: SerializerFactory<T>) -> Self {
        Self { deserializer, serializer }
    }
}

impl<T> From<Builtin<T>> for Shape<T> {
    fn from(builtin: Builtin<T>) -> Self { Self::Builtin(builtin) }
}

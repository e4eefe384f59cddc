//! Externally registered custom mappings and the precedence rules that pick
//! one for a requested type.
use std::any::{Any, TypeId};
use std::sync::Arc;

use serde_json::Value;

use crate::context::Context;
use crate::convert::{Deserializer, Serializer};
use crate::descriptor::TypeDescriptor;
use crate::error::{JsonError, Result};

type FromJsonFn = Arc<dyn Fn(&Value, &Context<'_>) -> Result<Box<dyn Any>> + Send + Sync>;
type ToJsonFn = Arc<dyn Fn(&dyn Any, &Context<'_>) -> Result<Value> + Send + Sync>;

pub(crate) struct FromJsonMapping {
    pub(crate) key: TypeDescriptor,
    native: TypeId,
    f: FromJsonFn,
}

pub(crate) struct ToJsonMapping {
    pub(crate) key: TypeDescriptor,
    native: TypeId,
    f: ToJsonFn,
}

impl FromJsonMapping {
    pub(crate) fn new<T: 'static>(
        key: TypeDescriptor,
        f: impl Fn(&Value, &Context<'_>) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        let f: FromJsonFn = Arc::new(move |json: &Value, ctx: &Context<'_>| -> Result<Box<dyn Any>> {
            Ok(Box::new(f(json, ctx)?))
        });
        Self { key, native: TypeId::of::<T>(), f }
    }
}

impl ToJsonMapping {
    pub(crate) fn new<T: 'static>(
        key: TypeDescriptor,
        f: impl Fn(&T, &Context<'_>) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        let f: ToJsonFn = Arc::new(move |value: &dyn Any, ctx: &Context<'_>| -> Result<Value> {
            let value = value.downcast_ref::<T>()
                .ok_or_else(|| JsonError::custom(format!("mapping expects a {}", std::any::type_name::<T>())))?;
            f(value, ctx)
        });
        Self { key, native: TypeId::of::<T>(), f }
    }
}

/// Outcome of custom-mapping selection for one requested descriptor.
pub(crate) enum Selected<M> {
    /// A mapping applies at this level.
    Use(M),
    /// A narrower mapping exists below this level (an element of a nullable
    /// type, a sealed variant); structural resolution will reach it.
    Defer,
    None,
}

/// Deserializer over a mapping whose key is the requested type, or its
/// nullable form (a `null` result then fails the non-null request).
pub(crate) struct MappedDeserializer<T> {
    mapping: Arc<FromJsonMapping>,
    target: TypeDescriptor,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: 'static> Deserializer<T> for MappedDeserializer<T> {
    fn deserialize(&self, json: &Value, ctx: &Context<'_>) -> Result<T> {
        let produced = (self.mapping.f)(json, ctx)?;
        let produced = match produced.downcast::<T>() {
            Ok(value) => return Ok(*value),
            Err(other) => other,
        };
        match produced.downcast::<Option<T>>() {
            Ok(value) => (*value).ok_or_else(|| JsonError::null_not_allowed(&self.target)),
            Err(_) => Err(JsonError::custom(format!("mapping for {} produced a foreign value", self.mapping.key))),
        }
    }
}

pub(crate) struct MappedSerializer<T> {
    mapping: Arc<ToJsonMapping>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: 'static> Serializer<T> for MappedSerializer<T> {
    fn serialize(&self, value: &T, ctx: &Context<'_>) -> Result<Value> { (self.mapping.f)(value, ctx) }
}

// --------------------------------- Tables ---------------------------------- //

/// Registration-ordered mapping tables.
#[derive(Clone, Default)]
pub(crate) struct Mappings {
    from_json: Vec<Arc<FromJsonMapping>>,
    to_json: Vec<Arc<ToJsonMapping>>,
}

impl Mappings {
    pub(crate) fn add_from_json(&mut self, mapping: FromJsonMapping) { self.from_json.push(Arc::new(mapping)) }
    pub(crate) fn add_to_json(&mut self, mapping: ToJsonMapping) { self.to_json.push(Arc::new(mapping)) }

    /// Deserialization: keys that are supertypes of (or equal to) `requested`,
    /// narrowest first. For a non-null request the exact key is narrower than
    /// its nullable form; among equal keys the latest registration wins.
    pub(crate) fn deserializer_for<T: 'static>(&self, requested: &TypeDescriptor) -> Selected<MappedDeserializer<T>> {
        let exact = self.from_json.iter().rev()
            .find(|m| m.key == *requested && m.native == TypeId::of::<T>());
        let widened = || {
            self.from_json.iter().rev().find(|m| {
                !requested.is_nullable()
                    && m.key == requested.clone().nullable()
                    && m.native == TypeId::of::<Option<T>>()
            })
        };
        match exact.or_else(widened) {
            Some(mapping) => Selected::Use(MappedDeserializer {
                mapping: mapping.clone(),
                target: requested.clone(),
                _marker: std::marker::PhantomData,
            }),
            None => Selected::None,
        }
    }

    /// Serialization: keys that are subtypes of (or equal to) `requested`.
    /// `variants` lists the sealed subtypes of `requested`, if any.
    pub(crate) fn serializer_for<T: 'static>(
        &self,
        requested: &TypeDescriptor,
        variants: &[TypeDescriptor],
    ) -> Selected<MappedSerializer<T>> {
        let narrower = self.to_json.iter().any(|m| {
            (m.key != *requested && m.key.is_subtype_of(requested))
                || variants.iter().any(|v| m.key.is_subtype_of(v))
        });
        if narrower {
            return Selected::Defer;
        }
        match self.to_json.iter().rev().find(|m| m.key == *requested && m.native == TypeId::of::<T>()) {
            Some(mapping) => Selected::Use(MappedSerializer { mapping: mapping.clone(), _marker: std::marker::PhantomData }),
            None => Selected::None,
        }
    }
}

// ------------------------------- Tests ------------------------------------ //

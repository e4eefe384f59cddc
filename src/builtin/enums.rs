//! Unit-variant enums written as JSON strings.
use std::sync::Arc;

use serde_json::Value;

use crate::context::Context;
use crate::convert::{mismatch, Deserializer, Serializer};
use crate::descriptor::TypeDescriptor;
use crate::error::{JsonError, Result};

type FromName<T> = Arc<dyn Fn(&str) -> Option<T> + Send + Sync>;
type ToName<T> = Arc<dyn Fn(&T) -> Option<&'static str> + Send + Sync>;

/// Name table of a unit enum.
///
/// ```
/// # use json_bind::{EnumDef, Shape, TypeDescriptor, Typed};
/// #[derive(Clone, PartialEq)]
/// enum Color { Red, Green }
///
/// impl Typed for Color {
///     fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
///     fn shape() -> Shape<Self> { EnumDef::new([("RED", Color::Red), ("GREEN", Color::Green)]).into() }
/// }
/// ```
pub struct EnumDef<T> {
    names: Vec<&'static str>,
    from_name: FromName<T>,
    to_name: ToName<T>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> EnumDef<T> {
    pub fn new(variants: impl IntoIterator<Item = (&'static str, T)>) -> Self {
        let variants: Arc<Vec<(&'static str, T)>> = Arc::new(variants.into_iter().collect());
        let names = variants.iter().map(|(name, _)| *name).collect();
        let lookup = variants.clone();
        Self {
            names,
            from_name: Arc::new(move |name: &str| {
                lookup.iter().find(|(n, _)| *n == name).map(|(_, value)| value.clone())
            }),
            to_name: Arc::new(move |value: &T| variants.iter().find(|(_, v)| v == value).map(|(name, _)| *name)),
        }
    }
}

pub(crate) struct EnumConverter<T> {
    class: String,
    def: EnumDef<T>,
}

impl<T> EnumConverter<T> {
    pub(crate) fn new(descriptor: &TypeDescriptor, def: EnumDef<T>) -> Self {
        Self { class: descriptor.to_string(), def }
    }
}

impl<T> Deserializer<T> for EnumConverter<T> {
    fn deserialize(&self, json: &Value, _ctx: &Context<'_>) -> Result<T> {
        let Value::String(name) = json else {
            return Err(mismatch(&self.class, json));
        };
        (self.def.from_name)(name).ok_or_else(|| {
            JsonError::type_mismatch(format!("{} (one of {})", self.class, self.def.names.join(", ")), json)
        })
    }
}

impl<T> Serializer<T> for EnumConverter<T> {
    fn serialize(&self, value: &T, _ctx: &Context<'_>) -> Result<Value> {
        (self.def.to_name)(value)
            .map(|name| Value::String(name.to_string()))
            .ok_or_else(|| JsonError::custom(format!("{} value has no name", self.class)))
    }
}

// ------------------------------- Tests ------------------------------------ //

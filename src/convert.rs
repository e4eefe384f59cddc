//! Converter traits and the type-erased forms the engine stores them in.
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::{FutureExt, LocalBoxFuture};
use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::trace;

use crate::context::Context;
use crate::descriptor::TypeDescriptor;
use crate::error::{JsonError, Result};
use crate::shape::Typed;
use crate::write::{AsyncJsonWriter, JsonWriter};

/// Builds a `T` from a JSON tree.
pub trait Deserializer<T>: Send + Sync {
    fn deserialize(&self, json: &Value, ctx: &Context<'_>) -> Result<T>;

    /// Value used for a constructor parameter whose property is absent.
    /// `None` means the parameter is required.
    fn absent(&self) -> Option<T> { None }

    /// Whether the converted object reads `name` itself. Sealed dispatch
    /// keeps the discriminator in the input only for such converters.
    fn expects_property(&self, _name: &str) -> bool { false }
}

/// Renders a `T` to a JSON tree or a character sink.
pub trait Serializer<T>: Send + Sync {
    fn serialize(&self, value: &T, ctx: &Context<'_>) -> Result<Value>;

    fn write(&self, value: &T, out: &mut JsonWriter<'_>, ctx: &Context<'_>) -> Result<()> {
        let json = self.serialize(value, ctx)?;
        out.value(&json)
    }

    fn write_async<'a>(
        &'a self,
        value: &'a T,
        out: &'a mut AsyncJsonWriter<'_>,
        ctx: &'a Context<'_>,
    ) -> LocalBoxFuture<'a, Result<()>> {
        async move {
            let json = self.serialize(value, ctx)?;
            out.value(&json).await
        }
        .boxed_local()
    }

    /// Whether `value` renders as JSON `null`.
    fn is_null(&self, _value: &T) -> bool { false }

    /// Whether `value` is unset and its property must be omitted entirely.
    fn is_unset(&self, _value: &T) -> bool { false }
}

/// `NullNotAllowed` for `null`, `TypeMismatch` for anything else.
pub fn mismatch(expected: impl std::fmt::Display, json: &Value) -> JsonError {
    if json.is_null() {
        JsonError::null_not_allowed(expected)
    } else {
        JsonError::type_mismatch(expected, json)
    }
}

// --------------------------------- Erasure --------------------------------- //

/// Deserializer over an unknown `T`, used where one collection holds
/// converters of different types (constructor parameters, sealed variants).
pub(crate) trait ErasedDeserializer: Send + Sync {
    fn deserialize_any(&self, json: &Value, ctx: &Context<'_>) -> Result<Box<dyn Any>>;
    fn absent_any(&self) -> Option<Box<dyn Any>>;
    fn expects_property(&self, name: &str) -> bool;
}

pub(crate) trait ErasedSerializer: Send + Sync {
    fn serialize_any(&self, value: &dyn Any, ctx: &Context<'_>) -> Result<Value>;
    fn write_any(&self, value: &dyn Any, out: &mut JsonWriter<'_>, ctx: &Context<'_>) -> Result<()>;
    fn write_any_async<'a>(
        &'a self,
        value: &'a dyn Any,
        out: &'a mut AsyncJsonWriter<'_>,
        ctx: &'a Context<'_>,
    ) -> LocalBoxFuture<'a, Result<()>>;
    fn is_null_any(&self, value: &dyn Any) -> bool;
    fn is_unset_any(&self, value: &dyn Any) -> bool;
}

pub(crate) struct ErasedDe<T>(pub(crate) Arc<dyn Deserializer<T>>);
pub(crate) struct ErasedSer<T>(pub(crate) Arc<dyn Serializer<T>>);

fn foreign_value<T>() -> JsonError {
    JsonError::custom(format!("value is not a {}", std::any::type_name::<T>()))
}

impl<T: 'static> ErasedDeserializer for ErasedDe<T> {
    fn deserialize_any(&self, json: &Value, ctx: &Context<'_>) -> Result<Box<dyn Any>> {
        Ok(Box::new(self.0.deserialize(json, ctx)?))
    }

    fn absent_any(&self) -> Option<Box<dyn Any>> {
        self.0.absent().map(|v| Box::new(v) as Box<dyn Any>)
    }

    fn expects_property(&self, name: &str) -> bool { self.0.expects_property(name) }
}

impl<T: 'static> ErasedSerializer for ErasedSer<T> {
    fn serialize_any(&self, value: &dyn Any, ctx: &Context<'_>) -> Result<Value> {
        let value = value.downcast_ref::<T>().ok_or_else(foreign_value::<T>)?;
        self.0.serialize(value, ctx)
    }

    fn write_any(&self, value: &dyn Any, out: &mut JsonWriter<'_>, ctx: &Context<'_>) -> Result<()> {
        let value = value.downcast_ref::<T>().ok_or_else(foreign_value::<T>)?;
        self.0.write(value, out, ctx)
    }

    fn write_any_async<'a>(
        &'a self,
        value: &'a dyn Any,
        out: &'a mut AsyncJsonWriter<'_>,
        ctx: &'a Context<'_>,
    ) -> LocalBoxFuture<'a, Result<()>> {
        match value.downcast_ref::<T>() {
            Some(value) => self.0.write_async(value, out, ctx),
            None => futures::future::ready(Err(foreign_value::<T>())).boxed_local(),
        }
    }

    fn is_null_any(&self, value: &dyn Any) -> bool {
        value.downcast_ref::<T>().is_some_and(|v| self.0.is_null(v))
    }

    fn is_unset_any(&self, value: &dyn Any) -> bool {
        value.downcast_ref::<T>().is_some_and(|v| self.0.is_unset(v))
    }
}

// ------------------------------ Lazy converters ----------------------------- //

/// Stand-in for a converter whose resolution is still in progress higher up
/// the stack. The real converter is looked up on first use.
pub(crate) struct LazyDeserializer<T> {
    descriptor: TypeDescriptor,
    cell: OnceCell<Arc<dyn Deserializer<T>>>,
}

impl<T> LazyDeserializer<T> {
    pub(crate) fn new(descriptor: TypeDescriptor) -> Self {
        trace!(%descriptor, "deferring recursive deserializer");
        Self { descriptor, cell: OnceCell::new() }
    }
}

impl<T: Typed> LazyDeserializer<T> {
    fn target(&self, ctx: &Context<'_>) -> Result<&Arc<dyn Deserializer<T>>> {
        self.cell.get_or_try_init(|| ctx.config().deserializer_for::<T>(&self.descriptor))
    }
}

impl<T: Typed> Deserializer<T> for LazyDeserializer<T> {
    fn deserialize(&self, json: &Value, ctx: &Context<'_>) -> Result<T> {
        self.target(ctx)?.deserialize(json, ctx)
    }

    fn absent(&self) -> Option<T> { self.cell.get().and_then(|de| de.absent()) }

    fn expects_property(&self, name: &str) -> bool {
        self.cell.get().is_some_and(|de| de.expects_property(name))
    }
}

pub(crate) struct LazySerializer<T> {
    descriptor: TypeDescriptor,
    cell: OnceCell<Arc<dyn Serializer<T>>>,
}

impl<T> LazySerializer<T> {
    pub(crate) fn new(descriptor: TypeDescriptor) -> Self {
        trace!(%descriptor, "deferring recursive serializer");
        Self { descriptor, cell: OnceCell::new() }
    }
}

impl<T: Typed> LazySerializer<T> {
    fn target(&self, ctx: &Context<'_>) -> Result<&Arc<dyn Serializer<T>>> {
        self.cell.get_or_try_init(|| ctx.config().serializer_for::<T>(&self.descriptor))
    }
}

impl<T: Typed> Serializer<T> for LazySerializer<T> {
    fn serialize(&self, value: &T, ctx: &Context<'_>) -> Result<Value> {
        self.target(ctx)?.serialize(value, ctx)
    }

    fn write(&self, value: &T, out: &mut JsonWriter<'_>, ctx: &Context<'_>) -> Result<()> {
        self.target(ctx)?.write(value, out, ctx)
    }

    fn write_async<'a>(
        &'a self,
        value: &'a T,
        out: &'a mut AsyncJsonWriter<'_>,
        ctx: &'a Context<'_>,
    ) -> LocalBoxFuture<'a, Result<()>> {
        match self.target(ctx) {
            Ok(ser) => ser.write_async(value, out, ctx),
            Err(e) => futures::future::ready(Err(e)).boxed_local(),
        }
    }

    fn is_null(&self, value: &T) -> bool { self.cell.get().is_some_and(|s| s.is_null(value)) }
    fn is_unset(&self, value: &T) -> bool { self.cell.get().is_some_and(|s| s.is_unset(value)) }
}

// ----------------------------- Failing converter ---------------------------- //

/// Result of a resolution that found nothing. `null` still fails as a
/// nullability violation so nullable wrappers around it keep working.
pub(crate) struct Failing<T> {
    target: String,
    reason: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Failing<T> {
    pub(crate) fn new(target: &TypeDescriptor, reason: impl Into<String>) -> Self {
        Self { target: target.to_string(), reason: reason.into(), _marker: PhantomData }
    }
}

impl<T> Deserializer<T> for Failing<T> {
    fn deserialize(&self, json: &Value, _ctx: &Context<'_>) -> Result<T> {
        if json.is_null() {
            Err(JsonError::null_not_allowed(&self.target))
        } else {
            Err(JsonError::unresolvable(&self.target, &self.reason))
        }
    }
}

impl<T> Serializer<T> for Failing<T> {
    fn serialize(&self, _value: &T, _ctx: &Context<'_>) -> Result<Value> {
        Err(JsonError::unresolvable(&self.target, &self.reason))
    }
}

// ------------------------------ Function mapping ---------------------------- //

pub(crate) type DeserializeFn<T> = Arc<dyn Fn(&Value, &Context<'_>) -> Result<T> + Send + Sync>;
pub(crate) type SerializeFn<T> = Arc<dyn Fn(&T, &Context<'_>) -> Result<Value> + Send + Sync>;

/// Converter backed by a user function (custom mapping or in-type factory).
pub(crate) struct FnDeserializer<T>(pub(crate) DeserializeFn<T>);
pub(crate) struct FnSerializer<T>(pub(crate) SerializeFn<T>);

impl<T> Deserializer<T> for FnDeserializer<T> {
    fn deserialize(&self, json: &Value, ctx: &Context<'_>) -> Result<T> { (self.0)(json, ctx) }
}

impl<T> Serializer<T> for FnSerializer<T> {
    fn serialize(&self, value: &T, ctx: &Context<'_>) -> Result<Value> { (self.0)(value, ctx) }
}

// ------------------------------- Tests ------------------------------------ //

//! Single-value wrappers: `Option`, `Opt`, smart pointers and cells.
//!
//! `Option<T>` is `T` with the nullable flag, unless `T` is nullable already:
//! a nested option is a nullable `Option` class with `T` as its argument.
//! Every other wrapper is a class of its own with `T` as its argument. Shared pointers register themselves
//! with the context while being serialized, so a value reachable from itself
//! fails with `CircularReference` instead of recursing forever.
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::Value;

use crate::context::Context;
use crate::convert::{Deserializer, Serializer};
use crate::descriptor::TypeDescriptor;
use crate::error::{JsonError, Result};
use crate::resolve::Resolver;
use crate::shape::{Builtin, Shape, Typed};
use crate::write::{AsyncJsonWriter, JsonWriter};

/// Argument `index` of a generic built-in's descriptor.
pub(crate) fn arg(descriptor: &TypeDescriptor, index: usize) -> Result<TypeDescriptor> {
    descriptor.args().get(index).cloned()
        .ok_or_else(|| JsonError::unresolvable(descriptor, format!("missing type argument #{index}")))
}

// --------------------------------- Option ---------------------------------- //

impl<T: Typed> Typed for Option<T> {
    fn descriptor() -> TypeDescriptor {
        let inner = T::descriptor();
        if inner.is_nullable() {
            TypeDescriptor::of::<Self>().with_arg(inner).nullable()
        } else {
            inner.nullable()
        }
    }
    fn shape() -> Shape<Self> { Builtin::new(option_deserializer::<T>, option_serializer::<T>).into() }
}

/// Descriptor of the `T` in `Option<T>`.
fn option_inner<T: Typed>(descriptor: &TypeDescriptor) -> Result<TypeDescriptor> {
    if T::descriptor().is_nullable() { arg(descriptor, 0) } else { Ok(descriptor.clone().non_null()) }
}

struct OptionDeserializer<T>(Arc<dyn Deserializer<T>>);

impl<T> Deserializer<Option<T>> for OptionDeserializer<T> {
    fn deserialize(&self, json: &Value, ctx: &Context<'_>) -> Result<Option<T>> {
        match json {
            Value::Null => Ok(None),
            other => self.0.deserialize(other, ctx).map(Some),
        }
    }

    /// An absent nullable property reads as `null`.
    fn absent(&self) -> Option<Option<T>> { Some(None) }

    fn expects_property(&self, name: &str) -> bool { self.0.expects_property(name) }
}

struct OptionSerializer<T>(Arc<dyn Serializer<T>>);

impl<T> Serializer<Option<T>> for OptionSerializer<T> {
    fn serialize(&self, value: &Option<T>, ctx: &Context<'_>) -> Result<Value> {
        match value {
            Some(inner) => self.0.serialize(inner, ctx),
            None => Ok(Value::Null),
        }
    }

    fn write(&self, value: &Option<T>, out: &mut JsonWriter<'_>, ctx: &Context<'_>) -> Result<()> {
        match value {
            Some(inner) => self.0.write(inner, out, ctx),
            None => out.raw("null"),
        }
    }

    fn write_async<'a>(
        &'a self,
        value: &'a Option<T>,
        out: &'a mut AsyncJsonWriter<'_>,
        ctx: &'a Context<'_>,
    ) -> LocalBoxFuture<'a, Result<()>> {
        match value {
            Some(inner) => self.0.write_async(inner, out, ctx),
            None => async move { out.raw("null").await }.boxed_local(),
        }
    }

    fn is_null(&self, value: &Option<T>) -> bool { value.as_ref().is_none_or(|inner| self.0.is_null(inner)) }
    fn is_unset(&self, value: &Option<T>) -> bool { value.as_ref().is_some_and(|inner| self.0.is_unset(inner)) }
}

fn option_deserializer<T: Typed>(
    resolver: &mut Resolver<'_>,
    descriptor: &TypeDescriptor,
) -> Result<Arc<dyn Deserializer<Option<T>>>> {
    let inner = resolver.deserializer::<T>(&option_inner::<T>(descriptor)?)?;
    Ok(Arc::new(OptionDeserializer(inner)))
}

fn option_serializer<T: Typed>(
    resolver: &mut Resolver<'_>,
    descriptor: &TypeDescriptor,
) -> Result<Arc<dyn Serializer<Option<T>>>> {
    let inner = resolver.serializer::<T>(&option_inner::<T>(descriptor)?)?;
    Ok(Arc::new(OptionSerializer(inner)))
}

// ----------------------------------- Opt ----------------------------------- //

/// A property that may be left out entirely.
///
/// An absent key reads as `Unset`, and `Unset` properties are not written;
/// `Opt<Option<T>>` tells "absent" apart from "explicitly null".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opt<T> {
    Unset,
    Set(T),
}

impl<T> Default for Opt<T> {
    fn default() -> Self { Opt::Unset }
}

impl<T> Opt<T> {
    pub fn is_set(&self) -> bool { matches!(self, Opt::Set(_)) }
    pub fn as_option(&self) -> Option<&T> {
        match self {
            Opt::Set(value) => Some(value),
            Opt::Unset => None,
        }
    }
    pub fn into_option(self) -> Option<T> {
        match self {
            Opt::Set(value) => Some(value),
            Opt::Unset => None,
        }
    }
}

impl<T> From<T> for Opt<T> {
    fn from(value: T) -> Self { Opt::Set(value) }
}

impl<T: Typed> Typed for Opt<T> {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>().with_arg(T::descriptor()) }
    fn shape() -> Shape<Self> { Builtin::new(opt_deserializer::<T>, opt_serializer::<T>).into() }
}

struct OptDeserializer<T>(Arc<dyn Deserializer<T>>);

impl<T> Deserializer<Opt<T>> for OptDeserializer<T> {
    fn deserialize(&self, json: &Value, ctx: &Context<'_>) -> Result<Opt<T>> {
        self.0.deserialize(json, ctx).map(Opt::Set)
    }

    fn absent(&self) -> Option<Opt<T>> { Some(Opt::Unset) }
}

struct OptSerializer<T>(Arc<dyn Serializer<T>>);

impl<T> Serializer<Opt<T>> for OptSerializer<T> {
    fn serialize(&self, value: &Opt<T>, ctx: &Context<'_>) -> Result<Value> {
        match value {
            Opt::Set(inner) => self.0.serialize(inner, ctx),
            Opt::Unset => Ok(Value::Null),
        }
    }

    fn write(&self, value: &Opt<T>, out: &mut JsonWriter<'_>, ctx: &Context<'_>) -> Result<()> {
        match value {
            Opt::Set(inner) => self.0.write(inner, out, ctx),
            Opt::Unset => out.raw("null"),
        }
    }

    fn write_async<'a>(
        &'a self,
        value: &'a Opt<T>,
        out: &'a mut AsyncJsonWriter<'_>,
        ctx: &'a Context<'_>,
    ) -> LocalBoxFuture<'a, Result<()>> {
        match value {
            Opt::Set(inner) => self.0.write_async(inner, out, ctx),
            Opt::Unset => async move { out.raw("null").await }.boxed_local(),
        }
    }

    fn is_null(&self, value: &Opt<T>) -> bool { value.as_option().is_some_and(|inner| self.0.is_null(inner)) }
    fn is_unset(&self, value: &Opt<T>) -> bool { !value.is_set() }
}

fn opt_deserializer<T: Typed>(resolver: &mut Resolver<'_>, descriptor: &TypeDescriptor) -> Result<Arc<dyn Deserializer<Opt<T>>>> {
    Ok(Arc::new(OptDeserializer(resolver.deserializer::<T>(&arg(descriptor, 0)?)?)))
}

fn opt_serializer<T: Typed>(resolver: &mut Resolver<'_>, descriptor: &TypeDescriptor) -> Result<Arc<dyn Serializer<Opt<T>>>> {
    Ok(Arc::new(OptSerializer(resolver.serializer::<T>(&arg(descriptor, 0)?)?)))
}

// ----------------------------- Pointers, cells ----------------------------- //

/// Deserializes `T` and moves it into the wrapper.
struct Wrap<T, W> {
    inner: Arc<dyn Deserializer<T>>,
    wrap: fn(T) -> W,
}

impl<T, W> Deserializer<W> for Wrap<T, W> {
    fn deserialize(&self, json: &Value, ctx: &Context<'_>) -> Result<W> {
        self.inner.deserialize(json, ctx).map(self.wrap)
    }

    fn absent(&self) -> Option<W> { self.inner.absent().map(self.wrap) }
    fn expects_property(&self, name: &str) -> bool { self.inner.expects_property(name) }
}

/// Serializes through a pointer. `identity` is set for shared pointers,
/// which take part in cycle detection.
struct Deref<T: ?Sized, W> {
    inner: Arc<dyn Serializer<T>>,
    class: String,
    get: fn(&W) -> &T,
    identity: Option<fn(&W) -> usize>,
}

impl<T, W> Serializer<W> for Deref<T, W> {
    fn serialize(&self, value: &W, ctx: &Context<'_>) -> Result<Value> {
        let _guard = self.identity.map(|id| ctx.enter(id(value), &self.class)).transpose()?;
        self.inner.serialize((self.get)(value), ctx)
    }

    fn write(&self, value: &W, out: &mut JsonWriter<'_>, ctx: &Context<'_>) -> Result<()> {
        let _guard = self.identity.map(|id| ctx.enter(id(value), &self.class)).transpose()?;
        self.inner.write((self.get)(value), out, ctx)
    }

    fn write_async<'a>(
        &'a self,
        value: &'a W,
        out: &'a mut AsyncJsonWriter<'_>,
        ctx: &'a Context<'_>,
    ) -> LocalBoxFuture<'a, Result<()>> {
        async move {
            let _guard = self.identity.map(|id| ctx.enter(id(value), &self.class)).transpose()?;
            self.inner.write_async((self.get)(value), out, ctx).await
        }
        .boxed_local()
    }

    fn is_null(&self, value: &W) -> bool { self.inner.is_null((self.get)(value)) }
    fn is_unset(&self, value: &W) -> bool { self.inner.is_unset((self.get)(value)) }
}

macro_rules! pointer {
    ($ptr:ident, $de:ident, $ser:ident, $identity:expr) => {
        impl<T: Typed> Typed for $ptr<T> {
            fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>().with_arg(T::descriptor()) }
            fn shape() -> Shape<Self> { Builtin::new($de::<T>, $ser::<T>).into() }
        }

        fn $de<T: Typed>(resolver: &mut Resolver<'_>, descriptor: &TypeDescriptor) -> Result<Arc<dyn Deserializer<$ptr<T>>>> {
            let inner = resolver.deserializer::<T>(&arg(descriptor, 0)?)?;
            Ok(Arc::new(Wrap { inner, wrap: $ptr::new }))
        }

        fn $ser<T: Typed>(resolver: &mut Resolver<'_>, descriptor: &TypeDescriptor) -> Result<Arc<dyn Serializer<$ptr<T>>>> {
            let inner = resolver.serializer::<T>(&arg(descriptor, 0)?)?;
            Ok(Arc::new(Deref {
                inner,
                class: descriptor.to_string(),
                get: |p: &$ptr<T>| &**p,
                identity: $identity,
            }))
        }
    };
}

pointer!(Box, box_deserializer, box_serializer, None);
pointer!(Rc, rc_deserializer, rc_serializer, Some(|p: &Rc<T>| Rc::as_ptr(p).cast::<()>() as usize));
pointer!(Arc, arc_deserializer, arc_serializer, Some(|p: &Arc<T>| Arc::as_ptr(p).cast::<()>() as usize));

/// Serializes the value inside a `RefCell` or `Mutex` while holding the
/// borrow. The streamed sink gets a tree snapshot taken under the borrow, so
/// no borrow or guard lives across an await.
struct Locked<T, W> {
    inner: Arc<dyn Serializer<T>>,
    class: String,
    _marker: PhantomData<fn(&W)>,
}

trait Lock<T> {
    fn with<R>(&self, class: &str, f: impl FnOnce(&T) -> Result<R>) -> Result<R>;
}

impl<T> Lock<T> for RefCell<T> {
    fn with<R>(&self, class: &str, f: impl FnOnce(&T) -> Result<R>) -> Result<R> {
        let borrowed = self.try_borrow()
            .map_err(|_| JsonError::custom(format!("{class} is mutably borrowed")))?;
        f(&borrowed)
    }
}

impl<T> Lock<T> for Mutex<T> {
    fn with<R>(&self, class: &str, f: impl FnOnce(&T) -> Result<R>) -> Result<R> {
        let guard = self.lock().map_err(|_| JsonError::custom(format!("{class} is poisoned")))?;
        f(&guard)
    }
}

impl<T, W: Lock<T>> Serializer<W> for Locked<T, W> {
    fn serialize(&self, value: &W, ctx: &Context<'_>) -> Result<Value> {
        value.with(&self.class, |inner| self.inner.serialize(inner, ctx))
    }

    fn write(&self, value: &W, out: &mut JsonWriter<'_>, ctx: &Context<'_>) -> Result<()> {
        value.with(&self.class, |inner| self.inner.write(inner, out, ctx))
    }

    fn is_null(&self, value: &W) -> bool { value.with(&self.class, |inner| Ok(self.inner.is_null(inner))).unwrap_or(false) }
    fn is_unset(&self, value: &W) -> bool { value.with(&self.class, |inner| Ok(self.inner.is_unset(inner))).unwrap_or(false) }
}

macro_rules! cell {
    ($cell:ident, $de:ident, $ser:ident) => {
        impl<T: Typed> Typed for $cell<T> {
            fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>().with_arg(T::descriptor()) }
            fn shape() -> Shape<Self> { Builtin::new($de::<T>, $ser::<T>).into() }
        }

        fn $de<T: Typed>(resolver: &mut Resolver<'_>, descriptor: &TypeDescriptor) -> Result<Arc<dyn Deserializer<$cell<T>>>> {
            let inner = resolver.deserializer::<T>(&arg(descriptor, 0)?)?;
            Ok(Arc::new(Wrap { inner, wrap: $cell::new }))
        }

        fn $ser<T: Typed>(resolver: &mut Resolver<'_>, descriptor: &TypeDescriptor) -> Result<Arc<dyn Serializer<$cell<T>>>> {
            let inner = resolver.serializer::<T>(&arg(descriptor, 0)?)?;
            Ok(Arc::new(Locked { inner, class: descriptor.to_string(), _marker: PhantomData }))
        }
    };
}

cell!(RefCell, refcell_deserializer, refcell_serializer);
cell!(Mutex, mutex_deserializer, mutex_serializer);

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ErrorKind;
    use crate::fixtures::{Node, Survey};
    use serde_json::json;

    #[test]
    fn nested_options_keep_their_own_cache_entries() {
        let config = Config::new();
        assert_ne!(<Option<Option<i32>>>::descriptor(), <Option<i32>>::descriptor());
        let nested = config.deserializer::<Option<Option<i32>>>().unwrap();
        let flat = config.deserializer::<Option<i32>>().unwrap();
        assert!(Arc::ptr_eq(&nested, &config.deserializer::<Option<Option<i32>>>().unwrap()));
        assert!(Arc::ptr_eq(&flat, &config.deserializer::<Option<i32>>().unwrap()));
        assert_eq!(crate::deserialize::<Option<Option<i32>>>(&json!(7), &config).unwrap(), Some(Some(7)));
        assert_eq!(crate::deserialize::<Option<Option<i32>>>(&json!(null), &config).unwrap(), None);
        assert_eq!(crate::serialize(&Some(None::<i32>), &config).unwrap(), json!(null));
    }

    #[test]
    fn option_maps_null_both_ways() {
        let config = Config::new();
        assert_eq!(crate::deserialize::<Option<i32>>(&json!(null), &config).unwrap(), None);
        assert_eq!(crate::deserialize::<Option<i32>>(&json!(4), &config).unwrap(), Some(4));
        assert_eq!(crate::serialize(&None::<i32>, &config).unwrap(), json!(null));
        assert_eq!(crate::to_string(&Some(4), &config).unwrap(), "4");
    }

    #[test]
    fn opt_distinguishes_absent_from_null() {
        let config = Config::new();
        let absent: Survey = crate::deserialize(&json!({"id": 1}), &config).unwrap();
        assert_eq!(absent.answer, Opt::Unset);
        let null: Survey = crate::deserialize(&json!({"id": 1, "answer": null}), &config).unwrap();
        assert_eq!(null.answer, Opt::Set(None));

        assert_eq!(crate::serialize(&absent, &config).unwrap(), json!({"id": 1}));
        assert_eq!(crate::serialize(&null, &config).unwrap(), json!({"id": 1}));
        let mut loud = Config::new();
        loud.options_mut().include_null_properties = true;
        assert_eq!(crate::serialize(&absent, &loud).unwrap(), json!({"id": 1}));
        assert_eq!(crate::serialize(&null, &loud).unwrap(), json!({"id": 1, "answer": null}));
    }

    #[test]
    fn pointers_and_cells_are_transparent() {
        let config = Config::new();
        let boxed: Box<String> = crate::deserialize(&json!("x"), &config).unwrap();
        assert_eq!(*boxed, "x");
        let shared: Rc<RefCell<Vec<u8>>> = crate::deserialize(&json!([1, 2]), &config).unwrap();
        assert_eq!(*shared.borrow(), vec![1, 2]);
        assert_eq!(crate::serialize(&shared, &config).unwrap(), json!([1, 2]));
        let locked = Arc::new(Mutex::new(7u32));
        assert_eq!(crate::to_string(&locked, &config).unwrap(), "7");
    }

    #[test]
    fn shared_pointer_cycles_are_detected() {
        let config = Config::new();
        let a = Node::new("a");
        let b = Node::new("b");
        a.borrow_mut().next = Some(b.clone());
        b.borrow_mut().next = Some(a.clone());

        let error = crate::serialize(&a, &config).unwrap_err();
        assert!(matches!(error.kind(), ErrorKind::CircularReference { .. }));
        assert_eq!(error.pointer().to_string(), "/next/next");
        assert!(matches!(crate::to_string(&a, &config).unwrap_err().kind(), ErrorKind::CircularReference { .. }));

        b.borrow_mut().next = None;
        assert_eq!(crate::serialize(&a, &config).unwrap(), json!({"name": "a", "next": {"name": "b"}}));
        // the same object twice side by side is not a cycle
        let twice = vec![b.clone(), b.clone()];
        assert_eq!(crate::serialize(&twice, &config).unwrap(), json!([{"name": "b"}, {"name": "b"}]));
        a.borrow_mut().next = None;
    }
}

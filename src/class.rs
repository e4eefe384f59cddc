//! Class metadata: the constructors, settable fields and readable properties
//! a type exposes for object synthesis.
//!
//! ```
//! use json_bind::{ClassDef, Constructor, Shape, TypeDescriptor, Typed};
//!
//! struct Person { first_name: String, age: Option<u32> }
//!
//! impl Typed for Person {
//!     fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
//!     fn shape() -> Shape<Self> {
//!         ClassDef::new()
//!             .constructor(
//!                 Constructor::new(|args| Ok(Person {
//!                     first_name: args.take("firstName")?,
//!                     age: args.take("age")?,
//!                 }))
//!                 .param::<String>("firstName")
//!                 .param::<Option<u32>>("age"),
//!             )
//!             .property::<String>("firstName", |p: &Person| &p.first_name)
//!             .property::<Option<u32>>("age", |p: &Person| &p.age)
//!             .into()
//!     }
//! }
//! ```
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;

use crate::annotation::{Annotation, Annotations, JSON_ALLOW_EXTRA, JSON_IGNORE, JSON_INCLUDE_ALL_PROPERTIES, JSON_INCLUDE_IF_NULL, JSON_NAME};
use crate::context::Context;
use crate::convert::{DeserializeFn, ErasedDeserializer, ErasedSerializer, SerializeFn};
use crate::descriptor::TypeDescriptor;
use crate::error::{ErrorKind, JsonError, Result};
use crate::resolve::{erased_deserializer, erased_serializer, Resolver};
use crate::shape::Typed;

pub(crate) type ResolveDe = fn(&mut Resolver<'_>, &TypeDescriptor, bool) -> Result<Arc<dyn ErasedDeserializer>>;
pub(crate) type ResolveSer = fn(&mut Resolver<'_>, &TypeDescriptor) -> Result<Arc<dyn ErasedSerializer>>;

// -------------------------------- Parameters -------------------------------- //

/// Constructor parameter.
pub struct Param {
    pub(crate) name: Option<&'static str>,
    pub(crate) declared: TypeDescriptor,
    pub(crate) native: TypeDescriptor,
    pub(crate) optional: bool,
    pub(crate) annotations: Annotations,
    pub(crate) resolve: ResolveDe,
}

impl Param {
    pub fn of<U: Typed>(name: &'static str) -> Self { Self::build::<U>(Some(name)) }

    /// Parameter without a name; a constructor using one can't be matched
    /// against JSON properties and is skipped.
    pub fn unnamed<U: Typed>() -> Self { Self::build::<U>(None) }

    fn build<U: Typed>(name: Option<&'static str>) -> Self {
        Self {
            name,
            declared: U::descriptor(),
            native: U::descriptor(),
            optional: false,
            annotations: Annotations::default(),
            resolve: erased_deserializer::<U>,
        }
    }

    /// The parameter has a default; an absent property leaves it out.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Declared type using class type-parameter placeholders, substituted
    /// against the actual arguments when the class is resolved.
    pub fn declared(mut self, declared: TypeDescriptor) -> Self {
        self.declared = declared;
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn rename(self, json_name: &str) -> Self { self.annotate(Annotation::valued(JSON_NAME, json_name)) }
    pub fn ignore(self) -> Self { self.annotate(Annotation::marker(JSON_IGNORE)) }
}

/// Values bound to a constructor's parameters, taken out by name or index.
pub struct Args {
    names: Vec<Option<&'static str>>,
    values: Vec<Option<Box<dyn Any>>>,
}

impl Args {
    pub(crate) fn new(names: Vec<Option<&'static str>>) -> Self {
        let values = names.iter().map(|_| None).collect();
        Self { names, values }
    }

    pub(crate) fn set(&mut self, index: usize, value: Box<dyn Any>) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = Some(value);
        }
    }

    fn index(&self, name: &str) -> Result<usize> {
        self.names.iter().position(|n| *n == Some(name))
            .ok_or_else(|| JsonError::custom(format!("no constructor parameter {name:?}")))
    }

    /// Whether a value was bound for `name`.
    pub fn is_present(&self, name: &str) -> bool {
        self.index(name).is_ok_and(|i| self.values[i].is_some())
    }

    pub fn take<U: 'static>(&mut self, name: &str) -> Result<U> {
        let index = self.index(name)?;
        self.take_at(index)
    }

    pub fn take_at<U: 'static>(&mut self, index: usize) -> Result<U> {
        let label = self.names.get(index).copied().flatten().unwrap_or("?");
        match self.take_slot::<U>(index)? {
            Some(value) => Ok(value),
            None => Err(JsonError::new(ErrorKind::MissingProperty {
                class: "constructor".to_string(),
                names: vec![label.to_string()],
            })),
        }
    }

    /// `None` when the parameter was absent and left to its default.
    pub fn take_opt<U: 'static>(&mut self, name: &str) -> Result<Option<U>> {
        let index = self.index(name)?;
        self.take_slot(index)
    }

    pub fn take_or<U: 'static>(&mut self, name: &str, default: U) -> Result<U> {
        Ok(self.take_opt(name)?.unwrap_or(default))
    }

    pub fn take_or_else<U: 'static>(&mut self, name: &str, default: impl FnOnce() -> U) -> Result<U> {
        Ok(self.take_opt(name)?.unwrap_or_else(default))
    }

    fn take_slot<U: 'static>(&mut self, index: usize) -> Result<Option<U>> {
        let slot = self.values.get_mut(index)
            .ok_or_else(|| JsonError::custom(format!("no constructor parameter #{index}")))?;
        match slot.take() {
            None => Ok(None),
            Some(value) => value.downcast::<U>().map(|v| Some(*v)).map_err(|_| {
                JsonError::custom(format!("constructor parameter #{index} is not a {}", std::any::type_name::<U>()))
            }),
        }
    }
}

pub(crate) type BuildFn<T> = Arc<dyn Fn(&mut Args) -> anyhow::Result<T> + Send + Sync>;

pub struct Constructor<T> {
    pub(crate) params: Vec<Param>,
    pub(crate) build: BuildFn<T>,
}

impl<T> Constructor<T> {
    pub fn new(build: impl Fn(&mut Args) -> anyhow::Result<T> + Send + Sync + 'static) -> Self {
        Self { params: Vec::new(), build: Arc::new(build) }
    }

    pub fn param<U: Typed>(self, name: &'static str) -> Self { self.arg(Param::of::<U>(name)) }
    pub fn optional<U: Typed>(self, name: &'static str) -> Self { self.arg(Param::of::<U>(name).optional()) }

    pub fn arg(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }
}

// ---------------------------------- Fields ---------------------------------- //

pub(crate) type SetFn<T> = Arc<dyn Fn(&mut T, Box<dyn Any>) -> Result<()> + Send + Sync>;

/// Mutable member assigned after construction.
pub struct Field<T> {
    pub(crate) name: &'static str,
    pub(crate) declared: TypeDescriptor,
    pub(crate) native: TypeDescriptor,
    pub(crate) annotations: Annotations,
    pub(crate) resolve: ResolveDe,
    pub(crate) set: SetFn<T>,
}

impl<T: 'static> Field<T> {
    pub fn of<U: Typed>(name: &'static str, set: impl Fn(&mut T, U) + Send + Sync + 'static) -> Self {
        Self {
            name,
            declared: U::descriptor(),
            native: U::descriptor(),
            annotations: Annotations::default(),
            resolve: erased_deserializer::<U>,
            set: Arc::new(move |target: &mut T, value: Box<dyn Any>| -> Result<()> {
                let value = value.downcast::<U>().map_err(|_| {
                    JsonError::custom(format!("field {name} expects a {}", std::any::type_name::<U>()))
                })?;
                set(target, *value);
                Ok(())
            }),
        }
    }

    pub fn declared(mut self, declared: TypeDescriptor) -> Self {
        self.declared = declared;
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn rename(self, json_name: &str) -> Self { self.annotate(Annotation::valued(JSON_NAME, json_name)) }
    pub fn ignore(self) -> Self { self.annotate(Annotation::marker(JSON_IGNORE)) }
}

// -------------------------------- Properties -------------------------------- //

/// A property read during serialization, borrowed or computed.
pub(crate) enum PropertyValue<'a> {
    Borrowed(&'a dyn Any),
    Owned(Box<dyn Any>),
}

impl PropertyValue<'_> {
    pub(crate) fn as_any(&self) -> &dyn Any {
        match self {
            Self::Borrowed(value) => *value,
            Self::Owned(value) => value.as_ref(),
        }
    }
}

pub(crate) trait Getter<T>: Send + Sync {
    fn get<'a>(&self, target: &'a T) -> PropertyValue<'a>;
}

struct ByRef<F, U>(F, PhantomData<fn() -> U>);
struct Computed<F, U>(F, PhantomData<fn() -> U>);

impl<T, U: 'static, F> Getter<T> for ByRef<F, U>
where
    F: Fn(&T) -> &U + Send + Sync,
{
    fn get<'a>(&self, target: &'a T) -> PropertyValue<'a> { PropertyValue::Borrowed((self.0)(target)) }
}

impl<T, U: 'static, F> Getter<T> for Computed<F, U>
where
    F: Fn(&T) -> U + Send + Sync,
{
    fn get<'a>(&self, target: &'a T) -> PropertyValue<'a> { PropertyValue::Owned(Box::new((self.0)(target))) }
}

/// Readable member emitted during serialization.
pub struct Property<T> {
    pub(crate) name: &'static str,
    pub(crate) declared: TypeDescriptor,
    pub(crate) native: TypeDescriptor,
    pub(crate) annotations: Annotations,
    pub(crate) resolve: ResolveSer,
    pub(crate) get: Arc<dyn Getter<T>>,
}

impl<T: 'static> Property<T> {
    pub fn of<U: Typed>(name: &'static str, get: impl Fn(&T) -> &U + Send + Sync + 'static) -> Self {
        Self::with_getter::<U>(name, Arc::new(ByRef(get, PhantomData)))
    }

    /// Property whose value is produced on every read.
    pub fn computed<U: Typed>(name: &'static str, get: impl Fn(&T) -> U + Send + Sync + 'static) -> Self {
        Self::with_getter::<U>(name, Arc::new(Computed(get, PhantomData)))
    }

    fn with_getter<U: Typed>(name: &'static str, get: Arc<dyn Getter<T>>) -> Self {
        Self {
            name,
            declared: U::descriptor(),
            native: U::descriptor(),
            annotations: Annotations::default(),
            resolve: erased_serializer::<U>,
            get,
        }
    }

    pub fn declared(mut self, declared: TypeDescriptor) -> Self {
        self.declared = declared;
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn rename(self, json_name: &str) -> Self { self.annotate(Annotation::valued(JSON_NAME, json_name)) }
    pub fn ignore(self) -> Self { self.annotate(Annotation::marker(JSON_IGNORE)) }
    pub fn include_if_null(self) -> Self { self.annotate(Annotation::marker(JSON_INCLUDE_IF_NULL)) }
}

// ---------------------------------- Class ----------------------------------- //

pub struct ClassDef<T> {
    pub(crate) type_params: Vec<&'static str>,
    pub(crate) annotations: Annotations,
    pub(crate) constructors: Vec<Constructor<T>>,
    pub(crate) fields: Vec<Field<T>>,
    pub(crate) properties: Vec<Property<T>>,
    pub(crate) from_json: Option<DeserializeFn<T>>,
    pub(crate) to_json: Option<SerializeFn<T>>,
}

impl<T: 'static> Default for ClassDef<T> {
    fn default() -> Self { Self::new() }
}

impl<T: 'static> ClassDef<T> {
    pub fn new() -> Self {
        Self {
            type_params: Vec::new(),
            annotations: Annotations::default(),
            constructors: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            from_json: None,
            to_json: None,
        }
    }

    /// Names of the class's type parameters, in declaration order, matched
    /// positionally against the descriptor's arguments.
    pub fn type_params(mut self, names: &[&'static str]) -> Self {
        self.type_params = names.to_vec();
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn allow_extra(self) -> Self { self.annotate(Annotation::marker(JSON_ALLOW_EXTRA)) }
    pub fn include_nulls(self) -> Self { self.annotate(Annotation::marker(JSON_INCLUDE_ALL_PROPERTIES)) }

    pub fn constructor(mut self, constructor: Constructor<T>) -> Self {
        self.constructors.push(constructor);
        self
    }

    pub fn field<U: Typed>(self, name: &'static str, set: impl Fn(&mut T, U) + Send + Sync + 'static) -> Self {
        self.field_def(Field::of(name, set))
    }

    pub fn field_def(mut self, field: Field<T>) -> Self {
        self.fields.push(field);
        self
    }

    pub fn property<U: Typed>(self, name: &'static str, get: impl Fn(&T) -> &U + Send + Sync + 'static) -> Self {
        self.property_def(Property::of(name, get))
    }

    pub fn computed<U: Typed>(self, name: &'static str, get: impl Fn(&T) -> U + Send + Sync + 'static) -> Self {
        self.property_def(Property::computed(name, get))
    }

    pub fn property_def(mut self, property: Property<T>) -> Self {
        self.properties.push(property);
        self
    }

    /// Factory the type supplies for itself; takes precedence over synthesis.
    pub fn from_json(mut self, f: impl Fn(&Value, &Context<'_>) -> Result<T> + Send + Sync + 'static) -> Self {
        self.from_json = Some(Arc::new(f));
        self
    }

    pub fn to_json(mut self, f: impl Fn(&T, &Context<'_>) -> Result<Value> + Send + Sync + 'static) -> Self {
        self.to_json = Some(Arc::new(f));
        self
    }
}

// ------------------------------- Tests ------------------------------------ //

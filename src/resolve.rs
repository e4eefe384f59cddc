//! The resolution engine: finds or builds the converter for a descriptor.
//!
//! Deserialize direction, first success wins:
//! 1. converter cache
//! 2. custom mapping from the configuration, then the type's own `from_json`
//! 3. built-in scalar table, generic built-ins and unit enums
//! 4. sealed (discriminated) types
//! 5. reflective object synthesis
//! 6. a failing converter, which is never cached
//!
//! The serialize direction runs the same steps with serialization mappings.
//! Descriptors currently being resolved are tracked as frames; meeting one
//! again yields a lazy converter that resolves on first use, which breaks the
//! recursion of self-referential types. Frames also collect the classes each
//! converter was built from, stored with the cache entry for invalidation.
use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::builtin::{self, enums};
use crate::class::ClassDef;
use crate::config::{Config, Selected};
use crate::convert::{
    Deserializer, ErasedDe, ErasedDeserializer, ErasedSer, ErasedSerializer, Failing, FnDeserializer,
    FnSerializer, LazyDeserializer, LazySerializer, Serializer,
};
use crate::descriptor::{ClassId, TypeDescriptor};
use crate::error::{JsonError, Result};
use crate::object;
use crate::sealed;
use crate::shape::{Shape, Typed};

struct Frame {
    descriptor: TypeDescriptor,
    dependencies: HashSet<ClassId>,
    /// Cleared when something below could not be resolved for good.
    cacheable: bool,
}

/// A converter plus whether it may be cached.
pub(crate) struct Built<C> {
    pub(crate) converter: C,
    pub(crate) cacheable: bool,
}

impl<C> Built<C> {
    pub(crate) fn cached(converter: C) -> Self { Self { converter, cacheable: true } }
    pub(crate) fn transient(converter: C) -> Self { Self { converter, cacheable: false } }
}

/// One resolution session against a configuration.
pub struct Resolver<'c> {
    config: &'c Config,
    frames: Vec<Frame>,
}

impl<'c> Resolver<'c> {
    pub(crate) fn new(config: &'c Config) -> Self { Self { config, frames: Vec::new() } }

    pub fn config(&self) -> &'c Config { self.config }

    fn in_progress(&self, descriptor: &TypeDescriptor) -> bool {
        self.frames.iter().any(|f| f.descriptor == *descriptor)
    }

    /// Record that the converter being built embeds `descriptor`'s converter.
    fn depend_on(&mut self, descriptor: &TypeDescriptor, dependencies: &HashSet<ClassId>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.dependencies.extend(descriptor.class_id());
            frame.dependencies.extend(dependencies.iter().copied());
        }
    }

    /// Mark the enclosing converters as not cacheable.
    pub(crate) fn taint(&mut self) {
        for frame in &mut self.frames {
            frame.cacheable = false;
        }
    }

    fn push(&mut self, descriptor: &TypeDescriptor) {
        let mut dependencies = HashSet::new();
        dependencies.extend(descriptor.class_id());
        self.frames.push(Frame { descriptor: descriptor.clone(), dependencies, cacheable: true });
    }

    fn pop(&mut self) -> (HashSet<ClassId>, bool) {
        match self.frames.pop() {
            Some(frame) => (frame.dependencies, frame.cacheable),
            None => (HashSet::new(), false),
        }
    }

    // --------------------------- deserializers ---------------------------- //

    /// Deserializer for `T` as described by `descriptor`. Never fails for an
    /// unsupported type; the failing converter reports it on use.
    pub fn deserializer<T: Typed>(&mut self, descriptor: &TypeDescriptor) -> Result<Arc<dyn Deserializer<T>>> {
        self.resolve_deserializer::<T>(descriptor, false)
    }

    /// Like `deserializer` but unsupported types are an error right away.
    pub fn required_deserializer<T: Typed>(&mut self, descriptor: &TypeDescriptor) -> Result<Arc<dyn Deserializer<T>>> {
        self.resolve_deserializer::<T>(descriptor, true)
    }

    fn resolve_deserializer<T: Typed>(
        &mut self,
        descriptor: &TypeDescriptor,
        strict: bool,
    ) -> Result<Arc<dyn Deserializer<T>>> {
        if self.in_progress(descriptor) {
            self.depend_on(descriptor, &HashSet::new());
            return Ok(Arc::new(LazyDeserializer::<T>::new(descriptor.clone())));
        }
        let cache = self.config.deserializers();
        if let Some((converter, dependencies)) = cache.get::<Arc<dyn Deserializer<T>>>(descriptor) {
            trace!(%descriptor, "deserializer cache hit");
            self.depend_on(descriptor, &dependencies);
            return Ok(converter);
        }
        trace!(%descriptor, "deserializer cache miss");

        self.push(descriptor);
        let built = self.build_deserializer::<T>(descriptor);
        let (dependencies, frame_cacheable) = self.pop();
        let built = match built {
            Ok(built) => built,
            Err(reason) if strict => return Err(reason),
            Err(reason) => {
                debug!(%descriptor, %reason, "no deserializer");
                self.taint();
                Built::transient(Arc::new(Failing::<T>::new(descriptor, reason.to_string())) as Arc<dyn Deserializer<T>>)
            }
        };
        if built.cacheable && frame_cacheable {
            let converter = built.converter.clone();
            cache.put(descriptor, converter, |c| Arc::ptr_eq(c, &built.converter), Arc::new(dependencies.clone()));
        } else {
            self.taint();
        }
        self.depend_on(descriptor, &dependencies);
        Ok(built.converter)
    }

    fn build_deserializer<T: Typed>(&mut self, descriptor: &TypeDescriptor) -> Result<Built<Arc<dyn Deserializer<T>>>> {
        if let Selected::Use(mapped) = self.config.mappings().deserializer_for::<T>(descriptor) {
            debug!(%descriptor, "using custom deserialization mapping");
            return Ok(Built::cached(Arc::new(mapped)));
        }
        let shape = T::shape();
        if let Shape::Class(ClassDef { from_json: Some(f), .. }) = &shape {
            debug!(%descriptor, "using the type's own from_json");
            return Ok(Built::cached(Arc::new(FnDeserializer(f.clone()))));
        }
        match shape {
            Shape::Scalar => {
                let class = descriptor.class_id().ok_or_else(|| unbound(descriptor))?;
                builtin::table().deserializer::<T>(class)
                    .map(Built::cached)
                    .ok_or_else(|| JsonError::unresolvable(descriptor, "no built-in converter"))
            }
            Shape::Builtin(factories) => (factories.deserializer)(self, descriptor).map(Built::cached),
            Shape::Enum(def) => Ok(Built::cached(Arc::new(enums::EnumConverter::new(descriptor, def)))),
            Shape::Sealed(def) => {
                let converter = sealed::deserializer(self, def, descriptor)?;
                debug!(%descriptor, "synthesized sealed deserializer");
                Ok(Built::cached(converter))
            }
            Shape::Class(def) => {
                let converter = object::deserializer(self, def, descriptor)?;
                debug!(%descriptor, "synthesized object deserializer");
                Ok(converter)
            }
            Shape::Opaque => Err(JsonError::unresolvable(descriptor, "type exposes no structure")),
        }
    }

    // ---------------------------- serializers ----------------------------- //

    pub fn serializer<T: Typed>(&mut self, descriptor: &TypeDescriptor) -> Result<Arc<dyn Serializer<T>>> {
        self.resolve_serializer::<T>(descriptor, false)
    }

    pub fn required_serializer<T: Typed>(&mut self, descriptor: &TypeDescriptor) -> Result<Arc<dyn Serializer<T>>> {
        self.resolve_serializer::<T>(descriptor, true)
    }

    fn resolve_serializer<T: Typed>(
        &mut self,
        descriptor: &TypeDescriptor,
        strict: bool,
    ) -> Result<Arc<dyn Serializer<T>>> {
        if self.in_progress(descriptor) {
            self.depend_on(descriptor, &HashSet::new());
            return Ok(Arc::new(LazySerializer::<T>::new(descriptor.clone())));
        }
        let cache = self.config.serializers();
        if let Some((converter, dependencies)) = cache.get::<Arc<dyn Serializer<T>>>(descriptor) {
            trace!(%descriptor, "serializer cache hit");
            self.depend_on(descriptor, &dependencies);
            return Ok(converter);
        }
        trace!(%descriptor, "serializer cache miss");

        self.push(descriptor);
        let built = self.build_serializer::<T>(descriptor);
        let (dependencies, frame_cacheable) = self.pop();
        let built = match built {
            Ok(built) => built,
            Err(reason) if strict => return Err(reason),
            Err(reason) => {
                debug!(%descriptor, %reason, "no serializer");
                self.taint();
                Built::transient(Arc::new(Failing::<T>::new(descriptor, reason.to_string())) as Arc<dyn Serializer<T>>)
            }
        };
        if built.cacheable && frame_cacheable {
            let converter = built.converter.clone();
            cache.put(descriptor, converter, |c| Arc::ptr_eq(c, &built.converter), Arc::new(dependencies.clone()));
        } else {
            self.taint();
        }
        self.depend_on(descriptor, &dependencies);
        Ok(built.converter)
    }

    fn build_serializer<T: Typed>(&mut self, descriptor: &TypeDescriptor) -> Result<Built<Arc<dyn Serializer<T>>>> {
        let shape = T::shape();
        let variants = match &shape {
            Shape::Sealed(def) => def.variant_descriptors(),
            _ => Vec::new(),
        };
        match self.config.mappings().serializer_for::<T>(descriptor, &variants) {
            Selected::Use(mapped) => {
                debug!(%descriptor, "using custom serialization mapping");
                return Ok(Built::cached(Arc::new(mapped)));
            }
            Selected::Defer => trace!(%descriptor, "narrower serialization mapping applies below"),
            Selected::None => {}
        }
        if let Shape::Class(ClassDef { to_json: Some(f), .. }) = &shape {
            debug!(%descriptor, "using the type's own to_json");
            return Ok(Built::cached(Arc::new(FnSerializer(f.clone()))));
        }
        match shape {
            Shape::Scalar => {
                let class = descriptor.class_id().ok_or_else(|| unbound(descriptor))?;
                builtin::table().serializer::<T>(class)
                    .map(Built::cached)
                    .ok_or_else(|| JsonError::unresolvable(descriptor, "no built-in converter"))
            }
            Shape::Builtin(factories) => (factories.serializer)(self, descriptor).map(Built::cached),
            Shape::Enum(def) => Ok(Built::cached(Arc::new(enums::EnumConverter::new(descriptor, def)))),
            Shape::Sealed(def) => {
                let converter = sealed::serializer(self, def, descriptor)?;
                debug!(%descriptor, "synthesized sealed serializer");
                Ok(Built::cached(converter))
            }
            Shape::Class(def) => {
                let converter = object::serializer(self, def, descriptor, None)?;
                debug!(%descriptor, "synthesized object serializer");
                Ok(converter)
            }
            Shape::Opaque => Err(JsonError::unresolvable(descriptor, "type exposes no structure")),
        }
    }

    /// Serializer for a sealed variant that writes `tag` first.
    ///
    /// A plain class gets an object serializer with the discriminator built
    /// in; anything else (custom mapping, own `to_json`) is wrapped so the
    /// discriminator is added to the object it produces.
    pub(crate) fn variant_serializer<S: Typed>(
        &mut self,
        descriptor: &TypeDescriptor,
        tag: sealed::Tag,
    ) -> Result<Arc<dyn Serializer<S>>> {
        let mapped = !matches!(self.config.mappings().serializer_for::<S>(descriptor, &[]), Selected::None);
        match S::shape() {
            Shape::Class(def) if !mapped && def.to_json.is_none() => {
                self.push(descriptor);
                let built = object::serializer(self, def, descriptor, Some(tag));
                let (dependencies, cacheable) = self.pop();
                if !cacheable {
                    self.taint();
                }
                self.depend_on(descriptor, &dependencies);
                Ok(built?.converter)
            }
            _ => {
                let inner = self.serializer::<S>(descriptor)?;
                Ok(Arc::new(sealed::Tagged::new(inner, tag)))
            }
        }
    }
}

fn unbound(descriptor: &TypeDescriptor) -> JsonError {
    JsonError::unresolvable(descriptor, "unbound type parameter")
}

// --------------------------- erased entry points ---------------------------- //

/// Resolve a member's converter, checking its declared descriptor against
/// the member's Rust type.
pub(crate) fn erased_deserializer<U: Typed>(
    resolver: &mut Resolver<'_>,
    declared: &TypeDescriptor,
    strict: bool,
) -> Result<Arc<dyn ErasedDeserializer>> {
    check_native::<U>(declared)?;
    let de = resolver.resolve_deserializer::<U>(declared, strict)?;
    Ok(Arc::new(ErasedDe(de)))
}

pub(crate) fn erased_serializer<U: Typed>(
    resolver: &mut Resolver<'_>,
    declared: &TypeDescriptor,
) -> Result<Arc<dyn ErasedSerializer>> {
    check_native::<U>(declared)?;
    let ser = resolver.serializer::<U>(declared)?;
    Ok(Arc::new(ErasedSer(ser)))
}

fn check_native<U: Typed>(declared: &TypeDescriptor) -> Result<()> {
    let native = U::descriptor();
    if *declared == native {
        Ok(())
    } else {
        Err(JsonError::unresolvable(declared, format!("declared type does not describe {native}")))
    }
}

// ------------------------------- Tests ------------------------------------ //

//! Sealed (discriminated) types: a Rust enum whose variants each wrap a class.
//!
//! ```
//! use json_bind::{SealedDef, Shape, TypeDescriptor, Typed};
//! # use json_bind::{ClassDef, Constructor};
//! # struct Person { name: String }
//! # impl Typed for Person {
//! #     fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
//! #     fn shape() -> Shape<Self> {
//! #         ClassDef::new()
//! #             .constructor(Constructor::new(|a| Ok(Person { name: a.take("name")? })).param::<String>("name"))
//! #             .property::<String>("name", |p: &Person| &p.name)
//! #             .into()
//! #     }
//! # }
//!
//! enum Party { Person(Person) }
//!
//! impl Typed for Party {
//!     fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
//!     fn shape() -> Shape<Self> {
//!         SealedDef::new()
//!             .discriminator("type")
//!             .variant_as::<Person>("PERSON", Party::Person, |p| match p { Party::Person(x) => Some(x) })
//!             .into()
//!     }
//! }
//! ```
use std::any::Any;
use std::sync::Arc;

use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::{Map, Value};

use crate::annotation::{Annotation, Annotations, JSON_DISCRIMINATOR, JSON_IDENTIFIER};
use crate::context::Context;
use crate::convert::{mismatch, Deserializer, ErasedDeserializer, ErasedSerializer, Serializer};
use crate::descriptor::TypeDescriptor;
use crate::error::{ErrorKind, JsonError, Result};
use crate::resolve::{erased_deserializer, Resolver};
use crate::shape::Typed;
use crate::write::{AsyncJsonWriter, JsonWriter};

type WrapFn<T> = Arc<dyn Fn(Box<dyn Any>) -> Result<T> + Send + Sync>;
type ResolveVariantSer = fn(&mut Resolver<'_>, &TypeDescriptor, Tag) -> Result<Arc<dyn ErasedSerializer>>;

trait Project<T>: Send + Sync {
    fn project<'a>(&self, value: &'a T) -> Option<&'a dyn Any>;
}

struct Projection<F, S>(F, std::marker::PhantomData<fn() -> S>);

impl<T, S: 'static, F> Project<T> for Projection<F, S>
where
    F: Fn(&T) -> Option<&S> + Send + Sync,
{
    fn project<'a>(&self, value: &'a T) -> Option<&'a dyn Any> { (self.0)(value).map(|s| s as &dyn Any) }
}

/// One permitted subtype.
pub struct Variant<T> {
    descriptor: TypeDescriptor,
    annotations: Annotations,
    resolve_de: fn(&mut Resolver<'_>, &TypeDescriptor, bool) -> Result<Arc<dyn ErasedDeserializer>>,
    resolve_ser: ResolveVariantSer,
    wrap: WrapFn<T>,
    project: Arc<dyn Project<T>>,
}

impl<T: 'static> Variant<T> {
    /// `wrap` lifts the subtype into the sealed type; `project` recognises
    /// it in a sealed value.
    pub fn of<S: Typed>(
        wrap: impl Fn(S) -> T + Send + Sync + 'static,
        project: impl Fn(&T) -> Option<&S> + Send + Sync + 'static,
    ) -> Self {
        Self {
            descriptor: S::descriptor(),
            annotations: Annotations::default(),
            resolve_de: erased_deserializer::<S>,
            resolve_ser: variant_serializer::<S>,
            wrap: Arc::new(move |value: Box<dyn Any>| -> Result<T> {
                let value = value.downcast::<S>()
                    .map_err(|_| JsonError::custom(format!("variant expects a {}", std::any::type_name::<S>())))?;
                Ok(wrap(*value))
            }),
            project: Arc::new(Projection(project, std::marker::PhantomData)),
        }
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Discriminator value naming this variant; defaults to the subtype name.
    pub fn identifier(self, identifier: &str) -> Self { self.annotate(Annotation::valued(JSON_IDENTIFIER, identifier)) }
}

fn variant_serializer<S: Typed>(
    resolver: &mut Resolver<'_>,
    descriptor: &TypeDescriptor,
    tag: Tag,
) -> Result<Arc<dyn ErasedSerializer>> {
    let ser = resolver.variant_serializer::<S>(descriptor, tag)?;
    Ok(Arc::new(crate::convert::ErasedSer(ser)))
}

pub struct SealedDef<T> {
    annotations: Annotations,
    variants: Vec<Variant<T>>,
}

impl<T: 'static> Default for SealedDef<T> {
    fn default() -> Self { Self::new() }
}

impl<T: 'static> SealedDef<T> {
    pub fn new() -> Self { Self { annotations: Annotations::default(), variants: Vec::new() } }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Discriminator property for this type, overriding the configured one.
    pub fn discriminator(self, name: &str) -> Self { self.annotate(Annotation::valued(JSON_DISCRIMINATOR, name)) }

    pub fn variant<S: Typed>(
        self,
        wrap: impl Fn(S) -> T + Send + Sync + 'static,
        project: impl Fn(&T) -> Option<&S> + Send + Sync + 'static,
    ) -> Self {
        self.variant_def(Variant::of(wrap, project))
    }

    pub fn variant_as<S: Typed>(
        self,
        identifier: &str,
        wrap: impl Fn(S) -> T + Send + Sync + 'static,
        project: impl Fn(&T) -> Option<&S> + Send + Sync + 'static,
    ) -> Self {
        self.variant_def(Variant::of(wrap, project).identifier(identifier))
    }

    pub fn variant_def(mut self, variant: Variant<T>) -> Self {
        self.variants.push(variant);
        self
    }

    pub(crate) fn variant_descriptors(&self) -> Vec<TypeDescriptor> {
        self.variants.iter().map(|v| v.descriptor.clone()).collect()
    }
}

/// Discriminator property name: the type's own override, else the name
/// configured at conversion time.
fn discriminator_name<'a>(fixed: Option<&'a str>, ctx: &'a Context<'_>) -> &'a str {
    fixed.unwrap_or(&ctx.config().options().sealed_discriminator_name)
}

/// Discriminator pair written in front of a variant's properties.
#[derive(Clone, Debug)]
pub(crate) struct Tag {
    name: Option<String>,
    value: String,
}

impl Tag {
    pub(crate) fn new(name: Option<String>, value: String) -> Self { Self { name, value } }

    pub(crate) fn name<'a>(&'a self, ctx: &'a Context<'_>) -> &'a str { discriminator_name(self.name.as_deref(), ctx) }

    pub(crate) fn value(&self) -> &str { &self.value }
}

fn identifier_of<T>(resolver: &Resolver<'_>, variant: &Variant<T>) -> String {
    match resolver.config().policy().identifier(&variant.annotations) {
        Some(identifier) => identifier.to_string(),
        None => variant.descriptor.class_id().map(|c| c.simple_name()).unwrap_or_default().to_string(),
    }
}

// ------------------------------ Deserializing ------------------------------- //

struct VariantDe<T> {
    identifier: String,
    de: Arc<dyn ErasedDeserializer>,
    wrap: WrapFn<T>,
}

pub(crate) struct SealedDeserializer<T> {
    class: String,
    /// Class-level override; otherwise the configured name is read per call.
    discriminator: Option<String>,
    variants: Vec<VariantDe<T>>,
}

pub(crate) fn deserializer<T: 'static>(
    resolver: &mut Resolver<'_>,
    def: SealedDef<T>,
    descriptor: &TypeDescriptor,
) -> Result<Arc<dyn Deserializer<T>>> {
    let policy = resolver.config().policy();
    let discriminator = policy.discriminator(&def.annotations).map(str::to_string);
    let mut variants = Vec::with_capacity(def.variants.len());
    for variant in def.variants {
        let identifier = identifier_of(resolver, &variant);
        let de = (variant.resolve_de)(resolver, &variant.descriptor, false)?;
        variants.push(VariantDe { identifier, de, wrap: variant.wrap });
    }
    Ok(Arc::new(SealedDeserializer { class: descriptor.to_string(), discriminator, variants }))
}

impl<T> SealedDeserializer<T> {
    fn discriminator_name<'a>(&'a self, ctx: &'a Context<'_>) -> &'a str {
        discriminator_name(self.discriminator.as_deref(), ctx)
    }
}

impl<T: 'static> Deserializer<T> for SealedDeserializer<T> {
    fn deserialize(&self, json: &Value, ctx: &Context<'_>) -> Result<T> {
        let Value::Object(object) = json else {
            return Err(mismatch(&self.class, json));
        };
        let name = self.discriminator_name(ctx);
        let Some(Value::String(tag)) = object.get(name) else {
            return Err(ErrorKind::MissingDiscriminator { class: self.class.clone(), name: name.to_string() }.into());
        };
        let Some(variant) = self.variants.iter().find(|v| v.identifier == *tag) else {
            let error: JsonError = ErrorKind::UnknownDiscriminatorValue {
                class: self.class.clone(),
                name: name.to_string(),
                value: tag.clone(),
            }.into();
            return Err(error.within(name));
        };
        let value = if variant.de.expects_property(name) {
            variant.de.deserialize_any(json, ctx)?
        } else {
            let stripped: Map<String, Value> = object.iter()
                .filter(|(key, _)| key.as_str() != name)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            variant.de.deserialize_any(&Value::Object(stripped), ctx)?
        };
        (variant.wrap)(value)
    }
}

// ------------------------------- Serializing -------------------------------- //

struct VariantSer<T> {
    ser: Arc<dyn ErasedSerializer>,
    project: Arc<dyn Project<T>>,
}

/// Dispatches on the runtime variant of the value.
pub(crate) struct SealedSerializer<T> {
    class: String,
    variants: Vec<VariantSer<T>>,
}

pub(crate) fn serializer<T: 'static>(
    resolver: &mut Resolver<'_>,
    def: SealedDef<T>,
    descriptor: &TypeDescriptor,
) -> Result<Arc<dyn Serializer<T>>> {
    let name = resolver.config().policy().discriminator(&def.annotations).map(str::to_string);
    let mut variants = Vec::with_capacity(def.variants.len());
    for variant in def.variants {
        let identifier = identifier_of(resolver, &variant);
        let ser = (variant.resolve_ser)(resolver, &variant.descriptor, Tag::new(name.clone(), identifier))?;
        variants.push(VariantSer { ser, project: variant.project });
    }
    Ok(Arc::new(SealedSerializer { class: descriptor.to_string(), variants }))
}

impl<T> SealedSerializer<T> {
    fn dispatch<'a>(&'a self, value: &'a T) -> Result<(&'a VariantSer<T>, &'a dyn Any)> {
        self.variants.iter()
            .find_map(|v| v.project.project(value).map(|inner| (v, inner)))
            .ok_or_else(|| JsonError::custom(format!("value of {} matches no declared variant", self.class)))
    }
}

impl<T: 'static> Serializer<T> for SealedSerializer<T> {
    fn serialize(&self, value: &T, ctx: &Context<'_>) -> Result<Value> {
        let (variant, inner) = self.dispatch(value)?;
        variant.ser.serialize_any(inner, ctx)
    }

    fn write(&self, value: &T, out: &mut JsonWriter<'_>, ctx: &Context<'_>) -> Result<()> {
        let (variant, inner) = self.dispatch(value)?;
        variant.ser.write_any(inner, out, ctx)
    }

    fn write_async<'a>(
        &'a self,
        value: &'a T,
        out: &'a mut AsyncJsonWriter<'_>,
        ctx: &'a Context<'_>,
    ) -> LocalBoxFuture<'a, Result<()>> {
        match self.dispatch(value) {
            Ok((variant, inner)) => variant.ser.write_any_async(inner, out, ctx),
            Err(e) => futures::future::ready(Err(e)).boxed_local(),
        }
    }
}

/// Puts the discriminator pair in front of another serializer's object.
pub(crate) struct Tagged<S> {
    inner: Arc<dyn Serializer<S>>,
    tag: Tag,
}

impl<S> Tagged<S> {
    pub(crate) fn new(inner: Arc<dyn Serializer<S>>, tag: Tag) -> Self { Self { inner, tag } }
}

impl<S> Serializer<S> for Tagged<S> {
    fn serialize(&self, value: &S, ctx: &Context<'_>) -> Result<Value> {
        let name = self.tag.name(ctx);
        match self.inner.serialize(value, ctx)? {
            Value::Object(body) => {
                let mut tagged = Map::with_capacity(body.len() + 1);
                tagged.insert(name.to_string(), Value::String(self.tag.value().to_string()));
                tagged.extend(body.into_iter().filter(|(key, _)| key != name));
                Ok(Value::Object(tagged))
            }
            other => Err(JsonError::type_mismatch(format!("object for variant {}", self.tag.value()), &other)),
        }
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::fixtures::{Badge, Circle, Figure, Organization, Party, Person, Token};
    use serde_json::json;

    #[test]
    fn discriminator_selects_the_variant() {
        let config = Config::new();
        let party: Party = crate::deserialize(&json!({"type": "PERSON", "firstName": "A", "lastName": "B"}), &config).unwrap();
        assert!(matches!(party, Party::Person(ref p) if p.first_name == "A"));

        let org: Party = crate::deserialize(&json!({"type": "Organization", "name": "Acme"}), &config).unwrap();
        assert!(matches!(org, Party::Organization(Organization { ref name }) if name == "Acme"));
    }

    #[test]
    fn discriminator_failures() {
        let config = Config::new();
        let unknown = crate::deserialize::<Party>(&json!({"type": "ROBOT"}), &config).unwrap_err();
        assert!(matches!(unknown.kind(), ErrorKind::UnknownDiscriminatorValue { value, .. } if value == "ROBOT"));
        assert_eq!(unknown.pointer().to_string(), "/type");

        let missing = crate::deserialize::<Party>(&json!({"firstName": "A"}), &config).unwrap_err();
        assert!(matches!(missing.kind(), ErrorKind::MissingDiscriminator { .. }));
        let not_a_string = crate::deserialize::<Party>(&json!({"type": 1}), &config).unwrap_err();
        assert!(matches!(not_a_string.kind(), ErrorKind::MissingDiscriminator { .. }));
    }

    #[test]
    fn serialization_writes_the_discriminator_first() {
        let config = Config::new();
        let party = Party::Person(Person::new("A", "B"));
        let text = crate::to_string(&party, &config).unwrap();
        assert_eq!(text, r#"{"type":"PERSON","firstName":"A","lastName":"B"}"#);
        let back: Party = crate::from_str(&text, &config).unwrap();
        assert!(matches!(back, Party::Person(_)));
    }

    #[test]
    fn configured_discriminator_is_read_per_call() {
        let mut config = Config::new();
        let circle = Figure::Circle(Circle { radius: 2.0 });
        assert_eq!(crate::serialize(&circle, &config).unwrap(), json!({"class": "Circle", "radius": 2.0}));

        config.options_mut().sealed_discriminator_name = "kind".into();
        let text = crate::to_string(&circle, &config).unwrap();
        assert_eq!(text, r#"{"kind":"Circle","radius":2.0}"#);
        assert_eq!(crate::from_str::<Figure>(&text, &config).unwrap(), circle);
        let parsed: Figure = crate::deserialize(&json!({"kind": "Circle", "radius": 1.5}), &config).unwrap();
        assert!(matches!(parsed, Figure::Circle(c) if c.radius == 1.5));
    }

    #[test]
    fn mapped_variants_are_tagged() {
        let mut config = Config::new();
        config.add_to_json::<Organization>(|org: &Organization, _: &Context<'_>| Ok(json!({"title": org.name})));
        let party = Party::Organization(Organization { name: "Acme".into() });
        assert_eq!(crate::to_string(&party, &config).unwrap(), r#"{"type":"Organization","title":"Acme"}"#);
    }

    #[test]
    fn variants_with_their_own_to_json_are_tagged() {
        let config = Config::new();
        let badge = Token::Badge(Badge { label: "gold".into() });
        let text = crate::to_string(&badge, &config).unwrap();
        assert_eq!(text, r#"{"class":"Badge","text":"gold"}"#);
        assert_eq!(crate::from_str::<Token>(&text, &config).unwrap(), badge);

        let circle = Token::Circle(Circle { radius: 1.0 });
        assert_eq!(crate::serialize(&circle, &config).unwrap(), json!({"class": "Circle", "radius": 1.0}));
    }
}

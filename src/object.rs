//! Reflective object converters synthesised from a `ClassDef`.
//!
//! Deserialization picks the constructor whose parameters best match the
//! keys of the input object, builds the value, then assigns the remaining
//! keys through settable fields. Serialization writes readable properties in
//! declaration order, with an optional discriminator pair first.
use std::collections::HashSet;
use std::sync::Arc;

use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::{Map, Value};
use tracing::debug;

use crate::annotation::AnnotationPolicy;
use crate::class::{BuildFn, ClassDef, Constructor, Getter, SetFn};
use crate::context::{descend, Context};
use crate::convert::{mismatch, Deserializer, ErasedDeserializer, ErasedSerializer, Serializer};
use crate::descriptor::TypeDescriptor;
use crate::error::{ErrorKind, JsonError, PathToken, Result};
use crate::resolve::{Built, Resolver};
use crate::sealed::Tag;
use crate::write::{AsyncJsonWriter, JsonWriter};

// ------------------------------ Deserializing ------------------------------- //

struct ParamSlot {
    json_name: String,
    /// `None` for ignored parameters, which are always left to their default.
    de: Option<Arc<dyn ErasedDeserializer>>,
    optional: bool,
    /// The converter supplies a value for an absent property.
    defaultable: bool,
}

struct ConstructorPlan<T> {
    params: Vec<ParamSlot>,
    names: Vec<Option<&'static str>>,
    build: BuildFn<T>,
}

impl<T> ConstructorPlan<T> {
    /// Number of parameters present in `object`; `None` when a required one
    /// is missing.
    fn score(&self, object: &Map<String, Value>) -> Option<usize> {
        let mut score = 0;
        for slot in self.params.iter().filter(|s| s.de.is_some()) {
            if object.contains_key(&slot.json_name) {
                score += 1;
            } else if !(slot.optional || slot.defaultable) {
                return None;
            }
        }
        Some(score)
    }

    fn missing(&self, object: &Map<String, Value>) -> Vec<String> {
        self.params.iter()
            .filter(|s| s.de.is_some() && !s.optional && !s.defaultable && !object.contains_key(&s.json_name))
            .map(|s| s.json_name.clone())
            .collect()
    }

    fn consumes(&self, key: &str) -> bool {
        self.params.iter().any(|s| s.de.is_some() && s.json_name == key)
    }
}

struct FieldSlot<T> {
    json_name: String,
    de: Arc<dyn ErasedDeserializer>,
    set: SetFn<T>,
}

pub(crate) struct ObjectDeserializer<T> {
    class: String,
    constructors: Vec<ConstructorPlan<T>>,
    fields: Vec<FieldSlot<T>>,
    ignored: HashSet<String>,
    allow_extra: bool,
}

/// Build the deserializer for `def` as the class described by `descriptor`.
pub(crate) fn deserializer<T: 'static>(
    resolver: &mut Resolver<'_>,
    def: ClassDef<T>,
    descriptor: &TypeDescriptor,
) -> Result<Built<Arc<dyn Deserializer<T>>>> {
    let policy = resolver.config().policy();
    let class = descriptor.to_string();
    let mut ignored = HashSet::new();

    let mut constructors = Vec::new();
    let mut rejected = Vec::new();
    for (index, constructor) in def.constructors.into_iter().enumerate() {
        match plan_constructor(resolver, policy, constructor, &def.type_params, descriptor) {
            Ok(plan) => constructors.push(plan),
            Err(reason) => {
                debug!(%descriptor, index, %reason, "constructor skipped");
                rejected.push(format!("constructor #{index}: {}", reason.kind()));
            }
        }
    }
    if constructors.is_empty() {
        let reason = if rejected.is_empty() { "no constructors".to_string() } else { rejected.join("; ") };
        return Err(JsonError::unresolvable(descriptor, reason));
    }
    for plan in &constructors {
        ignored.extend(plan.params.iter().filter(|s| s.de.is_none()).map(|s| s.json_name.clone()));
    }

    let mut fields = Vec::new();
    for field in def.fields {
        let json_name = policy.property_name(field.name, &field.annotations)?;
        if policy.is_ignored(&field.annotations) {
            ignored.insert(json_name);
            continue;
        }
        let resolved = field.declared.substitute(&def.type_params, descriptor.args())
            .map_err(|name| unbound(descriptor, name))
            .and_then(|actual| (field.resolve)(resolver, &actual, false));
        match resolved {
            Ok(de) => fields.push(FieldSlot { json_name, de, set: field.set }),
            Err(reason) => debug!(%descriptor, field = field.name, %reason, "field skipped"),
        }
    }
    for property in &def.properties {
        if policy.is_ignored(&property.annotations) {
            ignored.insert(policy.property_name(property.name, &property.annotations)?);
        }
    }

    Ok(Built::cached(Arc::new(ObjectDeserializer {
        class,
        constructors,
        fields,
        ignored,
        allow_extra: policy.allows_extra(&def.annotations),
    })))
}

fn plan_constructor<T>(
    resolver: &mut Resolver<'_>,
    policy: &AnnotationPolicy,
    constructor: Constructor<T>,
    type_params: &[&'static str],
    descriptor: &TypeDescriptor,
) -> Result<ConstructorPlan<T>> {
    let mut params = Vec::with_capacity(constructor.params.len());
    let mut names = Vec::with_capacity(constructor.params.len());
    for param in constructor.params {
        let declared_name = param.name
            .ok_or_else(|| JsonError::unresolvable(descriptor, "parameter without a name"))?;
        let json_name = policy.property_name(declared_name, &param.annotations)?;
        names.push(param.name);
        if policy.is_ignored(&param.annotations) {
            if !param.optional {
                return Err(JsonError::unresolvable(descriptor, format!("ignored parameter {declared_name} has no default")));
            }
            params.push(ParamSlot { json_name, de: None, optional: true, defaultable: false });
            continue;
        }
        let actual = param.declared.substitute(type_params, descriptor.args())
            .map_err(|name| unbound(descriptor, name))?;
        let strict = !(param.optional || actual.is_nullable());
        let de = (param.resolve)(resolver, &actual, strict)?;
        let defaultable = de.absent_any().is_some();
        params.push(ParamSlot { json_name, de: Some(de), optional: param.optional, defaultable });
    }
    Ok(ConstructorPlan { params, names, build: constructor.build })
}

fn unbound(descriptor: &TypeDescriptor, name: &str) -> JsonError {
    JsonError::unresolvable(descriptor, format!("unbound type parameter {name}"))
}

impl<T> ObjectDeserializer<T> {
    fn select(&self, object: &Map<String, Value>) -> Result<&ConstructorPlan<T>> {
        let mut best: Option<(&ConstructorPlan<T>, usize)> = None;
        for plan in &self.constructors {
            if let Some(score) = plan.score(object) {
                // Strictly greater: the first declared constructor wins ties.
                if best.is_none_or(|(_, top)| score > top) {
                    best = Some((plan, score));
                }
            }
        }
        if let Some((plan, _)) = best {
            return Ok(plan);
        }
        let kind = match self.constructors.as_slice() {
            [only] => ErrorKind::MissingProperty { class: self.class.clone(), names: only.missing(object) },
            _ => ErrorKind::NoMatchingConstructor { class: self.class.clone(), keys: object.keys().cloned().collect() },
        };
        Err(kind.into())
    }

    fn check_unmatched(&self, plan: &ConstructorPlan<T>, object: &Map<String, Value>, ctx: &Context<'_>) -> Result<()> {
        if self.allow_extra || ctx.config().options().allow_extra_properties {
            return Ok(());
        }
        let unmatched: Vec<String> = object.keys()
            .filter(|key| {
                !plan.consumes(key)
                    && !self.fields.iter().any(|f| f.json_name == **key)
                    && !self.ignored.contains(*key)
            })
            .cloned()
            .collect();
        if unmatched.is_empty() {
            Ok(())
        } else {
            Err(ErrorKind::UnexpectedProperties { class: self.class.clone(), names: unmatched }.into())
        }
    }
}

impl<T: 'static> Deserializer<T> for ObjectDeserializer<T> {
    fn deserialize(&self, json: &Value, ctx: &Context<'_>) -> Result<T> {
        let Value::Object(object) = json else {
            return Err(mismatch(&self.class, json));
        };
        let plan = self.select(object)?;
        self.check_unmatched(plan, object, ctx)?;

        let mut args = crate::class::Args::new(plan.names.clone());
        for (index, slot) in plan.params.iter().enumerate() {
            let Some(de) = &slot.de else { continue };
            match object.get(&slot.json_name) {
                Some(value) => {
                    let token = PathToken::from(slot.json_name.as_str());
                    args.set(index, descend(ctx, token, |child| de.deserialize_any(value, child))?);
                }
                None if slot.optional => {}
                None => {
                    if let Some(value) = de.absent_any() {
                        args.set(index, value);
                    }
                }
            }
        }
        let mut value = (plan.build)(&mut args).map_err(|e| JsonError::construction(&self.class, e))?;

        for field in &self.fields {
            if plan.consumes(&field.json_name) {
                continue;
            }
            if let Some(json) = object.get(&field.json_name) {
                let token = PathToken::from(field.json_name.as_str());
                let member = descend(ctx, token.clone(), |child| field.de.deserialize_any(json, child))?;
                (field.set)(&mut value, member).map_err(|e| e.within(token))?;
            }
        }
        Ok(value)
    }

    fn expects_property(&self, name: &str) -> bool {
        self.constructors.iter().any(|c| c.consumes(name)) || self.fields.iter().any(|f| f.json_name == name)
    }
}

// ------------------------------- Serializing -------------------------------- //

struct PropertySlot<T> {
    json_name: String,
    include_if_null: bool,
    ser: Arc<dyn ErasedSerializer>,
    get: Arc<dyn Getter<T>>,
}

pub(crate) struct ObjectSerializer<T> {
    class: String,
    tag: Option<Tag>,
    properties: Vec<PropertySlot<T>>,
    include_all: bool,
}

pub(crate) fn serializer<T: 'static>(
    resolver: &mut Resolver<'_>,
    def: ClassDef<T>,
    descriptor: &TypeDescriptor,
    tag: Option<Tag>,
) -> Result<Built<Arc<dyn Serializer<T>>>> {
    let policy = resolver.config().policy();
    let mut properties = Vec::with_capacity(def.properties.len());
    for property in def.properties {
        if policy.is_ignored(&property.annotations) {
            continue;
        }
        let json_name = policy.property_name(property.name, &property.annotations)?;
        let actual = property.declared.substitute(&def.type_params, descriptor.args())
            .map_err(|name| unbound(descriptor, name))?;
        let ser = (property.resolve)(resolver, &actual)?;
        properties.push(PropertySlot {
            json_name,
            include_if_null: policy.includes_if_null(&property.annotations),
            ser,
            get: property.get,
        });
    }
    Ok(Built::cached(Arc::new(ObjectSerializer {
        class: descriptor.to_string(),
        tag,
        properties,
        include_all: policy.includes_all_properties(&def.annotations),
    })))
}

impl<T> ObjectSerializer<T> {
    /// The discriminator pair, with its name as configured for this call.
    fn tag<'a>(&'a self, ctx: &'a Context<'_>) -> Option<(&'a str, &'a str)> {
        self.tag.as_ref().map(|tag| (tag.name(ctx), tag.value()))
    }

    fn emits(&self, slot: &PropertySlot<T>, value: &dyn std::any::Any, ctx: &Context<'_>) -> bool {
        if self.tag.as_ref().is_some_and(|tag| tag.name(ctx) == slot.json_name) || slot.ser.is_unset_any(value) {
            return false;
        }
        !slot.ser.is_null_any(value)
            || slot.include_if_null
            || self.include_all
            || ctx.config().options().include_null_properties
    }
}

impl<T: 'static> Serializer<T> for ObjectSerializer<T> {
    fn serialize(&self, value: &T, ctx: &Context<'_>) -> Result<Value> {
        let mut map = Map::new();
        if let Some((name, tag)) = self.tag(ctx) {
            map.insert(name.to_string(), Value::String(tag.to_string()));
        }
        for slot in &self.properties {
            let member = slot.get.get(value);
            let member = member.as_any();
            if !self.emits(slot, member, ctx) {
                continue;
            }
            let token = PathToken::from(slot.json_name.as_str());
            let json = descend(ctx, token, |child| slot.ser.serialize_any(member, child))?;
            map.insert(slot.json_name.clone(), json);
        }
        Ok(Value::Object(map))
    }

    fn write(&self, value: &T, out: &mut JsonWriter<'_>, ctx: &Context<'_>) -> Result<()> {
        out.begin_object()?;
        let mut first = true;
        if let Some((name, tag)) = self.tag(ctx) {
            out.key(name)?;
            out.value(&Value::String(tag.to_string()))?;
            first = false;
        }
        for slot in &self.properties {
            let member = slot.get.get(value);
            let member = member.as_any();
            if !self.emits(slot, member, ctx) {
                continue;
            }
            if !first {
                out.comma()?;
            }
            first = false;
            out.key(&slot.json_name)?;
            let token = PathToken::from(slot.json_name.as_str());
            descend(ctx, token, |child| slot.ser.write_any(member, out, child))?;
        }
        out.end_object()
    }

    fn write_async<'a>(
        &'a self,
        value: &'a T,
        out: &'a mut AsyncJsonWriter<'_>,
        ctx: &'a Context<'_>,
    ) -> LocalBoxFuture<'a, Result<()>> {
        async move {
            out.begin_object().await?;
            let mut first = true;
            if let Some((name, tag)) = self.tag(ctx) {
                out.key(name).await?;
                out.value(&Value::String(tag.to_string())).await?;
                out.boundary().await?;
                first = false;
            }
            for slot in &self.properties {
                let member = slot.get.get(value);
                let member = member.as_any();
                if !self.emits(slot, member, ctx) {
                    continue;
                }
                if !first {
                    out.comma().await?;
                }
                first = false;
                out.key(&slot.json_name).await?;
                let child = ctx.child(slot.json_name.as_str());
                slot.ser.write_any_async(member, out, &child).await
                    .map_err(|e| e.within(slot.json_name.as_str()))?;
                out.boundary().await?;
            }
            out.end_object().await
        }
        .boxed_local()
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::fixtures::{Account, Holder, Outer, Person, Point, Positional, Profile, Reading};
    use serde_json::json;

    fn kind_of<T: crate::shape::Typed + std::fmt::Debug>(json: Value, config: &Config) -> ErrorKind {
        crate::deserialize::<T>(&json, config).unwrap_err().into_kind()
    }

    #[test]
    fn best_match_picks_the_widest_satisfied_constructor() {
        let config = Config::new();
        let both: Point = crate::deserialize(&json!({"a": 1, "b": 2}), &config).unwrap();
        assert_eq!(both, Point { a: 1, b: 2, via: "(a,b)" });
        let one: Point = crate::deserialize(&json!({"a": 1}), &config).unwrap();
        assert_eq!(one, Point { a: 1, b: 0, via: "(a)" });
    }

    #[test]
    fn unmatched_keys_fail_unless_extras_are_allowed() {
        let mut config = Config::new();
        match kind_of::<Point>(json!({"a": 1, "c": 3}), &config) {
            ErrorKind::UnexpectedProperties { names, .. } => assert_eq!(names, vec!["c".to_string()]),
            other => panic!("unexpected {other:?}"),
        }
        config.options_mut().allow_extra_properties = true;
        let point: Point = crate::deserialize(&json!({"a": 1, "c": 3}), &config).unwrap();
        assert_eq!(point.via, "(a)");
    }

    #[test]
    fn no_satisfied_constructor() {
        let config = Config::new();
        assert!(matches!(kind_of::<Point>(json!({"b": 2}), &config), ErrorKind::NoMatchingConstructor { .. }));
        match kind_of::<Person>(json!({"age": 3}), &config) {
            ErrorKind::MissingProperty { names, .. } => assert_eq!(names, vec!["firstName", "lastName"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn error_path_points_at_the_nested_property() {
        let config = Config::new();
        let error = crate::deserialize::<Outer>(
            &json!({"inner": {"field1": "abc", "field2": "bad", "field3": 10}}),
            &config,
        ).unwrap_err();
        assert_eq!(error.pointer().to_string(), "/inner/field2");
        assert!(matches!(error.kind(), ErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn null_respects_declared_nullability() {
        let config = Config::new();
        let error = crate::deserialize::<Person>(&json!({"firstName": null, "lastName": "B"}), &config).unwrap_err();
        assert!(matches!(error.kind(), ErrorKind::NullNotAllowed { .. }));
        assert_eq!(error.pointer().to_string(), "/firstName");

        let person: Person = crate::deserialize(&json!({"firstName": "A", "lastName": "B", "age": null}), &config).unwrap();
        assert_eq!(person.age, None);
    }

    #[test]
    fn fields_are_assigned_after_construction() {
        let config = Config::new();
        let account: Account = crate::deserialize(&json!({"id": 7, "note": "vip"}), &config).unwrap();
        assert_eq!(account.id, 7);
        assert_eq!(account.note.as_deref(), Some("vip"));
    }

    #[test]
    fn renamed_and_ignored_members() {
        let config = Config::new();
        let profile: Profile = crate::deserialize(&json!({"display_name": "ada", "cache": 1}), &config).unwrap();
        assert_eq!(profile.name, "ada");
        assert_eq!(profile.cache, 0);
        assert_eq!(crate::serialize(&profile, &config).unwrap(), json!({"display_name": "ada"}));
    }

    #[test]
    fn null_properties_are_skipped_unless_included() {
        let mut config = Config::new();
        let person = Person::new("A", "B");
        assert_eq!(crate::serialize(&person, &config).unwrap(), json!({"firstName": "A", "lastName": "B"}));
        config.options_mut().include_null_properties = true;
        assert_eq!(
            crate::serialize(&person, &config).unwrap(),
            json!({"firstName": "A", "lastName": "B", "age": null}),
        );
    }

    #[test]
    fn construction_failures_keep_their_cause() {
        let config = Config::new();
        let error = crate::deserialize::<Account>(&json!({"id": -1}), &config).unwrap_err();
        match error.kind() {
            ErrorKind::ConstructionFailed { cause, .. } => assert_eq!(cause.to_string(), "id must not be negative"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn generic_members_are_substituted() {
        let config = Config::new();
        let holder: Holder<i64> = crate::deserialize(&json!({"items": [1, 2], "first": 1}), &config).unwrap();
        assert_eq!(holder.items, vec![1, 2]);
        assert_eq!(crate::serialize(&holder, &config).unwrap(), json!({"items": [1, 2], "first": 1}));
        let error = crate::deserialize::<Holder<i64>>(&json!({"items": ["x"], "first": 1}), &config).unwrap_err();
        assert_eq!(error.pointer().to_string(), "/items/0");
    }

    #[test]
    fn sinks_produce_identical_text() {
        let config = Config::new();
        let person = Person { first_name: "A\"q".into(), last_name: "B".into(), age: Some(4) };
        let tree = crate::serialize(&person, &config).unwrap().to_string();
        let text = crate::to_string(&person, &config).unwrap();
        let mut sink = futures::io::Cursor::new(Vec::new());
        futures::executor::block_on(crate::write_json_async(&person, &mut sink, &config)).unwrap();
        assert_eq!(tree, text);
        assert_eq!(String::from_utf8(sink.into_inner()).unwrap(), text);
    }

    #[test]
    fn constructors_with_unnamed_parameters_are_skipped() {
        let config = Config::new();
        let reading: Reading = crate::deserialize(&json!({"value": 1.5}), &config).unwrap();
        assert_eq!(reading, Reading { value: 1.5, via: "named" });
        assert!(matches!(kind_of::<Positional>(json!({"value": 1.5}), &config), ErrorKind::UnresolvableType { .. }));
    }
}

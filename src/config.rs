//! Caller-owned configuration: option switches, annotation policy, custom
//! mapping tables and the two converter caches derived from them.
//!
//! Mutators take `&mut self`, so a configuration can't change while shared
//! with concurrent conversions; each mutator invalidates the affected cache
//! entries before it returns.
mod mapping;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::annotation::AnnotationPolicy;
use crate::context::Context;
use crate::convert::{mismatch, Deserializer, Serializer};
use crate::descriptor::TypeDescriptor;
use crate::error::{JsonError, Result};
use crate::path_de;
use crate::registry::TypeRegistry;
use crate::resolve::Resolver;
use crate::shape::Typed;

pub(crate) use mapping::{FromJsonMapping, Mappings, Selected, ToJsonMapping};

// --------------------------------- Options --------------------------------- //

/// Scalar switches, read at conversion time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Options {
    /// Ignore object keys no constructor parameter or field consumes.
    pub allow_extra_properties: bool,
    /// Emit properties whose value is `null`.
    pub include_null_properties: bool,
    /// Discriminator property for sealed types without their own.
    #[serde(alias = "sealedTypeDiscriminatorName")]
    pub sealed_discriminator_name: String,
    pub big_integer_as_string: bool,
    pub big_decimal_as_string: bool,
    /// Flush a streamed sink after every array element and object property.
    pub flush_each_element: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            allow_extra_properties: false,
            include_null_properties: false,
            sealed_discriminator_name: "class".to_string(),
            big_integer_as_string: false,
            big_decimal_as_string: false,
            flush_each_element: false,
        }
    }
}

impl Options {
    pub fn from_json_str(text: &str) -> Result<Self> { path_de::from_str_with_path(text) }
    pub fn from_json_value(value: Value) -> Result<Self> { path_de::from_value_with_path(value) }
}

// --------------------------------- Config ---------------------------------- //

pub struct Config {
    options: Options,
    policy: AnnotationPolicy,
    mappings: Mappings,
    deserializers: TypeRegistry,
    serializers: TypeRegistry,
}

static SHARED: Lazy<Config> = Lazy::new(Config::new);

impl Default for Config {
    fn default() -> Self { Self::new() }
}

/// Same options, policy and mappings; fresh caches.
impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            options: self.options.clone(),
            policy: self.policy.clone(),
            mappings: self.mappings.clone(),
            deserializers: TypeRegistry::new(),
            serializers: TypeRegistry::new(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("options", &self.options)
            .field("policy", &self.policy)
            .field("cached_deserializers", &self.deserializers.len())
            .field("cached_serializers", &self.serializers.len())
            .finish()
    }
}

impl Config {
    pub fn new() -> Self { Self::with_options(Options::default()) }

    pub fn with_options(options: Options) -> Self {
        Self {
            options,
            policy: AnnotationPolicy::default(),
            mappings: Mappings::default(),
            deserializers: TypeRegistry::new(),
            serializers: TypeRegistry::new(),
        }
    }

    /// Process-wide default configuration. It has no mappings and can't be
    /// mutated; clone it to customise.
    pub fn shared() -> &'static Config { &SHARED }

    pub fn from_json_str(text: &str) -> Result<Self> { Ok(Self::with_options(Options::from_json_str(text)?)) }

    pub fn options(&self) -> &Options { &self.options }

    /// Option switches are read per conversion; changing them keeps caches.
    pub fn options_mut(&mut self) -> &mut Options { &mut self.options }

    pub fn policy(&self) -> &AnnotationPolicy { &self.policy }

    pub(crate) fn mappings(&self) -> &Mappings { &self.mappings }
    pub(crate) fn deserializers(&self) -> &TypeRegistry { &self.deserializers }
    pub(crate) fn serializers(&self) -> &TypeRegistry { &self.serializers }

    // ----------------------------- annotations ---------------------------- //

    fn extend_policy(&mut self, role: fn(&mut AnnotationPolicy) -> &mut Vec<String>, name: &str) {
        role(&mut self.policy).push(name.to_string());
        self.clear_caches();
    }

    pub fn add_name_annotation(&mut self, name: &str) { self.extend_policy(|p| &mut p.name, name) }
    pub fn add_ignore_annotation(&mut self, name: &str) { self.extend_policy(|p| &mut p.ignore, name) }
    pub fn add_include_if_null_annotation(&mut self, name: &str) { self.extend_policy(|p| &mut p.include_if_null, name) }
    pub fn add_include_all_properties_annotation(&mut self, name: &str) { self.extend_policy(|p| &mut p.include_all_properties, name) }
    pub fn add_allow_extra_annotation(&mut self, name: &str) { self.extend_policy(|p| &mut p.allow_extra, name) }
    pub fn add_discriminator_annotation(&mut self, name: &str) { self.extend_policy(|p| &mut p.discriminator, name) }
    pub fn add_identifier_annotation(&mut self, name: &str) { self.extend_policy(|p| &mut p.identifier, name) }

    pub fn clear_caches(&mut self) {
        debug!("clearing converter caches");
        self.deserializers.clear();
        self.serializers.clear();
    }

    // ------------------------------ mappings ------------------------------ //

    /// Custom deserialization for `T`, preferred over every built-in and
    /// reflective converter.
    pub fn add_from_json<T: Typed>(&mut self, f: impl Fn(&Value, &Context<'_>) -> Result<T> + Send + Sync + 'static) {
        let key = T::descriptor();
        self.invalidate_deserializers(&key);
        self.mappings.add_from_json(FromJsonMapping::new(key, f));
    }

    /// Custom deserialization that only accepts a JSON object.
    pub fn add_from_json_object<T: Typed>(
        &mut self,
        f: impl Fn(&Map<String, Value>, &Context<'_>) -> Result<T> + Send + Sync + 'static,
    ) {
        self.add_from_json(move |json: &Value, ctx: &Context<'_>| match json {
            Value::Object(map) => f(map, ctx),
            other => Err(mismatch(T::descriptor(), other)),
        })
    }

    pub fn add_from_json_array<T: Typed>(
        &mut self,
        f: impl Fn(&[Value], &Context<'_>) -> Result<T> + Send + Sync + 'static,
    ) {
        self.add_from_json(move |json: &Value, ctx: &Context<'_>| match json {
            Value::Array(items) => f(items, ctx),
            other => Err(mismatch(T::descriptor(), other)),
        })
    }

    pub fn add_from_json_string<T: Typed>(
        &mut self,
        f: impl Fn(&str, &Context<'_>) -> Result<T> + Send + Sync + 'static,
    ) {
        self.add_from_json(move |json: &Value, ctx: &Context<'_>| match json {
            Value::String(s) => f(s, ctx),
            other => Err(mismatch(T::descriptor(), other)),
        })
    }

    pub fn add_to_json<T: Typed>(&mut self, f: impl Fn(&T, &Context<'_>) -> Result<Value> + Send + Sync + 'static) {
        let key = T::descriptor();
        self.invalidate_serializers(&key);
        self.mappings.add_to_json(ToJsonMapping::new(key, f));
    }

    /// Both directions through `Display` and `FromStr`.
    pub fn add_string_mapping<T>(&mut self)
    where
        T: Typed + FromStr + fmt::Display,
        T::Err: fmt::Display,
    {
        self.add_from_json_string(|s: &str, _: &Context<'_>| {
            s.parse::<T>().map_err(|e| JsonError::construction(T::descriptor(), anyhow::anyhow!("{e}")))
        });
        self.add_to_json(|value: &T, _: &Context<'_>| Ok(Value::String(value.to_string())));
    }

    fn invalidate_deserializers(&self, key: &TypeDescriptor) {
        if let Some(class) = key.class_id() {
            debug!(%class, "invalidating cached deserializers");
            self.deserializers.remove(class);
        }
    }

    fn invalidate_serializers(&self, key: &TypeDescriptor) {
        if let Some(class) = key.class_id() {
            debug!(%class, "invalidating cached serializers");
            self.serializers.remove(class);
        }
    }

    // ----------------------------- resolution ----------------------------- //

    pub fn deserializer<T: Typed>(&self) -> Result<Arc<dyn Deserializer<T>>> {
        self.deserializer_for::<T>(&T::descriptor())
    }

    /// Deserializer for `T` under an explicit descriptor; the descriptor must
    /// describe `T`.
    pub fn deserializer_for<T: Typed>(&self, descriptor: &TypeDescriptor) -> Result<Arc<dyn Deserializer<T>>> {
        Resolver::new(self).deserializer::<T>(descriptor)
    }

    pub fn serializer<T: Typed>(&self) -> Result<Arc<dyn Serializer<T>>> {
        self.serializer_for::<T>(&T::descriptor())
    }

    pub fn serializer_for<T: Typed>(&self, descriptor: &TypeDescriptor) -> Result<Arc<dyn Serializer<T>>> {
        Resolver::new(self).serializer::<T>(descriptor)
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fixtures::{Person, Point};
    use serde_json::json;

    #[test]
    fn options_load_camel_case_with_defaults() {
        let options = Options::from_json_str(r#"{"allowExtraProperties": true, "bigIntegerAsString": true}"#).unwrap();
        assert!(options.allow_extra_properties);
        assert!(options.big_integer_as_string);
        assert_eq!(options.sealed_discriminator_name, "class");

        let aliased = Options::from_json_value(json!({"sealedTypeDiscriminatorName": "kind"})).unwrap();
        assert_eq!(aliased.sealed_discriminator_name, "kind");
    }

    #[test]
    fn bad_option_reports_its_path() {
        let error = Config::from_json_str(r#"{"includeNullProperties": "yes"}"#).unwrap_err();
        assert!(matches!(error.kind(), ErrorKind::InvalidOption(_)));
        assert_eq!(error.pointer().to_string(), "/includeNullProperties");
        assert!(Options::from_json_str(r#"{"noSuchOption": 1}"#).is_err());
    }

    #[test]
    fn clone_keeps_tables_but_not_caches() {
        let mut config = Config::new();
        config.add_from_json::<Person>(|_: &Value, _: &Context<'_>| Ok(Person::new("Mapped", "Person")));
        config.deserializer::<Person>().unwrap();
        assert!(config.deserializers().len() > 0);

        let derived = config.clone();
        assert_eq!(derived.deserializers().len(), 0);
        let person: Person = crate::deserialize(&json!({}), &derived).unwrap();
        assert_eq!(person.first_name, "Mapped");
    }

    #[test]
    fn adding_a_mapping_drops_dependent_entries() {
        let mut config = Config::new();
        config.deserializer::<Vec<Person>>().unwrap();
        config.deserializer::<bool>().unwrap();
        let before = config.deserializers().len();
        assert!(before >= 3);

        config.add_from_json::<Person>(|_: &Value, _: &Context<'_>| Ok(Person::new("Mapped", "Person")));
        assert!(config.deserializers().get::<Arc<dyn Deserializer<bool>>>(&TypeDescriptor::of::<bool>()).is_some());
        assert!(config.deserializers().get::<Arc<dyn Deserializer<Person>>>(&Person::descriptor()).is_none());
        assert!(config.deserializers().get::<Arc<dyn Deserializer<Vec<Person>>>>(&<Vec<Person>>::descriptor()).is_none());

        let people: Vec<Person> = crate::deserialize(&json!([{}]), &config).unwrap();
        assert_eq!(people[0].first_name, "Mapped");
    }

    #[test]
    fn annotation_change_clears_everything() {
        let mut config = Config::new();
        config.deserializer::<bool>().unwrap();
        config.serializer::<bool>().unwrap();
        config.add_ignore_annotation("Transient");
        assert_eq!(config.deserializers().len(), 0);
        assert_eq!(config.serializers().len(), 0);
    }

    #[test]
    fn string_mapping_goes_both_ways() {
        let mut config = Config::new();
        config.add_string_mapping::<std::net::Ipv4Addr>();
        let addr: std::net::Ipv4Addr = crate::deserialize(&json!("10.0.0.1"), &config).unwrap();
        assert_eq!(crate::serialize(&addr, &config).unwrap(), json!("10.0.0.1"));
        let error = crate::deserialize::<std::net::Ipv4Addr>(&json!("nope"), &config).unwrap_err();
        assert!(matches!(error.kind(), ErrorKind::ConstructionFailed { .. }));
    }

    #[test]
    fn shape_narrowed_mappings_reject_other_json() {
        let mut config = Config::new();
        config.add_from_json_array::<Point>(|items: &[Value], _: &Context<'_>| {
            let coordinate = |i: usize| {
                items.get(i).and_then(Value::as_i64).map(|v| v as i32).ok_or_else(|| JsonError::custom("two integers expected"))
            };
            Ok(Point { a: coordinate(0)?, b: coordinate(1)?, via: "array" })
        });
        assert_eq!(crate::deserialize::<Point>(&json!([1, 2]), &config).unwrap(), Point { a: 1, b: 2, via: "array" });
        let error = crate::deserialize::<Vec<Point>>(&json!([{"a": 1}]), &config).unwrap_err();
        assert!(matches!(error.kind(), ErrorKind::TypeMismatch { .. }));
        assert_eq!(error.pointer().to_string(), "/0");

        config.add_from_json_object::<Person>(|object: &Map<String, Value>, _: &Context<'_>| {
            Ok(Person::new(object.get("name").and_then(Value::as_str).unwrap_or_default(), ""))
        });
        assert_eq!(crate::deserialize::<Person>(&json!({"name": "Ada"}), &config).unwrap().first_name, "Ada");
        let error = crate::deserialize::<Person>(&json!("Ada"), &config).unwrap_err();
        assert!(matches!(error.kind(), ErrorKind::TypeMismatch { .. }));
    }
}

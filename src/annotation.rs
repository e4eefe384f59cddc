//! Metadata markers attached to classes, parameters and properties, and the
//! configurable policy deciding which marker names mean what.
use crate::error::{JsonError, Result};

pub const JSON_NAME: &str = "JSONName";
pub const JSON_IGNORE: &str = "JSONIgnore";
pub const JSON_INCLUDE_IF_NULL: &str = "JSONIncludeIfNull";
pub const JSON_INCLUDE_ALL_PROPERTIES: &str = "JSONIncludeAllProperties";
pub const JSON_ALLOW_EXTRA: &str = "JSONAllowExtra";
pub const JSON_DISCRIMINATOR: &str = "JSONDiscriminator";
pub const JSON_IDENTIFIER: &str = "JSONIdentifier";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    name: String,
    value: Option<String>,
}

impl Annotation {
    /// Annotation without an argument, e.g. `JSONIgnore`.
    pub fn marker(name: impl Into<String>) -> Self { Self { name: name.into(), value: None } }

    /// Annotation carrying a string argument, e.g. `JSONName("first_name")`.
    pub fn valued(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: Some(value.into()) }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn value(&self) -> Option<&str> { self.value.as_deref() }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Annotations(Vec<Annotation>);

impl Annotations {
    pub fn push(&mut self, annotation: Annotation) { self.0.push(annotation) }
    pub fn iter(&self) -> impl Iterator<Item = &Annotation> { self.0.iter() }

    fn find<'a>(&'a self, names: &'a [String]) -> impl Iterator<Item = &'a Annotation> {
        self.0.iter().filter(move |a| names.iter().any(|n| *n == a.name))
    }
}

// --------------------------------- Policy ---------------------------------- //

/// One list of annotation names per role. Any annotation whose name appears
/// in a role's list plays that role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationPolicy {
    pub(crate) name: Vec<String>,
    pub(crate) ignore: Vec<String>,
    pub(crate) include_if_null: Vec<String>,
    pub(crate) include_all_properties: Vec<String>,
    pub(crate) allow_extra: Vec<String>,
    pub(crate) discriminator: Vec<String>,
    pub(crate) identifier: Vec<String>,
}

impl Default for AnnotationPolicy {
    fn default() -> Self {
        let one = |name: &str| vec![name.to_string()];
        Self {
            name: one(JSON_NAME),
            ignore: one(JSON_IGNORE),
            include_if_null: one(JSON_INCLUDE_IF_NULL),
            include_all_properties: one(JSON_INCLUDE_ALL_PROPERTIES),
            allow_extra: one(JSON_ALLOW_EXTRA),
            discriminator: one(JSON_DISCRIMINATOR),
            identifier: one(JSON_IDENTIFIER),
        }
    }
}

impl AnnotationPolicy {
    /// External property name: the value of the first naming annotation, or
    /// the declared name. A naming annotation without a value is an error.
    pub fn property_name(&self, declared: &str, annotations: &Annotations) -> Result<String> {
        match annotations.find(&self.name).next() {
            None => Ok(declared.to_string()),
            Some(a) => a.value().map(str::to_string).ok_or_else(|| {
                JsonError::custom(format!("{} on {declared} needs a name", a.name()))
            }),
        }
    }

    pub fn is_ignored(&self, annotations: &Annotations) -> bool { annotations.find(&self.ignore).next().is_some() }

    pub fn includes_if_null(&self, annotations: &Annotations) -> bool {
        annotations.find(&self.include_if_null).next().is_some()
    }

    pub fn includes_all_properties(&self, annotations: &Annotations) -> bool {
        annotations.find(&self.include_all_properties).next().is_some()
    }

    pub fn allows_extra(&self, annotations: &Annotations) -> bool {
        annotations.find(&self.allow_extra).next().is_some()
    }

    pub fn discriminator<'a>(&'a self, annotations: &'a Annotations) -> Option<&'a str> {
        annotations.find(&self.discriminator).find_map(Annotation::value)
    }

    pub fn identifier<'a>(&'a self, annotations: &'a Annotations) -> Option<&'a str> {
        annotations.find(&self.identifier).find_map(Annotation::value)
    }
}

// ------------------------------- Tests ------------------------------------ //

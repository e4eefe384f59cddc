//! Type-directed JSON binding.
//!
//! Types describe themselves through [`Typed`]; the engine resolves (and
//! caches per [`Config`]) a converter for each type descriptor and runs it
//! against a `serde_json::Value` tree, a `fmt::Write` / `io::Write` sink or a
//! streamed `AsyncWrite` sink.
//!
//! ```
//! use json_bind::{ClassDef, Config, Constructor, Shape, TypeDescriptor, Typed};
//! use serde_json::json;
//!
//! struct User { name: String, admin: bool }
//!
//! impl Typed for User {
//!     fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
//!     fn shape() -> Shape<Self> {
//!         ClassDef::new()
//!             .constructor(
//!                 Constructor::new(|args| Ok(User { name: args.take("name")?, admin: args.take("admin")? }))
//!                     .param::<String>("name")
//!                     .param::<bool>("admin"),
//!             )
//!             .property::<String>("name", |u: &User| &u.name)
//!             .property::<bool>("admin", |u: &User| &u.admin)
//!             .into()
//!     }
//! }
//!
//! let config = Config::new();
//! let user: User = json_bind::deserialize(&json!({"name": "ada", "admin": true}), &config).unwrap();
//! assert_eq!(json_bind::to_string(&user, &config).unwrap(), r#"{"name":"ada","admin":true}"#);
//! ```
pub mod annotation;
pub mod builtin;
pub mod class;
pub mod config;
pub mod context;
pub mod convert;
pub mod descriptor;
pub mod error;
pub mod sealed;
pub mod shape;
pub mod write;

mod object;
mod path_de;
mod registry;
mod resolve;

#[cfg(test)]
mod fixtures;

use std::fmt;
use std::io;

use futures::io::AsyncWrite;
use serde_json::Value;

pub use annotation::{Annotation, AnnotationPolicy};
pub use builtin::{EnumDef, Opt};
pub use class::{Args, ClassDef, Constructor, Field, Param, Property};
pub use config::{Config, Options};
pub use context::Context;
pub use convert::{Deserializer, Serializer};
pub use descriptor::{ClassId, TypeDescriptor};
pub use error::{ErrorKind, JsonError, PathToken, Pointer, Result};
pub use resolve::Resolver;
pub use sealed::{SealedDef, Variant};
pub use shape::{Builtin, Shape, Typed};
pub use write::{AsyncJsonWriter, JsonWriter};

use context::InFlight;

/// Convert a JSON tree into a `T`.
pub fn deserialize<T: Typed>(json: &Value, config: &Config) -> Result<T> {
    let de = config.deserializer::<T>()?;
    let in_flight = InFlight::default();
    de.deserialize(json, &Context::new(config, &in_flight))
}

/// Parse JSON text, then convert it.
pub fn from_str<T: Typed>(text: &str, config: &Config) -> Result<T> {
    let json: Value = serde_json::from_str(text).map_err(|e| JsonError::new(ErrorKind::Syntax(e)))?;
    deserialize(&json, config)
}

/// Convert a `T` into a JSON tree.
pub fn serialize<T: Typed>(value: &T, config: &Config) -> Result<Value> {
    let ser = config.serializer::<T>()?;
    let in_flight = InFlight::default();
    ser.serialize(value, &Context::new(config, &in_flight))
}

/// Append compact JSON text for `value` to `out`.
///
/// The text is rendered in full before anything reaches `out`, so a failed
/// conversion leaves the sink untouched.
pub fn write_json<T: Typed>(value: &T, out: &mut dyn fmt::Write, config: &Config) -> Result<()> {
    let rendered = to_string(value, config)?;
    out.write_str(&rendered)
        .map_err(|_| JsonError::new(ErrorKind::Io(io::Error::other("character sink rejected output"))))
}

pub fn to_string<T: Typed>(value: &T, config: &Config) -> Result<String> {
    let ser = config.serializer::<T>()?;
    let in_flight = InFlight::default();
    let mut out = String::new();
    ser.write(value, &mut JsonWriter::new(&mut out), &Context::new(config, &in_flight))?;
    Ok(out)
}

/// Like [`write_json`], for byte sinks.
pub fn to_writer<T: Typed, W: io::Write>(value: &T, mut writer: W, config: &Config) -> Result<()> {
    let rendered = to_string(value, config)?;
    writer.write_all(rendered.as_bytes()).map_err(|e| JsonError::new(ErrorKind::Io(e)))
}

/// Stream compact JSON text for `value` into `sink`, yielding at every token.
///
/// With `flushEachElement` set the sink is flushed after each array element
/// and object property; it is always flushed once at the end.
pub async fn write_json_async<T, W>(value: &T, sink: &mut W, config: &Config) -> Result<()>
where
    T: Typed,
    W: AsyncWrite + Unpin,
{
    let ser = config.serializer::<T>()?;
    let in_flight = InFlight::default();
    let ctx = Context::new(config, &in_flight);
    let mut out = AsyncJsonWriter::new(sink, config.options().flush_each_element);
    ser.write_async(value, &mut out, &ctx).await?;
    out.finish().await
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Color, Party, Person, Point, Survey};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::pin::Pin;
    use std::task::{Context as TaskContext, Poll};

    #[test]
    fn custom_mapping_wins_over_synthesis() {
        let mut config = Config::new();
        let synthesized: Person = deserialize(&json!({"firstName": "A", "lastName": "B"}), &config).unwrap();
        assert_eq!(synthesized.first_name, "A");

        config.add_from_json::<Person>(|json: &Value, _: &Context<'_>| {
            let full = json.as_str().ok_or_else(|| JsonError::type_mismatch("name string", json))?;
            let (first, last) = full.split_once(' ').unwrap_or((full, ""));
            Ok(Person::new(first, last))
        });
        config.add_to_json::<Person>(|p: &Person, _: &Context<'_>| Ok(json!(format!("{} {}", p.first_name, p.last_name))));

        let people: Vec<Person> = deserialize(&json!(["Ada Lovelace"]), &config).unwrap();
        assert_eq!(people[0].last_name, "Lovelace");
        assert_eq!(serialize(&people, &config).unwrap(), json!(["Ada Lovelace"]));
        let error = deserialize::<Vec<Person>>(&json!([{"firstName": "A"}]), &config).unwrap_err();
        assert_eq!(error.pointer().to_string(), "/0");
    }

    #[test]
    fn polymorphic_round_trip_through_text() {
        let config = Config::new();
        let parties = vec![Party::Person(Person::new("A", "B")), Party::Organization(crate::fixtures::Organization { name: "Acme".into() })];
        let text = to_string(&parties, &config).unwrap();
        assert_eq!(
            text,
            r#"[{"type":"PERSON","firstName":"A","lastName":"B"},{"type":"Organization","name":"Acme"}]"#,
        );
        let back: Vec<Party> = from_str(&text, &config).unwrap();
        assert_eq!(back, parties);
    }

    #[test]
    fn round_trips() {
        let config = Config::new();
        let mut scores = BTreeMap::new();
        scores.insert("x".to_string(), vec![Some(Color::Red), None]);
        let back: BTreeMap<String, Vec<Option<Color>>> = deserialize(&serialize(&scores, &config).unwrap(), &config).unwrap();
        assert_eq!(back, scores);

        let point = Point { a: 3, b: 4, via: "(a,b)" };
        assert_eq!(deserialize::<Point>(&serialize(&point, &config).unwrap(), &config).unwrap(), point);

        let survey = Survey { id: 9, answer: Opt::Set(Some("yes".into())) };
        assert_eq!(from_str::<Survey>(&to_string(&survey, &config).unwrap(), &config).unwrap(), survey);
    }

    #[test]
    fn text_errors_are_syntax_errors() {
        let error = from_str::<Person>("{not json", &Config::new()).unwrap_err();
        assert!(matches!(error.kind(), ErrorKind::Syntax(_)));
    }

    /// Class whose second property has no converter.
    struct Broken {
        ok: i32,
        bad: Opaque,
    }

    struct Opaque;

    impl Typed for Opaque {
        fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
        fn shape() -> Shape<Self> { Shape::Opaque }
    }

    impl Typed for Broken {
        fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
        fn shape() -> Shape<Self> {
            ClassDef::new()
                .property::<i32>("ok", |b: &Broken| &b.ok)
                .property::<Opaque>("bad", |b: &Broken| &b.bad)
                .into()
        }
    }

    #[test]
    fn failed_writes_leave_sinks_untouched() {
        let config = Config::new();
        let broken = Broken { ok: 1, bad: Opaque };

        let mut text = String::from("PREFIX");
        assert!(write_json(&broken, &mut text, &config).is_err());
        assert_eq!(text, "PREFIX");

        let mut bytes = b"PREFIX".to_vec();
        assert!(to_writer(&broken, &mut bytes, &config).is_err());
        assert_eq!(bytes, b"PREFIX");

        write_json(&1u8, &mut text, &config).unwrap();
        assert_eq!(text, "PREFIX1");
    }

    #[test]
    fn io_writer_output() {
        let config = Config::new();
        let mut bytes = Vec::new();
        to_writer(&Person::new("A", "B"), &mut bytes, &config).unwrap();
        assert_eq!(bytes, br#"{"firstName":"A","lastName":"B"}"#);
    }

    /// Sink that records how often it was flushed.
    #[derive(Default)]
    struct CountingSink {
        bytes: Vec<u8>,
        flushes: usize,
    }

    impl AsyncWrite for CountingSink {
        fn poll_write(mut self: Pin<&mut Self>, _cx: &mut TaskContext<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            self.bytes.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(mut self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
            self.flushes += 1;
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> { Poll::Ready(Ok(())) }
    }

    #[test]
    fn streamed_sink_flushes_per_element_when_asked() {
        let values = vec![1u8, 2, 3];
        let mut quiet = CountingSink::default();
        futures::executor::block_on(write_json_async(&values, &mut quiet, &Config::new())).unwrap();
        assert_eq!(quiet.bytes, b"[1,2,3]");
        assert_eq!(quiet.flushes, 1);

        let mut config = Config::new();
        config.options_mut().flush_each_element = true;
        let mut eager = CountingSink::default();
        futures::executor::block_on(write_json_async(&values, &mut eager, &config)).unwrap();
        assert_eq!(eager.bytes, b"[1,2,3]");
        assert_eq!(eager.flushes, 4);
    }
}

//! Types shared by the unit tests.
use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{json, Value};

use crate::builtin::{EnumDef, Opt};
use crate::class::{ClassDef, Constructor, Param, Property};
use crate::context::Context;
use crate::descriptor::TypeDescriptor;
use crate::error::JsonError;
use crate::sealed::SealedDef;
use crate::shape::{Shape, Typed};

// --------------------------------- Classes --------------------------------- //

#[derive(Clone, Debug, PartialEq)]
pub struct Person {
    pub first_name: String,
    pub last_name: String,
    pub age: Option<u32>,
}

impl Person {
    pub fn new(first: &str, last: &str) -> Self {
        Self { first_name: first.to_string(), last_name: last.to_string(), age: None }
    }
}

impl Typed for Person {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        ClassDef::new()
            .constructor(
                Constructor::new(|args| {
                    Ok(Person {
                        first_name: args.take("firstName")?,
                        last_name: args.take("lastName")?,
                        age: args.take("age")?,
                    })
                })
                .param::<String>("firstName")
                .param::<String>("lastName")
                .param::<Option<u32>>("age"),
            )
            .property::<String>("firstName", |p: &Person| &p.first_name)
            .property::<String>("lastName", |p: &Person| &p.last_name)
            .property::<Option<u32>>("age", |p: &Person| &p.age)
            .into()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Organization {
    pub name: String,
}

impl Typed for Organization {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        ClassDef::new()
            .constructor(Constructor::new(|args| Ok(Organization { name: args.take("name")? })).param::<String>("name"))
            .property::<String>("name", |o: &Organization| &o.name)
            .into()
    }
}

/// Two constructors, `(a)` and `(a, b)`; `via` records which one ran.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    pub a: i32,
    pub b: i32,
    pub via: &'static str,
}

impl Typed for Point {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        ClassDef::new()
            .constructor(Constructor::new(|args| Ok(Point { a: args.take("a")?, b: 0, via: "(a)" })).param::<i32>("a"))
            .constructor(
                Constructor::new(|args| Ok(Point { a: args.take("a")?, b: args.take("b")?, via: "(a,b)" }))
                    .param::<i32>("a")
                    .param::<i32>("b"),
            )
            .property::<i32>("a", |p: &Point| &p.a)
            .property::<i32>("b", |p: &Point| &p.b)
            .into()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Inner {
    pub field1: String,
    pub field2: i32,
    pub field3: i32,
}

impl Typed for Inner {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        ClassDef::new()
            .constructor(
                Constructor::new(|args| {
                    Ok(Inner { field1: args.take("field1")?, field2: args.take("field2")?, field3: args.take("field3")? })
                })
                .param::<String>("field1")
                .param::<i32>("field2")
                .param::<i32>("field3"),
            )
            .into()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Outer {
    pub inner: Inner,
}

impl Typed for Outer {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        ClassDef::new()
            .constructor(Constructor::new(|args| Ok(Outer { inner: args.take("inner")? })).param::<Inner>("inner"))
            .into()
    }
}

/// Validating constructor plus a field assigned after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Account {
    pub id: i64,
    pub note: Option<String>,
}

impl Typed for Account {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        ClassDef::new()
            .constructor(
                Constructor::new(|args| {
                    let id: i64 = args.take("id")?;
                    anyhow::ensure!(id >= 0, "id must not be negative");
                    Ok(Account { id, note: None })
                })
                .param::<i64>("id"),
            )
            .field::<String>("note", |a: &mut Account, note| a.note = Some(note))
            .property::<i64>("id", |a: &Account| &a.id)
            .property::<Option<String>>("note", |a: &Account| &a.note)
            .into()
    }
}

/// Renamed and ignored members.
#[derive(Clone, Debug, PartialEq)]
pub struct Profile {
    pub name: String,
    pub cache: i32,
}

impl Typed for Profile {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        ClassDef::new()
            .constructor(
                Constructor::new(|args| Ok(Profile { name: args.take("name")?, cache: args.take_or("cache", 0)? }))
                    .arg(Param::of::<String>("name").rename("display_name"))
                    .arg(Param::of::<i32>("cache").optional().ignore()),
            )
            .property_def(Property::of::<String>("name", |p: &Profile| &p.name).rename("display_name"))
            .property_def(Property::of::<i32>("cache", |p: &Profile| &p.cache).ignore())
            .into()
    }
}

/// Generic class whose members are declared through the `V` placeholder.
#[derive(Clone, Debug, PartialEq)]
pub struct Holder<V> {
    pub items: Vec<V>,
    pub first: V,
}

impl<V: Typed> Typed for Holder<V> {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>().with_arg(V::descriptor()) }
    fn shape() -> Shape<Self> {
        let items = || TypeDescriptor::of::<Vec<()>>().with_arg(TypeDescriptor::param("V"));
        ClassDef::new()
            .type_params(&["V"])
            .constructor(
                Constructor::new(|args| Ok(Holder { items: args.take("items")?, first: args.take("first")? }))
                    .arg(Param::of::<Vec<V>>("items").declared(items()))
                    .arg(Param::of::<V>("first").declared(TypeDescriptor::param("V"))),
            )
            .property_def(Property::of::<Vec<V>>("items", |h: &Holder<V>| &h.items).declared(items()))
            .property_def(Property::of::<V>("first", |h: &Holder<V>| &h.first).declared(TypeDescriptor::param("V")))
            .into()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tree {
    pub label: String,
    pub children: Vec<Tree>,
}

impl Typed for Tree {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        ClassDef::new()
            .constructor(
                Constructor::new(|args| Ok(Tree { label: args.take("label")?, children: args.take("children")? }))
                    .param::<String>("label")
                    .param::<Vec<Tree>>("children"),
            )
            .property::<String>("label", |t: &Tree| &t.label)
            .property::<Vec<Tree>>("children", |t: &Tree| &t.children)
            .into()
    }
}

/// Node of a shared, possibly cyclic, linked list.
#[derive(Debug)]
pub struct Node {
    pub name: String,
    pub next: Option<Rc<RefCell<Node>>>,
}

impl Node {
    pub fn new(name: &str) -> Rc<RefCell<Node>> { Rc::new(RefCell::new(Node { name: name.to_string(), next: None })) }
}

impl Typed for Node {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        ClassDef::new()
            .constructor(Constructor::new(|args| Ok(Node { name: args.take("name")?, next: None })).param::<String>("name"))
            .field::<Option<Rc<RefCell<Node>>>>("next", |n: &mut Node, next| n.next = next)
            .property::<String>("name", |n: &Node| &n.name)
            .property::<Option<Rc<RefCell<Node>>>>("next", |n: &Node| &n.next)
            .into()
    }
}

/// `answer` may be absent, null or a string.
#[derive(Clone, Debug, PartialEq)]
pub struct Survey {
    pub id: i64,
    pub answer: Opt<Option<String>>,
}

impl Typed for Survey {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        ClassDef::new()
            .constructor(
                Constructor::new(|args| Ok(Survey { id: args.take("id")?, answer: args.take("answer")? }))
                    .param::<i64>("id")
                    .param::<Opt<Option<String>>>("answer"),
            )
            .property::<i64>("id", |s: &Survey| &s.id)
            .property::<Opt<Option<String>>>("answer", |s: &Survey| &s.answer)
            .into()
    }
}

/// Written as `"<cents> <currency>"` by its own methods, although its
/// constructor and properties would synthesize too.
#[derive(Clone, Debug, PartialEq)]
pub struct Money {
    pub cents: i64,
    pub currency: String,
}

impl Typed for Money {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        ClassDef::new()
            .constructor(
                Constructor::new(|args| Ok(Money { cents: args.take("cents")?, currency: args.take("currency")? }))
                    .param::<i64>("cents")
                    .param::<String>("currency"),
            )
            .property::<i64>("cents", |m: &Money| &m.cents)
            .property::<String>("currency", |m: &Money| &m.currency)
            .from_json(|json: &Value, _: &Context<'_>| {
                let text = json.as_str().ok_or_else(|| JsonError::type_mismatch("amount string", json))?;
                let bad = || JsonError::custom(format!("bad amount {text:?}"));
                let (cents, currency) = text.split_once(' ').ok_or_else(bad)?;
                Ok(Money { cents: cents.parse().map_err(|_| bad())?, currency: currency.to_string() })
            })
            .to_json(|m: &Money, _: &Context<'_>| Ok(Value::String(format!("{} {}", m.cents, m.currency))))
            .into()
    }
}

/// Object form produced by its own methods only.
#[derive(Clone, Debug, PartialEq)]
pub struct Badge {
    pub label: String,
}

impl Typed for Badge {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        ClassDef::new()
            .from_json(|json: &Value, _: &Context<'_>| {
                let label = json.get("text").and_then(Value::as_str)
                    .ok_or_else(|| JsonError::type_mismatch("badge object", json))?;
                Ok(Badge { label: label.to_string() })
            })
            .to_json(|b: &Badge, _: &Context<'_>| Ok(json!({"text": b.label})))
            .into()
    }
}

/// A positional constructor next to a named one.
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub value: f64,
    pub via: &'static str,
}

impl Typed for Reading {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        ClassDef::new()
            .constructor(Constructor::new(|args| Ok(Reading { value: args.take_at(0)?, via: "positional" })).arg(Param::unnamed::<f64>()))
            .constructor(Constructor::new(|args| Ok(Reading { value: args.take("value")?, via: "named" })).param::<f64>("value"))
            .property::<f64>("value", |r: &Reading| &r.value)
            .into()
    }
}

/// Only a positional constructor, so nothing can build it from JSON.
#[derive(Clone, Debug, PartialEq)]
pub struct Positional(pub f64);

impl Typed for Positional {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        ClassDef::new()
            .constructor(Constructor::new(|args| Ok(Positional(args.take_at(0)?))).arg(Param::unnamed::<f64>()))
            .into()
    }
}

// ------------------------------ Sealed, enums ------------------------------ //

#[derive(Clone, Debug, PartialEq)]
pub enum Party {
    Person(Person),
    Organization(Organization),
}

impl Typed for Party {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        SealedDef::new()
            .discriminator("type")
            .variant_as::<Person>("PERSON", Party::Person, |p| match p {
                Party::Person(person) => Some(person),
                _ => None,
            })
            .variant::<Organization>(Party::Organization, |p| match p {
                Party::Organization(org) => Some(org),
                _ => None,
            })
            .into()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Circle {
    pub radius: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Square {
    pub side: f64,
}

impl Typed for Circle {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        ClassDef::new()
            .constructor(Constructor::new(|args| Ok(Circle { radius: args.take("radius")? })).param::<f64>("radius"))
            .property::<f64>("radius", |c: &Circle| &c.radius)
            .into()
    }
}

impl Typed for Square {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        ClassDef::new()
            .constructor(Constructor::new(|args| Ok(Square { side: args.take("side")? })).param::<f64>("side"))
            .property::<f64>("side", |s: &Square| &s.side)
            .into()
    }
}

/// Sealed type using the configured discriminator name.
#[derive(Clone, Debug, PartialEq)]
pub enum Figure {
    Circle(Circle),
    Square(Square),
}

impl Typed for Figure {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        SealedDef::new()
            .variant::<Circle>(Figure::Circle, |f| match f {
                Figure::Circle(c) => Some(c),
                _ => None,
            })
            .variant::<Square>(Figure::Square, |f| match f {
                Figure::Square(s) => Some(s),
                _ => None,
            })
            .into()
    }
}

/// Mixes a variant with its own `to_json` and a plain class.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Badge(Badge),
    Circle(Circle),
}

impl Typed for Token {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        SealedDef::new()
            .variant::<Badge>(Token::Badge, |t| match t {
                Token::Badge(b) => Some(b),
                _ => None,
            })
            .variant::<Circle>(Token::Circle, |t| match t {
                Token::Circle(c) => Some(c),
                _ => None,
            })
            .into()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Color {
    Red,
    Green,
    Blue,
}

impl Typed for Color {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>() }
    fn shape() -> Shape<Self> {
        EnumDef::new([("RED", Color::Red), ("GREEN", Color::Green), ("BLUE", Color::Blue)]).into()
    }
}

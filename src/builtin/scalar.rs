//! Primitive scalars: booleans, characters, strings, the integer and float
//! families, big integers, `Decimal` and raw `serde_json::Value`.
use std::marker::PhantomData;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Number, Value};

use super::{scalar_types, BuiltinTable};
use crate::context::Context;
use crate::convert::{mismatch, Deserializer, Serializer};
use crate::error::Result;
use crate::shape::Typed;

pub(crate) type ReadFn<T> = fn(&Value, &Context<'_>) -> Option<T>;
pub(crate) type WriteFn<T> = fn(&T, &Context<'_>) -> Value;

/// A table scalar as a pair of plain functions. A rejected input is a type
/// mismatch against `name` (or a null violation).
pub(crate) struct ScalarConverter<T> {
    name: &'static str,
    read: ReadFn<T>,
    write: WriteFn<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ScalarConverter<T> {
    pub(crate) fn new(name: &'static str, read: ReadFn<T>, write: WriteFn<T>) -> Self {
        Self { name, read, write, _marker: PhantomData }
    }
}

impl<T> Deserializer<T> for ScalarConverter<T> {
    fn deserialize(&self, json: &Value, ctx: &Context<'_>) -> Result<T> {
        (self.read)(json, ctx).ok_or_else(|| mismatch(self.name, json))
    }
}

impl<T> Serializer<T> for ScalarConverter<T> {
    fn serialize(&self, value: &T, ctx: &Context<'_>) -> Result<Value> { Ok((self.write)(value, ctx)) }
}

/// Parses a JSON string through `FromStr`; written back through `Display`.
pub(crate) fn textual<T: FromStr + ToString>(name: &'static str) -> ScalarConverter<T> {
    ScalarConverter::new(
        name,
        |json, _| json.as_str().and_then(|s| s.parse().ok()),
        |value, _| Value::String(value.to_string()),
    )
}

scalar_types!(bool, char, String, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, i128, u128, Decimal, Value);

// -------------------------------- Integers --------------------------------- //

/// Integer targets also take floats with a zero fraction, within range.
fn integer<T: TryFrom<i64> + TryFrom<u64>>(json: &Value) -> Option<T> {
    let Value::Number(n) = json else { return None };
    if let Some(i) = n.as_i64() {
        return T::try_from(i).ok();
    }
    if let Some(u) = n.as_u64() {
        return T::try_from(u).ok();
    }
    let f = n.as_f64().filter(|f| f.fract() == 0.0)?;
    if f < 0.0 && f >= i64::MIN as f64 {
        T::try_from(f as i64).ok()
    } else if f >= 0.0 && f < u64::MAX as f64 {
        T::try_from(f as u64).ok()
    } else {
        None
    }
}

macro_rules! integers {
    ($table:expr; $($ty:ty => $name:literal),* $(,)?) => {
        $(
            $table.add::<$ty, _>(ScalarConverter::<$ty>::new(
                $name,
                |json, _| integer::<$ty>(json),
                |value, _| Value::from(*value),
            ));
        )*
    };
}

/// Numbers beyond 64 bits arrive as floats, so strings are the lossless form.
fn big_integer<T: FromStr + TryFrom<i64> + TryFrom<u64>>(json: &Value) -> Option<T> {
    match json {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(_) => integer(json),
        _ => None,
    }
}

fn i128_json(value: &i128, ctx: &Context<'_>) -> Value {
    match i64::try_from(*value) {
        Ok(small) if !ctx.config().options().big_integer_as_string => Value::from(small),
        _ => Value::String(value.to_string()),
    }
}

fn u128_json(value: &u128, ctx: &Context<'_>) -> Value {
    match u64::try_from(*value) {
        Ok(small) if !ctx.config().options().big_integer_as_string => Value::from(small),
        _ => Value::String(value.to_string()),
    }
}

// --------------------------------- Decimal --------------------------------- //

fn decimal(json: &Value) -> Option<Decimal> {
    let text = match json {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Decimal::from_str(&text).ok().or_else(|| Decimal::from_scientific(&text).ok())
}

fn decimal_json(value: &Decimal, ctx: &Context<'_>) -> Value {
    if ctx.config().options().big_decimal_as_string {
        return Value::String(value.to_string());
    }
    if value.fract().is_zero() {
        if let Some(i) = value.to_i64() {
            return Value::from(i);
        }
    }
    value.to_f64()
        .and_then(Number::from_f64)
        .map_or_else(|| Value::String(value.to_string()), Value::Number)
}

// ------------------------------ Pass-through ------------------------------- //

/// `serde_json::Value` targets take any input, `null` included.
struct PassThrough;

impl Deserializer<Value> for PassThrough {
    fn deserialize(&self, json: &Value, _ctx: &Context<'_>) -> Result<Value> { Ok(json.clone()) }
}

impl Serializer<Value> for PassThrough {
    fn serialize(&self, value: &Value, _ctx: &Context<'_>) -> Result<Value> { Ok(value.clone()) }
    fn is_null(&self, value: &Value) -> bool { value.is_null() }
}

// -------------------------------- Register --------------------------------- //

pub(crate) fn register(table: &mut BuiltinTable) {
    table.add::<bool, _>(ScalarConverter::new("bool", |json, _| json.as_bool(), |value, _| Value::Bool(*value)));
    table.add::<char, _>(ScalarConverter::new(
        "char",
        |json, _| {
            let mut chars = json.as_str()?.chars();
            let c = chars.next()?;
            chars.next().is_none().then_some(c)
        },
        |value, _| Value::String(value.to_string()),
    ));
    table.add::<String, _>(ScalarConverter::new(
        "String",
        |json, _| json.as_str().map(str::to_string),
        |value, _| Value::String(value.clone()),
    ));

    integers!(table;
        i8 => "i8", i16 => "i16", i32 => "i32", i64 => "i64", isize => "isize",
        u8 => "u8", u16 => "u16", u32 => "u32", u64 => "u64", usize => "usize",
    );

    table.add::<f64, _>(ScalarConverter::new("f64", |json, _| json.as_f64(), |value, _| Value::from(*value)));
    table.add::<f32, _>(ScalarConverter::new(
        "f32",
        |json, _| json.as_f64().map(|f| f as f32),
        |value, _| Value::from(f64::from(*value)),
    ));
    table.add::<i128, _>(ScalarConverter::new("i128", |json, _| big_integer(json), i128_json));
    table.add::<u128, _>(ScalarConverter::new("u128", |json, _| big_integer(json), u128_json));
    table.add::<Decimal, _>(ScalarConverter::new("Decimal", |json, _| decimal(json), decimal_json));
    table.add::<Value, _>(PassThrough);
}

// ------------------------------- Tests ------------------------------------ //

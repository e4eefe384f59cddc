//! Conversion context: the configuration plus the structural path of the
//! value currently being converted.
//!
//! Contexts form a borrowed chain; `child` never mutates its parent. The
//! serialize direction also shares a per-call set of the reference-counted
//! objects currently being written, used to detect cycles.
use std::cell::RefCell;

use serde_json::Value;

use crate::config::Config;
use crate::convert::{Deserializer, Serializer};
use crate::error::{ErrorKind, JsonError, PathToken, Pointer, Result};
use crate::shape::Typed;

/// Identities of the shared objects on the current serialization stack.
#[derive(Debug, Default)]
pub struct InFlight(RefCell<Vec<usize>>);

pub struct Context<'c> {
    config: &'c Config,
    parent: Option<&'c Context<'c>>,
    token: Option<PathToken>,
    in_flight: &'c InFlight,
}

impl<'c> Context<'c> {
    pub fn new(config: &'c Config, in_flight: &'c InFlight) -> Self {
        Self { config, parent: None, token: None, in_flight }
    }

    pub fn config(&self) -> &'c Config { self.config }

    /// Context for a property or array item below this one.
    pub fn child(&self, token: impl Into<PathToken>) -> Context<'_> {
        Context {
            config: self.config,
            parent: Some(self),
            token: Some(token.into()),
            in_flight: self.in_flight,
        }
    }

    pub fn token(&self) -> Option<&PathToken> { self.token.as_ref() }

    /// Location of this context from the root.
    pub fn pointer(&self) -> Pointer {
        let mut tokens = Vec::new();
        let mut cursor = Some(self);
        while let Some(ctx) = cursor {
            if let Some(token) = &ctx.token {
                tokens.push(token.clone());
            }
            cursor = ctx.parent;
        }
        tokens.into_iter().rev().collect()
    }

    // ----------------------------- re-entry ------------------------------- //

    /// Deserialize a nested value through the main engine.
    pub fn deserialize<T: Typed>(&self, json: &Value) -> Result<T> {
        let de = self.config.deserializer::<T>()?;
        de.deserialize(json, self)
    }

    /// Deserialize the value found under `token`, annotating errors with it.
    pub fn deserialize_at<T: Typed>(&self, token: impl Into<PathToken>, json: &Value) -> Result<T> {
        let token = token.into();
        let de = self.config.deserializer::<T>()?;
        descend(self, token, |ctx| de.deserialize(json, ctx))
    }

    pub fn serialize<T: Typed>(&self, value: &T) -> Result<Value> {
        let ser = self.config.serializer::<T>()?;
        ser.serialize(value, self)
    }

    pub fn serialize_at<T: Typed>(&self, token: impl Into<PathToken>, value: &T) -> Result<Value> {
        let token = token.into();
        let ser = self.config.serializer::<T>()?;
        descend(self, token, |ctx| ser.serialize(value, ctx))
    }

    // --------------------------- cycle tracking --------------------------- //

    /// Mark a shared object as being serialized until the guard drops.
    pub fn enter(&self, identity: usize, class: &str) -> Result<InFlightGuard<'c>> {
        let mut stack = self.in_flight.0.borrow_mut();
        if stack.contains(&identity) {
            return Err(JsonError::new(ErrorKind::CircularReference { class: class.to_string() }));
        }
        stack.push(identity);
        Ok(InFlightGuard { in_flight: self.in_flight, identity })
    }
}

pub struct InFlightGuard<'c> {
    in_flight: &'c InFlight,
    identity: usize,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut stack = self.in_flight.0.borrow_mut();
        if let Some(index) = stack.iter().rposition(|id| *id == self.identity) {
            stack.remove(index);
        }
    }
}

/// Run `f` in the child context for `token`, prefixing any error with it.
pub(crate) fn descend<T>(
    ctx: &Context<'_>,
    token: PathToken,
    f: impl FnOnce(&Context<'_>) -> Result<T>,
) -> Result<T> {
    let child = ctx.child(token.clone());
    f(&child).map_err(|e| e.within(token))
}

/// Deserialize through an already-resolved converter at `token`.
pub(crate) fn deserialize_with<T>(
    de: &dyn Deserializer<T>,
    ctx: &Context<'_>,
    token: impl Into<PathToken>,
    json: &Value,
) -> Result<T> {
    descend(ctx, token.into(), |child| de.deserialize(json, child))
}

/// Serialize through an already-resolved converter at `token`.
pub(crate) fn serialize_with<T>(
    ser: &dyn Serializer<T>,
    ctx: &Context<'_>,
    token: impl Into<PathToken>,
    value: &T,
) -> Result<Value> {
    descend(ctx, token.into(), |child| ser.serialize(value, child))
}

// ------------------------------- Tests ------------------------------------ //

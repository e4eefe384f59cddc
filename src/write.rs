//! Token writers for the two character-sink outputs.
//!
//! Both writers render scalars through `serde_json::Value`'s compact
//! `Display`, so tree output, `fmt::Write` output and streamed output are
//! byte-identical for the same input.
use std::fmt;
use std::io;

use futures::future::LocalBoxFuture;
use futures::io::{AsyncWrite, AsyncWriteExt};
use serde_json::Value;

use crate::error::{ErrorKind, JsonError, Result};

pub(crate) fn quoted(s: &str) -> String { Value::from(s).to_string() }

// ------------------------------ Sync writer -------------------------------- //

/// Appends compact JSON tokens to any `fmt::Write`.
pub struct JsonWriter<'w> {
    out: &'w mut dyn fmt::Write,
}

impl<'w> JsonWriter<'w> {
    pub fn new(out: &'w mut dyn fmt::Write) -> Self { Self { out } }

    pub fn raw(&mut self, token: &str) -> Result<()> {
        self.out.write_str(token).map_err(|_| {
            JsonError::new(ErrorKind::Io(io::Error::other("character sink rejected output")))
        })
    }

    pub fn begin_object(&mut self) -> Result<()> { self.raw("{") }
    pub fn end_object(&mut self) -> Result<()> { self.raw("}") }
    pub fn begin_array(&mut self) -> Result<()> { self.raw("[") }
    pub fn end_array(&mut self) -> Result<()> { self.raw("]") }
    pub fn comma(&mut self) -> Result<()> { self.raw(",") }

    /// Property name followed by `:`.
    pub fn key(&mut self, key: &str) -> Result<()> {
        self.raw(&quoted(key))?;
        self.raw(":")
    }

    pub fn value(&mut self, value: &Value) -> Result<()> { self.raw(&value.to_string()) }
}

// ------------------------------ Async writer ------------------------------- //

/// Streams compact JSON tokens into an `AsyncWrite`.
///
/// Every token write is an await point; `boundary` is called after each
/// array element and object property and flushes when `flush_each` is set.
pub struct AsyncJsonWriter<'w> {
    sink: &'w mut (dyn AsyncWrite + Unpin + 'w),
    flush_each: bool,
}

impl<'w> AsyncJsonWriter<'w> {
    pub fn new(sink: &'w mut (dyn AsyncWrite + Unpin + 'w), flush_each: bool) -> Self {
        Self { sink, flush_each }
    }

    pub async fn raw(&mut self, token: &str) -> Result<()> {
        self.sink.write_all(token.as_bytes()).await.map_err(|e| JsonError::new(ErrorKind::Io(e)))
    }

    pub async fn begin_object(&mut self) -> Result<()> { self.raw("{").await }
    pub async fn end_object(&mut self) -> Result<()> { self.raw("}").await }
    pub async fn begin_array(&mut self) -> Result<()> { self.raw("[").await }
    pub async fn end_array(&mut self) -> Result<()> { self.raw("]").await }
    pub async fn comma(&mut self) -> Result<()> { self.raw(",").await }

    pub async fn key(&mut self, key: &str) -> Result<()> {
        self.raw(&quoted(key)).await?;
        self.raw(":").await
    }

    /// End of an element or property.
    pub async fn boundary(&mut self) -> Result<()> {
        if self.flush_each {
            self.sink.flush().await.map_err(|e| JsonError::new(ErrorKind::Io(e)))?;
        }
        Ok(())
    }

    pub async fn finish(&mut self) -> Result<()> {
        self.sink.flush().await.map_err(|e| JsonError::new(ErrorKind::Io(e)))
    }

    /// Stream a materialised tree token by token.
    pub fn value<'a>(&'a mut self, value: &'a Value) -> LocalBoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match value {
                Value::Array(items) => {
                    self.begin_array().await?;
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 { self.comma().await?; }
                        self.value(item).await?;
                        self.boundary().await?;
                    }
                    self.end_array().await
                }
                Value::Object(map) => {
                    self.begin_object().await?;
                    for (i, (key, item)) in map.iter().enumerate() {
                        if i > 0 { self.comma().await?; }
                        self.key(key).await?;
                        self.value(item).await?;
                        self.boundary().await?;
                    }
                    self.end_object().await
                }
                scalar => self.raw(&scalar.to_string()).await,
            }
        })
    }
}

// ------------------------------- Tests ------------------------------------ //

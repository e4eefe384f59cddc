use serde::de::DeserializeOwned;
use serde_path_to_error::Segment;

use crate::error::{ErrorKind, JsonError, PathToken, Pointer};

/// Deserialize serde-native data with the JSON path of the failure kept as
/// the error's pointer.
pub(crate) fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, JsonError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(located)
}

pub(crate) fn from_value_with_path<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, JsonError> {
    serde_path_to_error::deserialize::<_, T>(value).map_err(located)
}

fn located(err: serde_path_to_error::Error<serde_json::Error>) -> JsonError {
    let pointer: Pointer = err.path().iter().filter_map(|segment| match segment {
        Segment::Seq { index } => Some(PathToken::Index(*index)),
        Segment::Map { key } => Some(PathToken::Key(key.clone())),
        Segment::Enum { variant } => Some(PathToken::Key(variant.clone())),
        _ => None,
    }).collect();
    JsonError::new(ErrorKind::InvalidOption(err.into_inner().to_string())).at(pointer)
}

// ------------------------------- Tests ------------------------------------ //

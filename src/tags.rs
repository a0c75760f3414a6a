//! Tag values and context merging.
//!
//! Tags are flat string-keyed maps of scalars. A logger's context is a tag
//! map merged underneath the tags supplied with each call.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::UsageError;

/// Scalar value accepted as a tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Ordered tag map. Ordering keeps payloads deterministic.
pub type Tags = BTreeMap<String, TagValue>;

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bool(v) => write!(f, "{v}"),
            TagValue::Int(v) => write!(f, "{v}"),
            TagValue::Float(v) => write!(f, "{v}"),
            TagValue::Str(v) => f.write_str(v),
        }
    }
}

macro_rules! tag_value_from {
    ($variant:ident: $($ty:ty),+) => {
        $(
            impl From<$ty> for TagValue {
                fn from(value: $ty) -> Self {
                    TagValue::$variant(value.into())
                }
            }
        )+
    };
}

tag_value_from!(Bool: bool);
tag_value_from!(Int: i64, i32, i16, i8, u32, u16, u8);
tag_value_from!(Float: f64, f32);
tag_value_from!(Str: String, &str);

/// Build a [`Tags`] map from key/value pairs.
///
/// ```
/// use logdot::{tags, TagValue};
///
/// let t = tags([("user_id", TagValue::from(123)), ("session", "abc".into())]);
/// assert_eq!(t["session"], TagValue::from("abc"));
/// ```
pub fn tags<K, I>(pairs: I) -> Tags
where
    K: Into<String>,
    I: IntoIterator<Item = (K, TagValue)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Reject float tags that are NaN or infinite, which JSON cannot carry.
pub(crate) fn ensure_finite(tags: &Tags) -> Result<(), UsageError> {
    let bad = tags
        .iter()
        .find(|(_, value)| matches!(value, TagValue::Float(f) if !f.is_finite()));
    match bad {
        Some((key, value)) => Err(UsageError::InvalidArgument(format!(
            "tag {key:?} must be finite, got {value}"
        ))),
        None => Ok(()),
    }
}

/// Merge `overrides` on top of `base` and return the result.
///
/// Every key of `base` is kept unless `overrides` carries the same key, in
/// which case the override wins. Neither input is modified.
pub fn merge_tags(base: &Tags, overrides: &Tags) -> Tags {
    let mut merged = base.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

//! The dynamically typed value that flows through a pipeline.
//!
//! Pipelines are built at runtime from named steps, so the element type is a
//! small closed set of variants instead of a generic parameter. Stream
//! operators that group values (`batch`, `window`, `zip`) emit [`Element::List`].
//!
//! `Element` derives Serde traits with an externally tagged layout, which keeps
//! it encodable by non-self-describing formats such as postcard.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single value in a pipeline pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub enum Element {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Element>),
}

impl Element {
    /// Build a list element from anything convertible into elements.
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Element>,
    {
        Element::List(items.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Element::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Element::Float(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            Element::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Element::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Element::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Element]> {
        match self {
            Element::List(v) => Some(v),
            _ => None,
        }
    }

    /// Consume the element, returning its items if it is a list.
    #[must_use]
    pub fn into_list(self) -> Option<Vec<Element>> {
        match self {
            Element::List(v) => Some(v),
            _ => None,
        }
    }

    /// `false` if this element holds a NaN or infinite float, at any depth.
    /// JSON has no encoding for those values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Element::Float(v) => v.is_finite(),
            Element::List(items) => items.iter().all(Element::is_finite),
            _ => true,
        }
    }

    /// Short variant name, used in error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Element::Null => "null",
            Element::Bool(_) => "bool",
            Element::Int(_) => "int",
            Element::Float(_) => "float",
            Element::Text(_) => "text",
            Element::Bytes(_) => "bytes",
            Element::List(_) => "list",
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Null => f.write_str("null"),
            Element::Bool(v) => write!(f, "{v}"),
            Element::Int(v) => write!(f, "{v}"),
            Element::Float(v) => write!(f, "{v}"),
            Element::Text(s) => write!(f, "{s:?}"),
            Element::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Element::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Element {
            fn from(v: $t) -> Self {
                Element::Int(i64::from(v))
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Element {
    fn from(v: bool) -> Self {
        Element::Bool(v)
    }
}

impl From<f64> for Element {
    fn from(v: f64) -> Self {
        Element::Float(v)
    }
}

impl From<String> for Element {
    fn from(v: String) -> Self {
        Element::Text(v)
    }
}

impl From<&str> for Element {
    fn from(v: &str) -> Self {
        Element::Text(v.to_string())
    }
}

impl From<Vec<Element>> for Element {
    fn from(v: Vec<Element>) -> Self {
        Element::List(v)
    }
}

impl From<()> for Element {
    fn from((): ()) -> Self {
        Element::Null
    }
}

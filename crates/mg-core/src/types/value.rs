//! The variant value store.
//!
//! Property values are held as [`Value`] and described by [`ValueType`].
//! [`PropertyValue`] maps Rust types onto the store so typed accessors can be
//! layered on top of name-based access.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{CollectionId, ModelTypeId, NodeId};

/// A property value.
///
/// Model and collection values compare by handle.
///
/// # Examples
///
/// ```
/// use mg_core::Value;
///
/// assert_eq!(Value::from("Ada"), Value::Text("Ada".to_owned()));
/// assert_eq!(Value::from(3_i64).kind(), "int");
/// assert!(Value::Null.is_null());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Absent model or collection.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Text.
    Text(String),
    /// A child model node.
    Model(NodeId),
    /// A collection of model nodes.
    Collection(CollectionId),
}

impl Value {
    /// Short name of the variant, used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Model(_) => "model",
            Self::Collection(_) => "collection",
        }
    }

    /// Returns `true` for [`Value::Null`].
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` if the value refers to a node or collection.
    #[inline]
    #[must_use]
    pub const fn references_graph(&self) -> bool {
        matches!(self, Self::Model(_) | Self::Collection(_))
    }

    /// The node handle, if this is a model value.
    #[inline]
    #[must_use]
    pub const fn as_model(&self) -> Option<NodeId> {
        match self {
            Self::Model(id) => Some(*id),
            _ => None,
        }
    }

    /// The collection handle, if this is a collection value.
    #[inline]
    #[must_use]
    pub const fn as_collection(&self) -> Option<CollectionId> {
        match self {
            Self::Collection(id) => Some(*id),
            _ => None,
        }
    }

    /// The text, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Floats compare by value, except that NaN equals NaN, so assigning a
/// stored NaN again is not a change.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Model(a), Self::Model(b)) => a == b,
            (Self::Collection(a), Self::Collection(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<NodeId> for Value {
    fn from(value: NodeId) -> Self {
        Self::Model(value)
    }
}

impl From<CollectionId> for Value {
    fn from(value: CollectionId) -> Self {
        Self::Collection(value)
    }
}

impl From<Option<NodeId>> for Value {
    fn from(value: Option<NodeId>) -> Self {
        value.map_or(Self::Null, Self::Model)
    }
}

/// The declared type of a property.
///
/// # Examples
///
/// ```
/// use mg_core::{Value, ValueType};
///
/// assert!(ValueType::Model(None).is_nullable());
/// assert!(!ValueType::Int.is_nullable());
/// assert_eq!(ValueType::Text.default_value(), Value::Text(String::new()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Boolean.
    Bool,
    /// Signed integer.
    Int,
    /// Floating point number.
    Float,
    /// Text.
    Text,
    /// A model node, optionally restricted to a model type and its subtypes.
    Model(Option<ModelTypeId>),
    /// A collection of model nodes.
    Collection,
}

impl ValueType {
    /// Returns `true` if [`Value::Null`] is assignable.
    #[inline]
    #[must_use]
    pub const fn is_nullable(self) -> bool {
        matches!(self, Self::Model(_) | Self::Collection)
    }

    /// Returns `true` if values of this type participate in the graph.
    #[inline]
    #[must_use]
    pub const fn is_graph_reference(self) -> bool {
        self.is_nullable()
    }

    /// The value used when a property declares no default.
    #[must_use]
    pub fn default_value(self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::Text => Value::Text(String::new()),
            Self::Model(_) | Self::Collection => Value::Null,
        }
    }

    /// Returns `true` if `value` has the right variant for this type.
    ///
    /// Model subtyping and handle liveness are checked by the graph, which
    /// has the registry and the arenas at hand.
    #[must_use]
    pub const fn admits(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Model(_) | Self::Collection, Value::Null)
                | (Self::Bool, Value::Bool(_))
                | (Self::Int, Value::Int(_))
                | (Self::Float, Value::Float(_))
                | (Self::Text, Value::Text(_))
                | (Self::Model(_), Value::Model(_))
                | (Self::Collection, Value::Collection(_))
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Text => f.write_str("text"),
            Self::Model(None) => f.write_str("model"),
            Self::Model(Some(ty)) => write!(f, "model<{ty}>"),
            Self::Collection => f.write_str("collection"),
        }
    }
}

/// A Rust type that can be stored in and read back from a [`Value`].
pub trait PropertyValue: Sized {
    /// The value type a property of this Rust type is declared with.
    const VALUE_TYPE: ValueType;

    /// Converts a stored value, returning `None` on a variant mismatch.
    fn from_value(value: &Value) -> Option<Self>;

    /// Converts into the stored representation.
    fn into_value(self) -> Value;
}

impl PropertyValue for bool {
    const VALUE_TYPE: ValueType = ValueType::Bool;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl PropertyValue for i64 {
    const VALUE_TYPE: ValueType = ValueType::Int;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl PropertyValue for f64 {
    const VALUE_TYPE: ValueType = ValueType::Float;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl PropertyValue for String {
    const VALUE_TYPE: ValueType = ValueType::Text;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_text().map(str::to_owned)
    }

    fn into_value(self) -> Value {
        Value::Text(self)
    }
}

impl PropertyValue for Option<NodeId> {
    const VALUE_TYPE: ValueType = ValueType::Model(None);

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            Value::Model(id) => Some(Some(*id)),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::from(self)
    }
}

impl PropertyValue for Option<CollectionId> {
    const VALUE_TYPE: ValueType = ValueType::Collection;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            Value::Collection(id) => Some(Some(*id)),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        self.map_or(Value::Null, Value::Collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SlotHandle;

    #[test]
    fn test_admits_matches_variants() {
        assert!(ValueType::Int.admits(&Value::Int(1)));
        assert!(!ValueType::Int.admits(&Value::Float(1.0)));
        assert!(!ValueType::Text.admits(&Value::Null));
        assert!(ValueType::Collection.admits(&Value::Null));
        assert!(ValueType::Model(None).admits(&Value::Model(NodeId::from_parts(0, 0))));
        assert!(!ValueType::Collection.admits(&Value::Model(NodeId::from_parts(0, 0))));
    }

    #[test]
    fn test_nan_equals_nan() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_eq!(Value::Float(0.0), Value::Float(-0.0));
        assert_ne!(Value::Float(f64::NAN), Value::Float(1.0));
        assert_ne!(Value::Float(1.0), Value::Int(1));
    }

    #[test]
    fn test_default_values_are_admitted() {
        for ty in [
            ValueType::Bool,
            ValueType::Int,
            ValueType::Float,
            ValueType::Text,
            ValueType::Model(None),
            ValueType::Collection,
        ] {
            assert!(ty.admits(&ty.default_value()), "{ty}");
        }
    }

    #[test]
    fn test_optional_model_conversion() {
        let id = NodeId::from_parts(1, 0);
        assert_eq!(Option::<NodeId>::from_value(&Value::Null), Some(None));
        assert_eq!(Option::<NodeId>::from_value(&Value::Model(id)), Some(Some(id)));
        assert_eq!(Option::<NodeId>::from_value(&Value::Int(1)), None);
        assert_eq!(Some(id).into_value(), Value::Model(id));
    }

    #[test]
    fn test_value_type_display() {
        assert_eq!(ValueType::Model(Some(ModelTypeId::from_index(2))).to_string(), "model<type#2>");
        assert_eq!(ValueType::Collection.to_string(), "collection");
    }

    #[test]
    fn test_value_equality_is_by_value() {
        assert_eq!(Value::from("x"), Value::from("x".to_owned()));
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }
}

//! The document tree consumed and produced by translation.

use std::{
    any::{Any, type_name},
    fmt,
    sync::Arc,
};

use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// String-keyed mapping node; insertion order is kept for diagnostics.
pub type Mapping = IndexMap<String, Node>;

/// A node of a configuration document.
///
/// Documents read from YAML or JSON only contain the data variants. The
/// [`Node::Object`] variant is produced by translation wherever a factory was
/// invoked, and cannot be serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Node>),
    Mapping(Mapping),
    #[serde(skip)]
    Object(Object),
}

impl Node {
    /// Wrap a constructed value.
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Node::Object(Object::new(value))
    }

    /// Short name of the node's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "bool",
            Node::Integer(_) => "integer",
            Node::Float(_) => "float",
            Node::String(_) => "string",
            Node::Sequence(_) => "sequence",
            Node::Mapping(_) => "mapping",
            Node::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow the constructed value if this node holds an object of type `T`.
    pub fn as_object<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Node::Object(object) => object.downcast::<T>(),
            _ => None,
        }
    }

    /// Deserialize plain data into `T`.
    ///
    /// Fails if the tree contains constructed objects.
    pub fn deserialize_into<T: DeserializeOwned>(self) -> anyhow::Result<T> {
        let kind = self.kind();
        let value = serde_json::to_value(&self).with_context(|| format!("cannot read {kind} node as plain data"))?;
        Ok(serde_json::from_value(value)?)
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Node::Bool(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::Integer(value)
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Node::Float(value)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::String(value.to_string())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::String(value)
    }
}

impl From<Vec<Node>> for Node {
    fn from(value: Vec<Node>) -> Self {
        Node::Sequence(value)
    }
}

impl From<Mapping> for Node {
    fn from(value: Mapping) -> Self {
        Node::Mapping(value)
    }
}

impl From<Object> for Node {
    fn from(value: Object) -> Self {
        Node::Object(value)
    }
}

/// A live value constructed by a factory.
///
/// Objects are shared, so cloning a translated tree never duplicates the
/// underlying value. Two objects are equal only if they share that value.
#[derive(Clone)]
pub struct Object {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl Object {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            type_name: type_name::<T>(),
            value,
        }
    }

    /// Rust type name of the wrapped value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any + Send + Sync>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object<{}>", self.type_name)
    }
}

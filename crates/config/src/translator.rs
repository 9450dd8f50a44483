//! Translation of document trees into live object hierarchies.
//!
//! Translation is bottom-up: every value of a mapping and every element of a
//! sequence is translated first. A mapping that still carries the
//! [`TYPE_KEY`] afterwards is replaced by the result of calling the factory it
//! names, with [`ARGS_KEY`] as positional arguments and all other keys as
//! named arguments.
//!
//! ```yaml
//! monitor:
//!   __type__: loadtide.services.Monitor
//!   interval: 5
//!   pool:
//!     __type__: loadtide.pools.Static
//!     __args__: [24]
//! ```

use anyhow::{Context, bail};
use tracing::debug;

use crate::{
    error::ConfigurationError,
    node::{Mapping, Node},
    symbols::{Arguments, Registry, SymbolResolver},
};

/// Reserved key naming the dotted factory of a mapping node.
pub const TYPE_KEY: &str = "__type__";

/// Reserved key holding the positional arguments of a mapping node.
pub const ARGS_KEY: &str = "__args__";

/// Translator from a document tree to an initialised object hierarchy.
#[derive(Debug, Clone, Default)]
pub struct Translator<R = Registry> {
    resolver: R,
}

impl<R: SymbolResolver> Translator<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Translate `node`, located at the diagnostic path `path`.
    ///
    /// Child paths extend `path` with `.key` for mapping values and `[index]`
    /// for sequence elements.
    ///
    /// # Errors
    ///
    /// Any failure is reported as a [`ConfigurationError`] located at the
    /// deepest path where it occurred.
    pub fn translate(&self, node: Node, path: &str) -> Result<Node, ConfigurationError> {
        self.translate_node(node, path)
            .map_err(|error| ConfigurationError::attribute(error, path))
    }

    fn translate_node(&self, node: Node, path: &str) -> anyhow::Result<Node> {
        match node {
            Node::Mapping(mapping) => {
                let mut resolved = Mapping::with_capacity(mapping.len());
                for (key, value) in mapping {
                    let child_path = member_path(path, &key);
                    let value = self.translate(value, &child_path)?;
                    resolved.insert(key, value);
                }
                if resolved.contains_key(TYPE_KEY) {
                    self.construct(resolved, Mapping::new())
                } else {
                    Ok(Node::Mapping(resolved))
                }
            }
            Node::Sequence(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    resolved.push(self.translate(item, &format!("{path}[{index}]"))?);
                }
                Ok(Node::Sequence(resolved))
            }
            other => Ok(other),
        }
    }

    /// Construct an object from an already translated mapping.
    ///
    /// `extra` supplies additional named arguments; it must not contain the
    /// reserved keys.
    pub fn construct(&self, mut mapping: Mapping, extra: Mapping) -> anyhow::Result<Node> {
        if extra.contains_key(TYPE_KEY) || extra.contains_key(ARGS_KEY) {
            bail!("extra constructor arguments must not contain '{TYPE_KEY}' or '{ARGS_KEY}'");
        }
        mapping.extend(extra);

        let factory_name = match mapping.shift_remove(TYPE_KEY) {
            Some(Node::String(name)) => name,
            Some(other) => bail!("'{TYPE_KEY}' must be a dotted factory name, got {}", other.kind()),
            None => bail!("mapping has no '{TYPE_KEY}' to construct from"),
        };
        let factory = self.resolver.resolve(&factory_name)?;
        let positional = match mapping.shift_remove(ARGS_KEY) {
            None => Vec::new(),
            Some(Node::Sequence(items)) => items,
            Some(other) => bail!("'{ARGS_KEY}' must be a sequence, got {}", other.kind()),
        };

        debug!(factory = %factory_name, positional = positional.len(), named = mapping.len(), "constructing object");
        factory(Arguments::new(positional, mapping)).with_context(|| format!("failed to construct '{factory_name}'"))
    }
}

fn member_path(path: &str, key: &str) -> String {
    if path.is_empty() { key.to_string() } else { format!("{path}.{key}") }
}

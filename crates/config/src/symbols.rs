//! Resolution of dotted factory names into callables.
//!
//! Factories live in a [`Registry`] shaped like a module tree: registering
//! `loadtide.pools.Static` creates the modules `loadtide` and `loadtide.pools`
//! and binds the factory `Static` inside the latter. Translation looks names up
//! through the [`SymbolResolver`] trait so tests and embedders can substitute
//! their own tables.

use std::{
    any::{Any, type_name},
    fmt,
    sync::Arc,
};

use anyhow::{Context, anyhow, bail};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;

use crate::{
    error::ConfigurationError,
    node::{Mapping, Node},
};

/// A constructor invoked with the arguments collected from a mapping node.
pub type Factory = Arc<dyn Fn(Arguments) -> anyhow::Result<Node> + Send + Sync>;

/// Capability to turn a dotted name into a factory.
pub trait SymbolResolver: Send + Sync {
    /// Resolve `name`, reporting unknown modules or attributes as configuration errors.
    fn resolve(&self, name: &str) -> Result<Factory, ConfigurationError>;
}

impl<R: SymbolResolver + ?Sized> SymbolResolver for Arc<R> {
    fn resolve(&self, name: &str) -> Result<Factory, ConfigurationError> {
        (**self).resolve(name)
    }
}

impl<R: SymbolResolver + ?Sized> SymbolResolver for &R {
    fn resolve(&self, name: &str) -> Result<Factory, ConfigurationError> {
        (**self).resolve(name)
    }
}

/// Module tree of named factories.
#[derive(Clone, Default)]
pub struct Registry {
    root: Module,
}

#[derive(Clone, Default)]
struct Module {
    members: IndexMap<String, Symbol>,
}

#[derive(Clone)]
enum Symbol {
    Module(Module),
    Factory(Factory),
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `factory` to the dotted `name`, creating intermediate modules.
    ///
    /// # Errors
    ///
    /// Fails for empty name components, for names already bound, and when an
    /// intermediate component is already bound to a factory.
    pub fn register<F>(&mut self, name: &str, factory: F) -> Result<&mut Self, ConfigurationError>
    where
        F: Fn(Arguments) -> anyhow::Result<Node> + Send + Sync + 'static,
    {
        let components: Vec<&str> = name.split('.').collect();
        let Some((attribute, modules)) = components.split_last() else {
            return Err(ConfigurationError::msg(format!("invalid factory name '{name}'")));
        };
        if components.iter().any(|component| component.trim().is_empty()) {
            return Err(ConfigurationError::msg(format!("invalid factory name '{name}'")));
        }

        let mut module = &mut self.root;
        for (depth, component) in modules.iter().enumerate() {
            let entry = module
                .members
                .entry((*component).to_string())
                .or_insert_with(|| Symbol::Module(Module::default()));
            module = match entry {
                Symbol::Module(inner) => inner,
                Symbol::Factory(_) => {
                    let prefix = components[..=depth].join(".");
                    return Err(ConfigurationError::msg(format!(
                        "cannot register '{name}': '{prefix}' is a factory, not a module"
                    )));
                }
            };
        }
        if module.members.contains_key(*attribute) {
            return Err(ConfigurationError::msg(format!("factory '{name}' is already registered")));
        }
        module.members.insert((*attribute).to_string(), Symbol::Factory(Arc::new(factory)));
        Ok(self)
    }

    /// Builder-style variant of [`Registry::register`].
    pub fn with<F>(mut self, name: &str, factory: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(Arguments) -> anyhow::Result<Node> + Send + Sync + 'static,
    {
        self.register(name, factory)?;
        Ok(self)
    }

    /// Dotted names of every registered factory, in registration order.
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_names(&self.root, "", &mut names);
        names
    }
}

fn collect_names(module: &Module, prefix: &str, names: &mut Vec<String>) {
    for (name, symbol) in &module.members {
        let qualified = if prefix.is_empty() { name.clone() } else { format!("{prefix}.{name}") };
        match symbol {
            Symbol::Module(inner) => collect_names(inner, &qualified, names),
            Symbol::Factory(_) => names.push(qualified),
        }
    }
}

impl SymbolResolver for Registry {
    fn resolve(&self, name: &str) -> Result<Factory, ConfigurationError> {
        let mut components = name.split('.');
        let head = components.next().unwrap_or_default();
        let mut current = self
            .root
            .members
            .get(head)
            .ok_or_else(|| ConfigurationError::msg(format!("no module named '{head}'")))?;
        let mut traversed = head.to_string();
        for component in components {
            let Symbol::Module(module) = current else {
                return Err(ConfigurationError::msg(format!(
                    "no such object '{name}': factory '{traversed}' has no attribute '{component}'"
                )));
            };
            current = module.members.get(component).ok_or_else(|| {
                ConfigurationError::msg(format!("no such object '{name}': module '{traversed}' has no attribute '{component}'"))
            })?;
            traversed.push('.');
            traversed.push_str(component);
        }
        match current {
            Symbol::Factory(factory) => Ok(Arc::clone(factory)),
            Symbol::Module(_) => Err(ConfigurationError::msg(format!("'{name}' is a module, not a factory"))),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("factories", &self.names()).finish()
    }
}

/// Positional and named arguments handed to a factory.
///
/// Parameters are bound the way keyword-capable call sites do it: a parameter
/// is read from its positional slot if one was given, otherwise from its name.
/// Giving both is an error, as is leaving arguments unconsumed when
/// [`Arguments::finish`] is called.
#[derive(Debug, Default)]
pub struct Arguments {
    positional: Vec<Option<Node>>,
    named: Mapping,
}

impl Arguments {
    pub fn new(positional: Vec<Node>, named: Mapping) -> Self {
        Self {
            positional: positional.into_iter().map(Some).collect(),
            named,
        }
    }

    /// Number of arguments not yet consumed.
    pub fn len(&self) -> usize {
        self.positional.iter().flatten().count() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Named arguments not yet consumed.
    pub fn named(&self) -> &Mapping {
        &self.named
    }

    /// Take the parameter at `position`, falling back to the one called `name`.
    pub fn take(&mut self, position: usize, name: &str) -> anyhow::Result<Option<Node>> {
        let positional = self.positional.get_mut(position).and_then(Option::take);
        let named = self.named.shift_remove(name);
        match (positional, named) {
            (Some(_), Some(_)) => bail!("got multiple values for argument '{name}'"),
            (positional, named) => Ok(positional.or(named)),
        }
    }

    /// Take and deserialize a mandatory parameter.
    pub fn required<T: DeserializeOwned>(&mut self, position: usize, name: &str) -> anyhow::Result<T> {
        let node = self
            .take(position, name)?
            .ok_or_else(|| anyhow!("missing required argument '{name}'"))?;
        node.deserialize_into().with_context(|| format!("invalid value for argument '{name}'"))
    }

    /// Take and deserialize an optional parameter.
    pub fn optional<T: DeserializeOwned>(&mut self, position: usize, name: &str) -> anyhow::Result<Option<T>> {
        match self.take(position, name)? {
            None | Some(Node::Null) => Ok(None),
            Some(node) => node
                .deserialize_into()
                .map(Some)
                .with_context(|| format!("invalid value for argument '{name}'")),
        }
    }

    /// Take a mandatory parameter that must be a constructed object of type `T`.
    pub fn object<T: Any + Send + Sync>(&mut self, position: usize, name: &str) -> anyhow::Result<Arc<T>> {
        let node = self
            .take(position, name)?
            .ok_or_else(|| anyhow!("missing required argument '{name}'"))?;
        node.as_object::<T>()
            .ok_or_else(|| anyhow!("argument '{name}' must be a constructed {}, got {}", type_name::<T>(), describe(&node)))
    }

    /// Ensure every argument was consumed.
    pub fn finish(self) -> anyhow::Result<()> {
        let unexpected_positional = self.positional.iter().flatten().count();
        if unexpected_positional > 0 {
            bail!("got {unexpected_positional} unexpected positional argument(s)");
        }
        if !self.named.is_empty() {
            let names: Vec<&str> = self.named.keys().map(String::as_str).collect();
            bail!("got unexpected keyword argument(s): {}", names.join(", "));
        }
        Ok(())
    }
}

fn describe(node: &Node) -> String {
    match node {
        Node::Object(object) => object.type_name().to_string(),
        other => other.kind().to_string(),
    }
}

//! Configuration loading for the Loadtide daemon.
//!
//! A configuration document is a tree of [`Node`]s. Each top-level section is
//! handed to the [`SectionPlugin`] claiming it, in an order derived from the
//! plugins' `before`/`after` constraints. Plugins typically use a
//! [`Translator`] to turn their section into live objects: any mapping with a
//! `__type__` key is replaced by the result of the factory it names.
//!
//! ```no_run
//! use loadtide_config::{Node, Registry, SectionPlugin, Translator, load_configuration, load_document};
//!
//! # fn main() -> anyhow::Result<()> {
//! let translator = Translator::new(Registry::new());
//! let pipeline = SectionPlugin::new("pipeline", move |section: Node| {
//!     Ok(Some(translator.translate(section, "pipeline")?))
//! })
//! .into_shared();
//!
//! let document = load_document("loadtide.yaml")?;
//! let retained = load_configuration(document, &[pipeline.clone()])?;
//! assert!(retained.get(&pipeline).is_some());
//! # Ok(())
//! # }
//! ```

mod document;
mod error;
mod loader;
pub mod logging;
mod node;
mod order;
mod plugin;
mod symbols;
mod translator;

pub use document::{load_document, parse_json, parse_yaml};
pub use error::{ConfigurationError, ROOT};
pub use loader::{LOGGING_SECTION, Retained, load_configuration};
pub use logging::{LogFormat, configure_logging};
pub use node::{Mapping, Node, Object};
pub use order::order_plugins;
pub use plugin::{Digest, SectionPlugin};
pub use symbols::{Arguments, Factory, Registry, SymbolResolver};
pub use translator::{ARGS_KEY, TYPE_KEY, Translator};

//! Factories and section plugins shipped with the daemon.

mod pools;
mod services;

use std::sync::Arc;

use anyhow::{Context, bail};
use loadtide_config::{ConfigurationError, Node, Registry, SectionPlugin, Translator};
use loadtide_runtime::Runner;
use loadtide_types::Service;
use tracing::info;

pub use pools::StaticPool;
pub use services::Monitor;

/// Section holding the services to launch.
pub const PIPELINE_SECTION: &str = "pipeline";

/// Registry of the built-in factories.
pub fn registry() -> Result<Registry, ConfigurationError> {
    Registry::new()
        .with("loadtide.pools.Static", StaticPool::construct)?
        .with("loadtide.services.Monitor", Monitor::construct)
}

/// Section plugins of the daemon, in declaration order.
pub fn plugins(translator: Translator, runner: Arc<Runner>) -> Vec<Arc<SectionPlugin>> {
    vec![pipeline_plugin(translator, runner)]
}

/// Plugin translating the `pipeline` section and launching its services.
///
/// The section is a sequence; every element must construct a [`Service`],
/// which is registered with `runner` as a background payload.
pub fn pipeline_plugin(translator: Translator, runner: Arc<Runner>) -> Arc<SectionPlugin> {
    SectionPlugin::new(PIPELINE_SECTION, move |section: Node| {
        if section.as_sequence().is_none() {
            bail!("expected a sequence of services, found {}", section.kind());
        }
        let translated = translator.translate(section, PIPELINE_SECTION)?;
        for (index, element) in translated.as_sequence().unwrap_or_default().iter().enumerate() {
            let location = format!("{PIPELINE_SECTION}[{index}]");
            let Some(service) = element.as_object::<Arc<dyn Service>>() else {
                return Err(ConfigurationError::msg(format!("expected a service, found {}", describe(element)))
                    .at(location)
                    .into());
            };
            let service: Arc<dyn Service> = Arc::clone(&*service);
            runner
                .register_payload(move || service.run())
                .with_context(|| format!("cannot launch service at {location}"))?;
            info!(element = %location, "launched service");
        }
        Ok(Some(translated))
    })
    .into_shared()
}

fn describe(node: &Node) -> String {
    match node {
        Node::Object(object) => object.type_name().to_string(),
        other => other.kind().to_string(),
    }
}

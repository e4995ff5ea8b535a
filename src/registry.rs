use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    PreglyphErr, Result,
    config::{ObjectConfig, Params, Target},
};

/// A factory building a `T` out of the params of a configuration node.
pub type Factory<T> = Box<dyn Fn(&Params) -> Result<T> + Send + Sync>;

/// Resolves configuration nodes into instances.
///
/// Every buildable entity is registered up front under its dotted target, instantiating a
/// node looks the target up by exact match and hands the node's params to the factory.
pub struct Registry<T> {
    factories: HashMap<String, Factory<T>>,
}

impl<T> Registry<T> {
    /// Creates a new empty `Registry`.
    ///
    /// # Returns
    /// A new `Registry` instance.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers a factory that receives the raw params of the node.
    ///
    /// Registering a target twice replaces the previous factory.
    ///
    /// # Arguments
    /// * `target` - The dotted identifier configs will refer to.
    /// * `factory` - The factory to call on instantiation.
    ///
    /// # Returns
    /// The registry itself, to chain registrations.
    pub fn register<F>(&mut self, target: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Params) -> Result<T> + Send + Sync + 'static,
    {
        let target = target.into();
        if self.factories.insert(target.clone(), Box::new(factory)).is_some() {
            log::warn!("replacing the factory registered for `{target}`");
        }

        self
    }

    /// Registers a factory that receives its params already deserialized into `C`.
    ///
    /// # Arguments
    /// * `target` - The dotted identifier configs will refer to.
    /// * `ctor` - The constructor to call with the deserialized params.
    ///
    /// # Returns
    /// The registry itself, to chain registrations.
    pub fn register_typed<C, F>(&mut self, target: impl Into<String>, ctor: F) -> &mut Self
    where
        T: 'static,
        C: DeserializeOwned + 'static,
        F: Fn(C) -> Result<T> + Send + Sync + 'static,
    {
        let target = target.into();
        let key = target.clone();

        self.register(key, move |params: &Params| {
            let value = Value::Object(params.clone());
            let config = serde_json::from_value(value).map_err(|source| {
                PreglyphErr::InvalidParams {
                    target: target.clone(),
                    source,
                }
            })?;

            ctor(config)
        })
    }

    pub fn contains(&self, target: &str) -> bool {
        self.factories.contains_key(target)
    }

    /// Returns the registered targets in no particular order.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Builds the entity named by a configuration node.
    ///
    /// # Arguments
    /// * `config` - The node holding the target and its params.
    ///
    /// # Returns
    /// Whatever the factory returned, or a configuration error if the target is missing,
    /// malformed or unknown.
    pub fn instantiate(&self, config: &ObjectConfig) -> Result<T> {
        let target = config.target()?;
        let factory = self.resolve(target)?;

        log::debug!(
            "instantiating `{}` with {} param(s)",
            target.as_str(),
            config.params().len()
        );

        factory(config.params())
    }

    /// Same as [`Registry::instantiate`] for a node that hasn't been parsed yet.
    pub fn instantiate_value(&self, node: Value) -> Result<T> {
        self.instantiate(&ObjectConfig::from_value(node)?)
    }

    fn resolve(&self, target: Target<'_>) -> Result<&Factory<T>> {
        self.factories
            .get(target.as_str())
            .ok_or_else(|| PreglyphErr::UnknownTarget {
                container: target.container().to_string(),
                member: target.member().to_string(),
            })
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

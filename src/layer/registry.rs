use super::{
    param::LayerParameter, AbsValLayer, EluLayer, Layer, PowerLayer, SoftmaxLayer,
    SoftmaxWithLossLayer,
};
use crate::{backend::Backend, error::LayerError, result::Result, scalar::Scalar};
use anyhow::bail;
use std::collections::HashMap;

/// Constructs a layer from its parameter.
///
/// The registry is passed so that composite layers can create their sub layers.
pub type Creator<T> = fn(&LayerParameter, &LayerRegistry<T>) -> Result<Box<dyn Layer<T>>>;

/// Maps layer type names to [`Creator`]s.
///
/// ```
/// # use caffeine::{backend::Backend, layer::{param::LayerParameter, registry::LayerRegistry}};
/// # fn main() -> anyhow::Result<()> {
/// let registry = LayerRegistry::<f32>::with_builtin_layers(Backend::Serial)?;
/// assert_eq!(
///     registry.layer_types().collect::<Vec<_>>(),
///     ["AbsVal", "ELU", "Power", "Softmax", "SoftmaxWithLoss"]
/// );
/// let layer = registry.create(&LayerParameter::new("prob", "Softmax"))?;
/// assert_eq!(layer.layer_type(), "Softmax");
/// # Ok(())
/// # }
/// ```
pub struct LayerRegistry<T: Scalar> {
    creators: HashMap<String, Creator<T>>,
    backend: Backend,
}

impl<T: Scalar> LayerRegistry<T> {
    /// Creates an empty registry. Layers are created with `backend`.
    pub fn new(backend: Backend) -> Self {
        Self {
            creators: HashMap::new(),
            backend,
        }
    }
    /// Creates a registry with the layers of this crate.
    pub fn with_builtin_layers(backend: Backend) -> Result<Self> {
        let mut registry = Self::new(backend);
        register_builtin_layers(&mut registry)?;
        Ok(registry)
    }
    /// The backend layers are created with.
    pub fn backend(&self) -> Backend {
        self.backend
    }
    /// Registers `creator` for `layer_type`.
    ///
    /// **Errors**
    ///
    /// [`LayerError::DuplicateLayerType`] if `layer_type` is already registered.
    pub fn register(&mut self, layer_type: impl Into<String>, creator: Creator<T>) -> Result<()> {
        let layer_type = layer_type.into();
        if self.creators.contains_key(&layer_type) {
            bail!(LayerError::DuplicateLayerType { layer_type });
        }
        tracing::trace!(%layer_type, "register");
        self.creators.insert(layer_type, creator);
        Ok(())
    }
    /// Creates a layer of type [`param.layer_type`](LayerParameter::layer_type).
    ///
    /// **Errors**
    ///
    /// [`LayerError::UnknownLayerType`] if the type is not registered, or an error from the
    /// creator.
    pub fn create(&self, param: &LayerParameter) -> Result<Box<dyn Layer<T>>> {
        let Some(creator) = self.creators.get(&param.layer_type) else {
            bail!(LayerError::UnknownLayerType {
                layer_type: param.layer_type.clone(),
                known: self.layer_types().collect::<Vec<_>>().join(", "),
            });
        };
        tracing::debug!(name = %param.name, layer_type = %param.layer_type, "create");
        creator(param, self)
    }
    /// The registered types, sorted.
    pub fn layer_types(&self) -> impl Iterator<Item = &str> + '_ {
        let mut layer_types: Vec<&str> = self.creators.keys().map(String::as_str).collect();
        layer_types.sort_unstable();
        layer_types.into_iter()
    }
}

impl<T: Scalar> std::fmt::Debug for LayerRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("LayerRegistry")
            .field("layer_types", &self.layer_types().collect::<Vec<_>>())
            .field("backend", &self.backend)
            .finish()
    }
}

/// Registers AbsVal, ELU, Power, Softmax and SoftmaxWithLoss.
pub fn register_builtin_layers<T: Scalar>(registry: &mut LayerRegistry<T>) -> Result<()> {
    registry.register(AbsValLayer::<T>::TYPE, AbsValLayer::create)?;
    registry.register(EluLayer::<T>::TYPE, EluLayer::create)?;
    registry.register(PowerLayer::<T>::TYPE, PowerLayer::create)?;
    registry.register(SoftmaxLayer::<T>::TYPE, SoftmaxLayer::create)?;
    registry.register(SoftmaxWithLossLayer::<T>::TYPE, SoftmaxWithLossLayer::create)?;
    Ok(())
}

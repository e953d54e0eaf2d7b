/*!
# caffeine
Blob based layer kernels with a forward / backward contract.

Every layer consumes input [`Blob`](blob::Blob)s ("bottoms") and produces output
blobs ("tops"). Layers are built from a [`LayerParameter`](layer::param::LayerParameter)
through a [`LayerRegistry`](layer::registry::LayerRegistry) and then driven
through the [`Layer`](layer::Layer) lifecycle: `set_up`, `reshape`, `forward` and
`backward`.

```
# use anyhow::Result;
# fn main() -> Result<()> {
use caffeine::{
    backend::Backend,
    blob::Blob,
    layer::{param::LayerParameter, registry::LayerRegistry},
};

let registry = LayerRegistry::<f32>::with_builtin_layers(Backend::Serial)?;
let mut elu = registry.create(&LayerParameter::new("elu1", "ELU"))?;
let x = Blob::from_shape_vec([1, 3], vec![-1., 0., 2.])?;
let mut y = Blob::new([1, 3]);
elu.set_up(&[&x], &mut [&mut y])?;
elu.forward(&[&x], &mut [&mut y])?;
assert_eq!(y.data()[2], 2.);
# Ok(())
# }
```
*/
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Element types.
pub mod scalar;

/// Blobs.
pub mod blob;

/// Execution backends.
pub mod backend;

/// Errors.
pub mod error;

/// Layers.
pub mod layer;

/// Result type.
pub mod result {
    /// Result type.
    ///
    /// See [`anyhow::Result`].
    pub type Result<T, E = anyhow::Error> = anyhow::Result<T, E>;
}

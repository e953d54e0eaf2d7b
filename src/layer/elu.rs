use super::{neuron, param::LayerParameter, registry::LayerRegistry, BlobCounts, Layer};
use crate::{backend::Backend, blob::Blob, result::Result, scalar::Scalar};

/// Exponential linear unit.
///
/// `y = x` if `x > 0`, otherwise `alpha * (exp(x) - 1)`.
///
/// Computed as `max(x, 0) + alpha * (exp(min(x, 0)) - 1)`, so the exponential never overflows
/// for large positive `x`. Supports in-place computation.
#[derive(Debug)]
pub struct EluLayer<T> {
    param: LayerParameter,
    backend: Backend,
    alpha: T,
}

impl<T: Scalar> EluLayer<T> {
    /// Registered type name.
    pub const TYPE: &'static str = "ELU";
    /// Creates a new [`EluLayer`].
    pub fn new(param: LayerParameter, backend: Backend) -> Self {
        let alpha = T::from_f64_lossy(param.elu_param.alpha.into());
        Self {
            param,
            backend,
            alpha,
        }
    }
    pub(super) fn create(
        param: &LayerParameter,
        registry: &LayerRegistry<T>,
    ) -> Result<Box<dyn Layer<T>>> {
        Ok(Box::new(Self::new(param.clone(), registry.backend())))
    }
    /// The `alpha` parameter.
    pub fn alpha(&self) -> T {
        self.alpha
    }
}

fn elu<T: Scalar>(x: T, alpha: T) -> T {
    x.max(T::zero()) + alpha * (x.min(T::zero()).exp() - T::one())
}

impl<T: Scalar> Layer<T> for EluLayer<T> {
    fn layer_type(&self) -> &'static str {
        Self::TYPE
    }
    fn param(&self) -> &LayerParameter {
        &self.param
    }
    fn blob_counts(&self) -> BlobCounts {
        BlobCounts::neuron()
    }
    fn reshape(&mut self, bottom: &[&Blob<T>], top: &mut [&mut Blob<T>]) -> Result<()> {
        neuron::reshape(bottom, top)
    }
    fn forward(&mut self, bottom: &[&Blob<T>], top: &mut [&mut Blob<T>]) -> Result<()> {
        let alpha = self.alpha;
        neuron::forward_map(&self.backend, bottom[0], top[0], move |x| elu(x, alpha));
        Ok(())
    }
    fn backward(
        &mut self,
        top: &[&Blob<T>],
        propagate_down: &[bool],
        bottom: &mut [&mut Blob<T>],
    ) -> Result<()> {
        if propagate_down[0] {
            let alpha = self.alpha;
            // In-place, x is y, which has the same sign.
            neuron::backward_map(&self.backend, top[0], bottom[0], move |x, y, dy| {
                if x > T::zero() {
                    dy
                } else {
                    dy * (y + alpha)
                }
            });
        }
        Ok(())
    }
}

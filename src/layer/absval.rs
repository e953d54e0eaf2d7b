use super::{neuron, param::LayerParameter, registry::LayerRegistry, BlobCounts, Layer};
use crate::{backend::Backend, blob::Blob, error::LayerError, result::Result, scalar::Scalar};
use anyhow::bail;
use std::marker::PhantomData;

/// Computes `y = |x|`.
///
/// Does not allow in-place computation.
#[derive(Debug)]
pub struct AbsValLayer<T> {
    param: LayerParameter,
    backend: Backend,
    _m: PhantomData<T>,
}

impl<T: Scalar> AbsValLayer<T> {
    /// Registered type name.
    pub const TYPE: &'static str = "AbsVal";
    /// Creates a new [`AbsValLayer`].
    pub fn new(param: LayerParameter, backend: Backend) -> Self {
        Self {
            param,
            backend,
            _m: PhantomData,
        }
    }
    pub(super) fn create(
        param: &LayerParameter,
        registry: &LayerRegistry<T>,
    ) -> Result<Box<dyn Layer<T>>> {
        Ok(Box::new(Self::new(param.clone(), registry.backend())))
    }
}

fn sign<T: Scalar>(x: T) -> T {
    if x > T::zero() {
        T::one()
    } else if x < T::zero() {
        -T::one()
    } else {
        T::zero()
    }
}

impl<T: Scalar> Layer<T> for AbsValLayer<T> {
    fn layer_type(&self) -> &'static str {
        Self::TYPE
    }
    fn param(&self) -> &LayerParameter {
        &self.param
    }
    fn blob_counts(&self) -> BlobCounts {
        BlobCounts::neuron()
    }
    fn layer_set_up(&mut self, bottom: &[&Blob<T>], top: &mut [&mut Blob<T>]) -> Result<()> {
        let in_place = top[0].shares_data_with(bottom[0])
            || self
                .param
                .top
                .first()
                .is_some_and(|top| self.param.bottom.first() == Some(top));
        if in_place {
            bail!(LayerError::InPlaceNotAllowed {
                layer_type: Self::TYPE,
            });
        }
        Ok(())
    }
    fn reshape(&mut self, bottom: &[&Blob<T>], top: &mut [&mut Blob<T>]) -> Result<()> {
        neuron::reshape(bottom, top)
    }
    fn forward(&mut self, bottom: &[&Blob<T>], top: &mut [&mut Blob<T>]) -> Result<()> {
        let x = bottom[0].data();
        let mut y = top[0].data_mut();
        self.backend.abs(&x, &mut y);
        Ok(())
    }
    fn backward(
        &mut self,
        top: &[&Blob<T>],
        propagate_down: &[bool],
        bottom: &mut [&mut Blob<T>],
    ) -> Result<()> {
        if propagate_down[0] {
            neuron::backward_map(&self.backend, top[0], bottom[0], |x, _y, dy| sign(x) * dy);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn absval(backend: Backend) -> AbsValLayer<f32> {
        AbsValLayer::new(
            LayerParameter::new("abs", AbsValLayer::<f32>::TYPE)
                .with_bottom(["x"])
                .with_top(["y"]),
            backend,
        )
    }

    #[test]
    fn forward_backward() {
        for backend in [Backend::Serial, Backend::Parallel { min_len: 1 }] {
            let mut layer = absval(backend);
            let x = Blob::from_shape_vec([2, 3], vec![-3., -0.5, 0., 0.5, 2., -1e30]).unwrap();
            let mut y = Blob::new([1]);
            layer.set_up(&[&x], &mut [&mut y]).unwrap();
            assert_eq!(y.shape(), &[2, 3]);
            layer.forward(&[&x], &mut [&mut y]).unwrap();
            assert_eq!(y.to_vec(), vec![3., 0.5, 0., 0.5, 2., 1e30]);

            y.diff_mut().copy_from_slice(&[1., 2., 3., 4., 5., 6.]);
            let mut x = x;
            layer.backward(&[&y], &[true], &mut [&mut x]).unwrap();
            assert_eq!(x.diff_to_vec(), vec![-1., -2., 0., 4., 5., -6.]);
        }
    }

    #[test]
    fn idempotent() {
        let mut layer = absval(Backend::Serial);
        let x = Blob::from_shape_vec([4], vec![-1.5, 2.5, -0., 7.]).unwrap();
        let mut y = Blob::new([4]);
        let mut z = Blob::new([4]);
        layer.set_up(&[&x], &mut [&mut y]).unwrap();
        layer.forward(&[&x], &mut [&mut y]).unwrap();
        layer.forward(&[&y], &mut [&mut z]).unwrap();
        assert_eq!(y.to_vec(), z.to_vec());
    }

    #[test]
    fn in_place_rejected() {
        let x = Blob::<f32>::new([3]);
        let mut y = Blob::new([3]);
        y.share_data(&x).unwrap();
        let mut layer = absval(Backend::Serial);
        let error = layer.set_up(&[&x], &mut [&mut y]).unwrap_err();
        assert_eq!(
            error.downcast_ref::<LayerError>(),
            Some(&LayerError::InPlaceNotAllowed { layer_type: "AbsVal" })
        );

        let mut layer = AbsValLayer::<f32>::new(
            LayerParameter::new("abs", "AbsVal")
                .with_bottom(["x"])
                .with_top(["x"]),
            Backend::Serial,
        );
        let mut y = Blob::new([3]);
        assert!(layer.set_up(&[&x], &mut [&mut y]).is_err());
    }

    #[test]
    fn blob_counts() {
        let mut layer = absval(Backend::Serial);
        let x = Blob::<f32>::new([3]);
        let mut y = Blob::new([3]);
        let mut z = Blob::new([3]);
        let error = layer.set_up(&[&x], &mut [&mut y, &mut z]).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<LayerError>(),
            Some(LayerError::BlobCount { kind: "top", .. })
        ));
    }
}

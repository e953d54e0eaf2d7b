use super::{neuron, param::LayerParameter, registry::LayerRegistry, BlobCounts, Layer};
use crate::{backend::Backend, blob::Blob, result::Result, scalar::Scalar};
use ndarray::{ArrayView3, ArrayViewMut1, ArrayViewMut3, Axis, Zip};

/// Softmax along an axis.
///
/// The input is viewed as `[outer, channels, inner]`, where `channels` is the dimension of the
/// softmax axis, and normalized along `channels` for every `(outer, inner)` position.
#[derive(Debug)]
pub struct SoftmaxLayer<T> {
    param: LayerParameter,
    backend: Backend,
    axis: usize,
    outer_num: usize,
    channels: usize,
    inner_num: usize,
    _m: std::marker::PhantomData<T>,
}

impl<T: Scalar> SoftmaxLayer<T> {
    /// Registered type name.
    pub const TYPE: &'static str = "Softmax";
    /// Creates a new [`SoftmaxLayer`].
    pub fn new(param: LayerParameter, backend: Backend) -> Self {
        Self {
            param,
            backend,
            axis: 0,
            outer_num: 0,
            channels: 0,
            inner_num: 0,
            _m: Default::default(),
        }
    }
    pub(super) fn create(
        param: &LayerParameter,
        registry: &LayerRegistry<T>,
    ) -> Result<Box<dyn Layer<T>>> {
        Ok(Box::new(Self::new(param.clone(), registry.backend())))
    }
    /// The canonical softmax axis, after [`reshape`](Layer::reshape).
    pub fn axis(&self) -> usize {
        self.axis
    }
    fn dim(&self) -> (usize, usize, usize) {
        (self.outer_num, self.channels, self.inner_num)
    }
}

fn softmax_lane<T: Scalar>(mut y: ArrayViewMut1<T>) {
    let max = y.fold(T::neg_infinity(), |max, &y| max.max(y));
    y.mapv_inplace(|y| (y - max).exp());
    let sum = y.sum();
    y.mapv_inplace(|y| y / sum);
}

impl<T: Scalar> Layer<T> for SoftmaxLayer<T> {
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
        let x = bottom[0];
        self.axis = x.canonical_axis_index(self.param.softmax_param.axis)?;
        self.outer_num = x.count_range(0, self.axis);
        self.channels = x.shape()[self.axis];
        self.inner_num = x.count_from(self.axis + 1);
        neuron::reshape(bottom, top)
    }
    fn forward(&mut self, bottom: &[&Blob<T>], top: &mut [&mut Blob<T>]) -> Result<()> {
        if !top[0].shares_data_with(bottom[0]) {
            let x = bottom[0].data();
            self.backend.copy(&x, &mut top[0].data_mut());
        }
        let mut y = top[0].data_mut();
        let mut y = ArrayViewMut3::from_shape(self.dim(), &mut *y)?;
        let lanes = Zip::from(y.lanes_mut(Axis(1)));
        match self.backend {
            Backend::Serial => lanes.for_each(softmax_lane::<T>),
            Backend::Parallel { .. } => lanes.par_for_each(softmax_lane::<T>),
        }
        Ok(())
    }
    fn backward(
        &mut self,
        top: &[&Blob<T>],
        propagate_down: &[bool],
        bottom: &mut [&mut Blob<T>],
    ) -> Result<()> {
        if !propagate_down[0] {
            return Ok(());
        }
        if !bottom[0].shares_diff_with(top[0]) {
            let dy = top[0].diff();
            self.backend.copy(&dy, &mut bottom[0].diff_mut());
        }
        let y = top[0].data();
        let y = ArrayView3::from_shape(self.dim(), &*y)?;
        let mut dx = bottom[0].diff_mut();
        let mut dx = ArrayViewMut3::from_shape(self.dim(), &mut *dx)?;
        // dx = (dy - sum(dy * y)) * y
        let lanes = Zip::from(dx.lanes_mut(Axis(1))).and(y.lanes(Axis(1)));
        let f = |mut dx: ArrayViewMut1<T>, y: ndarray::ArrayView1<T>| {
            let dot = dx.dot(&y);
            dx.zip_mut_with(&y, |dx, &y| *dx = (*dx - dot) * y);
        };
        match self.backend {
            Backend::Serial => lanes.for_each(f),
            Backend::Parallel { .. } => lanes.par_for_each(f),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::param::SoftmaxParameter;
    use approx::assert_relative_eq;

    fn softmax(axis: isize, backend: Backend) -> SoftmaxLayer<f64> {
        SoftmaxLayer::new(
            LayerParameter::new("prob", SoftmaxLayer::<f64>::TYPE)
                .with_softmax_param(SoftmaxParameter { axis }),
            backend,
        )
    }

    #[test]
    fn normalized_along_axis() {
        for backend in [Backend::Serial, Backend::Parallel { min_len: 1 }] {
            let mut layer = softmax(1, backend);
            let data: Vec<f64> = (0..24).map(|i| (i as f64 * 0.37).sin() * 5.).collect();
            let x = Blob::from_shape_vec([2, 3, 4], data).unwrap();
            let mut y = Blob::new([1]);
            layer.set_up(&[&x], &mut [&mut y]).unwrap();
            layer.forward(&[&x], &mut [&mut y]).unwrap();
            let y = y.to_vec();
            for i in 0..2 {
                for j in 0..4 {
                    let sum: f64 = (0..3).map(|c| y[i * 12 + c * 4 + j]).sum();
                    assert_relative_eq!(sum, 1., max_relative = 1e-12);
                }
            }
        }
    }

    #[test]
    fn stable_for_large_inputs() {
        let mut layer = softmax(-1, Backend::Serial);
        let x = Blob::from_shape_vec([1, 2], vec![1000., 999.]).unwrap();
        let mut y = Blob::new([1, 2]);
        layer.set_up(&[&x], &mut [&mut y]).unwrap();
        assert_eq!(layer.axis(), 1);
        layer.forward(&[&x], &mut [&mut y]).unwrap();
        let y = y.to_vec();
        let e = (-1f64).exp();
        assert_relative_eq!(y[0], 1. / (1. + e));
        assert_relative_eq!(y[1], e / (1. + e));
    }

    #[test]
    fn axis_out_of_range() {
        let mut layer = softmax(2, Backend::Serial);
        let x = Blob::new([2, 3]);
        let mut y = Blob::new([2, 3]);
        assert!(layer.set_up(&[&x], &mut [&mut y]).is_err());
    }

    #[test]
    fn backward_finite_difference() {
        let input = vec![0.2, -1.1, 0.5, 1.7, 0.3, -0.4];
        let dy = [0.3, -0.7, 1.1, 0.2, 0.9, -0.5];
        let weighted = |input: &[f64]| -> f64 {
            let mut layer = softmax(1, Backend::Serial);
            let x = Blob::from_shape_vec([2, 3], input.to_vec()).unwrap();
            let mut y = Blob::new([2, 3]);
            layer.set_up(&[&x], &mut [&mut y]).unwrap();
            layer.forward(&[&x], &mut [&mut y]).unwrap();
            y.to_vec().iter().zip(dy).map(|(y, dy)| y * dy).sum()
        };
        for backend in [Backend::Serial, Backend::Parallel { min_len: 1 }] {
            let mut layer = softmax(1, backend);
            let mut x = Blob::from_shape_vec([2, 3], input.clone()).unwrap();
            let mut y = Blob::new([2, 3]);
            layer.set_up(&[&x], &mut [&mut y]).unwrap();
            layer.forward(&[&x], &mut [&mut y]).unwrap();
            y.diff_mut().copy_from_slice(&dy);
            layer.backward(&[&y], &[true], &mut [&mut x]).unwrap();
            let dx = x.diff_to_vec();
            let h = 1e-6;
            for i in 0..input.len() {
                let mut plus = input.clone();
                plus[i] += h;
                let mut minus = input.clone();
                minus[i] -= h;
                let numeric = (weighted(&plus) - weighted(&minus)) / (2. * h);
                assert_relative_eq!(dx[i], numeric, epsilon = 1e-8, max_relative = 1e-5);
            }
        }
    }
}

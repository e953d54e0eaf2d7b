use super::{neuron, param::LayerParameter, registry::LayerRegistry, BlobCounts, Layer};
use crate::{backend::Backend, blob::Blob, result::Result, scalar::Scalar};

/// Computes `y = (shift + scale * x)^power`.
///
/// Scale, shift and power are applied as separate passes, each skipped when it is the
/// identity. When `power * scale == 0` the output is constant and the input is not read.
#[derive(Debug)]
pub struct PowerLayer<T> {
    param: LayerParameter,
    backend: Backend,
    power: T,
    scale: T,
    shift: T,
    diff_scale: T,
}

impl<T: Scalar> PowerLayer<T> {
    /// Registered type name.
    pub const TYPE: &'static str = "Power";
    /// Creates a new [`PowerLayer`].
    pub fn new(param: LayerParameter, backend: Backend) -> Self {
        let power = T::from_f64_lossy(param.power_param.power.into());
        let scale = T::from_f64_lossy(param.power_param.scale.into());
        let shift = T::from_f64_lossy(param.power_param.shift.into());
        Self {
            param,
            backend,
            power,
            scale,
            shift,
            diff_scale: power * scale,
        }
    }
    pub(super) fn create(
        param: &LayerParameter,
        registry: &LayerRegistry<T>,
    ) -> Result<Box<dyn Layer<T>>> {
        Ok(Box::new(Self::new(param.clone(), registry.backend())))
    }
    /// `power * scale`, the derivative scale.
    pub fn diff_scale(&self) -> T {
        self.diff_scale
    }
    /// The constant output when `diff_scale` is 0.
    fn constant(&self) -> T {
        if self.power == T::zero() {
            T::one()
        } else {
            self.shift.powf(self.power)
        }
    }
}

impl<T: Scalar> Layer<T> for PowerLayer<T> {
    fn layer_type(&self) -> &'static str {
        Self::TYPE
    }
    fn param(&self) -> &LayerParameter {
        &self.param
    }
    fn blob_counts(&self) -> BlobCounts {
        BlobCounts::neuron()
    }
    fn layer_set_up(&mut self, _bottom: &[&Blob<T>], _top: &mut [&mut Blob<T>]) -> Result<()> {
        tracing::debug!(
            power = %self.power,
            scale = %self.scale,
            shift = %self.shift,
            diff_scale = %self.diff_scale,
            "power"
        );
        Ok(())
    }
    fn reshape(&mut self, bottom: &[&Blob<T>], top: &mut [&mut Blob<T>]) -> Result<()> {
        neuron::reshape(bottom, top)
    }
    fn forward(&mut self, bottom: &[&Blob<T>], top: &mut [&mut Blob<T>]) -> Result<()> {
        let backend = &self.backend;
        if self.diff_scale == T::zero() {
            backend.fill(&mut top[0].data_mut(), self.constant());
            return Ok(());
        }
        if !top[0].shares_data_with(bottom[0]) {
            let x = bottom[0].data();
            backend.copy(&x, &mut top[0].data_mut());
        }
        let mut y = top[0].data_mut();
        if self.scale != T::one() {
            backend.scale(&mut y, self.scale);
        }
        if self.shift != T::zero() {
            backend.add_scalar(&mut y, self.shift);
        }
        if self.power != T::one() {
            backend.powx(&mut y, self.power);
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
        let Self {
            backend,
            power,
            scale,
            shift,
            diff_scale,
            ..
        } = *self;
        let one = T::one();
        let two = one + one;
        // dy/dx = diff_scale * (shift + scale * x)^(power - 1)
        if diff_scale == T::zero() {
            neuron::backward_map(&backend, top[0], bottom[0], |_x, _y, _dy| T::zero());
        } else if power == one {
            neuron::backward_map(&backend, top[0], bottom[0], move |_x, _y, dy| {
                diff_scale * dy
            });
        } else if power == two {
            neuron::backward_map(&backend, top[0], bottom[0], move |x, _y, dy| {
                diff_scale * (shift + scale * x) * dy
            });
        } else {
            neuron::backward_map(&backend, top[0], bottom[0], move |x, _y, dy| {
                diff_scale * (shift + scale * x).powf(power - one) * dy
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::param::PowerParameter;
    use approx::assert_relative_eq;

    fn power_layer(power: f32, scale: f32, shift: f32) -> PowerLayer<f32> {
        PowerLayer::new(
            LayerParameter::new("power", PowerLayer::<f32>::TYPE).with_power_param(
                PowerParameter {
                    power,
                    scale,
                    shift,
                },
            ),
            Backend::Serial,
        )
    }

    fn forward(layer: &mut PowerLayer<f32>, input: Vec<f32>) -> Vec<f32> {
        let x = Blob::from_shape_vec([input.len()], input).unwrap();
        let mut y = Blob::new([1]);
        layer.set_up(&[&x], &mut [&mut y]).unwrap();
        layer.forward(&[&x], &mut [&mut y]).unwrap();
        y.to_vec()
    }

    #[test]
    fn zero_power_is_one() {
        let mut layer = power_layer(0., 0., 5.);
        assert_eq!(layer.diff_scale(), 0.);
        let y = forward(&mut layer, vec![f32::NAN, f32::INFINITY, -3., 1e30]);
        assert_eq!(y, vec![1.; 4]);
    }

    #[test]
    fn zero_scale_is_shift_pow() {
        let mut layer = power_layer(3., 0., 2.);
        let y = forward(&mut layer, vec![f32::NAN, 4.]);
        assert_eq!(y, vec![8.; 2]);
    }

    #[test]
    fn square() {
        let mut layer = power_layer(2., 1., 0.);
        let input = vec![-3., -0.5, 0., 1.5, 4.];
        let y = forward(&mut layer, input.clone());
        for (y, x) in y.into_iter().zip(input) {
            assert_relative_eq!(y, x * x);
        }
    }

    #[test]
    fn identity() {
        let mut layer = power_layer(1., 1., 0.);
        let input = vec![-3., f32::MAX, 0.25];
        assert_eq!(forward(&mut layer, input.clone()), input);
    }

    #[test]
    fn general() {
        let mut layer = power_layer(0.5, 2., 1.);
        let y = forward(&mut layer, vec![0., 1.5, 4.]);
        assert_relative_eq!(y[0], 1.);
        assert_relative_eq!(y[1], 2.);
        assert_relative_eq!(y[2], 3.);
    }

    #[test]
    fn backward_finite_difference() {
        let params = [
            (2., 1., 0.),
            (1., 3., -1.),
            (0., 2., 1.),
            (3., 0.5, 1.),
            (1.5, 2., 1.),
            (-1., 1., 2.),
        ];
        for (power, scale, shift) in params {
            let mut layer = PowerLayer::<f64>::new(
                LayerParameter::new("power", "Power").with_power_param(PowerParameter {
                    power,
                    scale,
                    shift,
                }),
                Backend::Parallel { min_len: 1 },
            );
            let input = vec![0.1, 0.7, 1.3];
            let mut x = Blob::from_shape_vec([3], input.clone()).unwrap();
            let mut y = Blob::new([3]);
            layer.set_up(&[&x], &mut [&mut y]).unwrap();
            layer.forward(&[&x], &mut [&mut y]).unwrap();
            y.diff_mut().copy_from_slice(&[1., -2., 0.5]);
            layer.backward(&[&y], &[true], &mut [&mut x]).unwrap();
            let f = |x: f64| (shift as f64 + scale as f64 * x).powf(power as f64);
            let h = 1e-6;
            for ((x, dx), dy) in input.into_iter().zip(x.diff_to_vec()).zip([1., -2., 0.5]) {
                let numeric = (f(x + h) - f(x - h)) / (2. * h) * dy;
                assert_relative_eq!(dx, numeric, epsilon = 1e-8, max_relative = 1e-5);
            }
        }
    }

    #[test]
    fn in_place() {
        let mut layer = power_layer(2., 2., 1.);
        let x = Blob::from_shape_vec([3], vec![0., 1., 2.]).unwrap();
        let mut y = Blob::new([3]);
        y.share_data(&x).unwrap();
        layer.set_up(&[&x], &mut [&mut y]).unwrap();
        layer.forward(&[&x], &mut [&mut y]).unwrap();
        assert_eq!(x.to_vec(), vec![1., 9., 25.]);
    }
}

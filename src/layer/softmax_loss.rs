use super::{
    loss::{self, NormalizationMode},
    param::LayerParameter,
    registry::LayerRegistry,
    BlobCounts, Layer, SoftmaxLayer,
};
use crate::{backend::Backend, blob::Blob, error::LayerError, result::Result, scalar::Scalar};
use anyhow::bail;

/// Softmax followed by the multinomial logistic loss.
///
/// Bottoms are the predictions `[.., channels, ..]` and the labels, one per `(outer, inner)`
/// position, holding integer class indices in `0 .. channels`. `top[0]` is the scalar loss, an
/// optional `top[1]` aliases the probabilities.
///
/// Combining the two layers gives a gradient that is numerically stable,
/// `prob - onehot(label)`.
#[derive(Debug)]
pub struct SoftmaxWithLossLayer<T: Scalar> {
    param: LayerParameter,
    backend: Backend,
    softmax: Box<dyn Layer<T>>,
    prob: Blob<T>,
    ignore_label: Option<i64>,
    normalization: NormalizationMode,
    axis: usize,
    outer_num: usize,
    inner_num: usize,
}

fn softmax_param(param: &LayerParameter) -> LayerParameter {
    let mut softmax_param =
        LayerParameter::new(format!("{}/softmax", param.name), SoftmaxLayer::<f32>::TYPE);
    softmax_param.softmax_param = param.softmax_param;
    softmax_param
}

/// The class of `label`, checked against `channels`.
///
/// **Panics**
///
/// If `label` is not in `0 .. channels`.
fn class_index(label: i64, channels: usize) -> usize {
    match usize::try_from(label) {
        Ok(class) if class < channels => class,
        _ => panic!("label {label} out of range 0 .. {channels}"),
    }
}

impl<T: Scalar> SoftmaxWithLossLayer<T> {
    /// Registered type name.
    pub const TYPE: &'static str = "SoftmaxWithLoss";
    /// Creates a new [`SoftmaxWithLossLayer`] with an internal [`SoftmaxLayer`].
    pub fn new(param: LayerParameter, backend: Backend) -> Self {
        let softmax = Box::new(SoftmaxLayer::new(softmax_param(&param), backend));
        Self::with_softmax(param, backend, softmax)
    }
    fn with_softmax(param: LayerParameter, backend: Backend, softmax: Box<dyn Layer<T>>) -> Self {
        let loss_param = &param.loss_param;
        let ignore_label = loss_param.ignore_label.map(i64::from);
        let normalization = loss_param.normalization_mode();
        Self {
            param,
            backend,
            softmax,
            prob: Blob::new([0]),
            ignore_label,
            normalization,
            axis: 0,
            outer_num: 0,
            inner_num: 0,
        }
    }
    /// Creates the layer, with its softmax created by `registry`.
    pub(super) fn create(
        param: &LayerParameter,
        registry: &LayerRegistry<T>,
    ) -> Result<Box<dyn Layer<T>>> {
        let softmax = registry.create(&softmax_param(param))?;
        Ok(Box::new(Self::with_softmax(
            param.clone(),
            registry.backend(),
            softmax,
        )))
    }
    /// The resolved normalization mode.
    pub fn normalization(&self) -> NormalizationMode {
        self.normalization
    }
    /// The label excluded from the loss, if any.
    pub fn ignore_label(&self) -> Option<i64> {
        self.ignore_label
    }
    /// The softmax probabilities from the last forward.
    pub fn prob(&self) -> &Blob<T> {
        &self.prob
    }
    fn is_ignored(&self, label: i64) -> bool {
        self.ignore_label == Some(label)
    }
    fn normalizer(&self, valid_count: usize) -> T {
        loss::normalizer(
            self.normalization,
            self.outer_num,
            self.inner_num,
            Some(valid_count),
        )
    }
    fn channels(&self) -> usize {
        self.prob.shape()[self.axis]
    }
}

impl<T: Scalar> Layer<T> for SoftmaxWithLossLayer<T> {
    fn layer_type(&self) -> &'static str {
        Self::TYPE
    }
    fn param(&self) -> &LayerParameter {
        &self.param
    }
    fn blob_counts(&self) -> BlobCounts {
        BlobCounts {
            exact_bottom: Some(2),
            min_top: Some(1),
            max_top: Some(2),
            ..BlobCounts::default()
        }
    }
    fn is_loss(&self) -> bool {
        true
    }
    fn layer_set_up(&mut self, bottom: &[&Blob<T>], _top: &mut [&mut Blob<T>]) -> Result<()> {
        self.softmax.set_up(&bottom[..1], &mut [&mut self.prob])?;
        tracing::debug!(
            ignore_label = ?self.ignore_label,
            normalization = %self.normalization,
            "softmax loss"
        );
        Ok(())
    }
    fn reshape(&mut self, bottom: &[&Blob<T>], top: &mut [&mut Blob<T>]) -> Result<()> {
        loss::reshape_loss(bottom, top)?;
        self.softmax.reshape(&bottom[..1], &mut [&mut self.prob])?;
        let x = bottom[0];
        self.axis = x.canonical_axis_index(self.param.softmax_param.axis)?;
        self.outer_num = x.count_range(0, self.axis);
        self.inner_num = x.count_from(self.axis + 1);
        let expected = self.outer_num * self.inner_num;
        let actual = bottom[1].count();
        if expected != actual {
            bail!(LayerError::LabelCountMismatch { expected, actual });
        }
        if let Some(prob) = top.get_mut(1) {
            prob.reshape_like(x);
        }
        Ok(())
    }
    fn forward(&mut self, bottom: &[&Blob<T>], top: &mut [&mut Blob<T>]) -> Result<()> {
        self.softmax.forward(&bottom[..1], &mut [&mut self.prob])?;
        let channels = self.channels();
        let dim = channels * self.inner_num;
        let (loss, valid_count) = {
            let prob = self.prob.data();
            let label = bottom[1].data();
            let mut loss = 0f64;
            let mut valid_count = 0usize;
            for i in 0..self.outer_num {
                for j in 0..self.inner_num {
                    let label = label[i * self.inner_num + j].label();
                    if self.is_ignored(label) {
                        continue;
                    }
                    let p = prob[i * dim + class_index(label, channels) * self.inner_num + j];
                    loss -= p.max(T::min_positive_value()).ln().to_f64_lossy();
                    valid_count += 1;
                }
            }
            (loss, valid_count)
        };
        let normalizer = self.normalizer(valid_count).to_f64_lossy();
        let loss = loss / normalizer;
        tracing::trace!(loss, valid_count, "forward");
        top[0].data_mut()[0] = T::from_f64_lossy(loss);
        if let Some(prob) = top.get_mut(1) {
            prob.share_data(&self.prob)?;
        }
        Ok(())
    }
    fn backward(
        &mut self,
        top: &[&Blob<T>],
        propagate_down: &[bool],
        bottom: &mut [&mut Blob<T>],
    ) -> Result<()> {
        if propagate_down.get(1).copied().unwrap_or(false) {
            bail!(LayerError::NonDifferentiableInput {
                layer_type: Self::TYPE,
                input: "label",
            });
        }
        if !propagate_down[0] {
            return Ok(());
        }
        let channels = self.channels();
        let dim = channels * self.inner_num;
        let (x, label) = bottom.split_at_mut(1);
        let label = label[0].data();
        let mut dx = x[0].diff_mut();
        self.backend.copy(&self.prob.data(), &mut dx);
        let mut valid_count = 0usize;
        for i in 0..self.outer_num {
            for j in 0..self.inner_num {
                let label = label[i * self.inner_num + j].label();
                if self.is_ignored(label) {
                    for c in 0..channels {
                        dx[i * dim + c * self.inner_num + j] = T::zero();
                    }
                } else {
                    let k = i * dim + class_index(label, channels) * self.inner_num + j;
                    dx[k] = dx[k] - T::one();
                    valid_count += 1;
                }
            }
        }
        let loss_weight = top[0].diff()[0] / self.normalizer(valid_count);
        self.backend.scale(&mut dx, loss_weight);
        Ok(())
    }
}

use crate::{blob::Blob, error::LayerError, result::Result, scalar::Scalar};
use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Determines the denominator used to average a summed loss.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NormalizationMode {
    /// Divide by the number of predictions, `outer * inner`, ignored or not.
    #[display(fmt = "FULL")]
    Full,
    /// Divide by the number of predictions that were not ignored.
    #[display(fmt = "VALID")]
    Valid,
    /// Divide by the batch size, `outer`.
    #[default]
    #[display(fmt = "BATCH_SIZE")]
    BatchSize,
    /// Do not normalize.
    #[display(fmt = "NONE")]
    None,
}

/// The normalizer for a summed loss.
///
/// `valid_count` is the number of predictions that were not ignored, if counted. For
/// [`Valid`](NormalizationMode::Valid) without a count, all `outer * inner` predictions are
/// assumed valid.
///
/// The result is never less than 1, so that a loss where every label is ignored is 0 rather
/// than NaN.
pub fn normalizer<T: Scalar>(
    mode: NormalizationMode,
    outer_num: usize,
    inner_num: usize,
    valid_count: Option<usize>,
) -> T {
    let normalizer = match mode {
        NormalizationMode::Full => outer_num * inner_num,
        NormalizationMode::Valid => valid_count.unwrap_or(outer_num * inner_num),
        NormalizationMode::BatchSize => outer_num,
        NormalizationMode::None => 1,
    };
    T::from_f64_lossy(normalizer.max(1) as f64)
}

/// The default weight of `top[0]` for loss layers.
pub(crate) const DEFAULT_LOSS_WEIGHT: f32 = 1.;

/// Shape checks shared by loss layers.
///
/// `bottom[0]` holds predictions and `bottom[1]` targets, which must agree in the first
/// dimension. `top[0]` becomes a scalar.
pub(crate) fn reshape_loss<T: Scalar>(bottom: &[&Blob<T>], top: &mut [&mut Blob<T>]) -> Result<()> {
    let data = bottom[0].shape().first().copied().unwrap_or(1);
    let label = bottom[1].shape().first().copied().unwrap_or(1);
    if data != label {
        bail!(LayerError::FirstDimMismatch { data, label });
    }
    top[0].reshape(ndarray::IxDyn(&[]));
    Ok(())
}

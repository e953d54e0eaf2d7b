use crate::{
    blob::Blob,
    error::LayerError,
    result::Result,
    scalar::Scalar,
};
use anyhow::bail;
use param::LayerParameter;
use std::fmt::Debug;

/// Layer configuration.
pub mod param;

/// Layer type name to constructor mapping.
pub mod registry;

/// Loss normalization.
pub mod loss;

mod neuron;

/// Absolute value.
pub mod absval;
/// Exponential linear unit.
pub mod elu;
/// Power.
pub mod power;
/// Softmax.
pub mod softmax;
/// Softmax with cross entropy loss.
pub mod softmax_loss;

pub use absval::AbsValLayer;
pub use elu::EluLayer;
pub use power::PowerLayer;
pub use softmax::SoftmaxLayer;
pub use softmax_loss::SoftmaxWithLossLayer;


/// The number of bottom and top blobs a layer accepts.
///
/// `None` places no constraint.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BlobCounts {
    pub exact_bottom: Option<usize>,
    pub min_bottom: Option<usize>,
    pub max_bottom: Option<usize>,
    pub exact_top: Option<usize>,
    pub min_top: Option<usize>,
    pub max_top: Option<usize>,
}

impl BlobCounts {
    /// Exactly one bottom and one top.
    pub const fn neuron() -> Self {
        Self {
            exact_bottom: Some(1),
            min_bottom: None,
            max_bottom: None,
            exact_top: Some(1),
            min_top: None,
            max_top: None,
        }
    }
    /// Checks `bottom` and `top` counts for `layer_type`.
    ///
    /// **Errors**
    ///
    /// [`LayerError::BlobCount`]
    pub fn check(&self, layer_type: &'static str, bottom: usize, top: usize) -> Result<()> {
        fn check_one(
            layer_type: &'static str,
            kind: &'static str,
            actual: usize,
            exact: Option<usize>,
            min: Option<usize>,
            max: Option<usize>,
        ) -> Result<()> {
            let expected = if let Some(exact) = exact {
                (actual != exact).then(|| exact.to_string())
            } else if let Some(min) = min.filter(|min| actual < *min) {
                Some(format!("at least {min}"))
            } else {
                max.filter(|max| actual > *max)
                    .map(|max| format!("at most {max}"))
            };
            if let Some(expected) = expected {
                bail!(LayerError::BlobCount {
                    layer_type,
                    kind,
                    expected,
                    actual,
                });
            }
            Ok(())
        }
        check_one(
            layer_type,
            "bottom",
            bottom,
            self.exact_bottom,
            self.min_bottom,
            self.max_bottom,
        )?;
        check_one(
            layer_type,
            "top",
            top,
            self.exact_top,
            self.min_top,
            self.max_top,
        )
    }
}

/// A unit of computation over blobs.
///
/// # Lifecycle
/// A layer is created from a [`LayerParameter`] (see [`LayerRegistry`](registry::LayerRegistry)),
/// [`set_up`](Self::set_up) once, [`reshape`](Self::reshape)d whenever the input shapes
/// change, then [`forward`](Self::forward) and [`backward`](Self::backward) are called once
/// per invocation of the network.
///
/// # Blobs
/// Layers borrow blobs for the duration of a call. Forward reads `bottom` and writes the data
/// of `top`, backward reads `top` and writes the diff of `bottom`. A layer never writes to
/// blobs it was not handed.
///
/// **Errors**
///
/// Errors from [`set_up`](Self::set_up) and [`reshape`](Self::reshape) are fatal, the layer
/// must not be used afterwards. Numerical instability is never an error.
pub trait Layer<T: Scalar>: Debug + Send + Sync {
    /// The registered type name, ie "ELU".
    fn layer_type(&self) -> &'static str;
    /// The parameter the layer was created with.
    fn param(&self) -> &LayerParameter;
    /// The accepted number of bottoms and tops.
    fn blob_counts(&self) -> BlobCounts {
        BlobCounts::default()
    }
    /// Whether `top[0]` is a loss.
    fn is_loss(&self) -> bool {
        false
    }
    /// Layer specific set up, called once by [`set_up`](Self::set_up) before the first
    /// [`reshape`](Self::reshape).
    #[allow(unused)]
    fn layer_set_up(&mut self, bottom: &[&Blob<T>], top: &mut [&mut Blob<T>]) -> Result<()> {
        Ok(())
    }
    /// Adjusts the shapes of `top` (and internal buffers) to the shapes of `bottom`.
    fn reshape(&mut self, bottom: &[&Blob<T>], top: &mut [&mut Blob<T>]) -> Result<()>;
    /// Computes `top` from `bottom`.
    fn forward(&mut self, bottom: &[&Blob<T>], top: &mut [&mut Blob<T>]) -> Result<()>;
    /// Computes the diffs of `bottom` from the diffs of `top`.
    ///
    /// Only bottoms where `propagate_down` is true are written.
    ///
    /// **Errors**
    ///
    /// The layer does not support backward, or backward was requested for an input that is not
    /// differentiable.
    #[allow(unused)]
    fn backward(
        &mut self,
        top: &[&Blob<T>],
        propagate_down: &[bool],
        bottom: &mut [&mut Blob<T>],
    ) -> Result<()> {
        bail!(LayerError::BackwardNotSupported {
            layer_type: self.layer_type(),
        })
    }
    /// The weight of each top in the loss.
    ///
    /// The configured [`loss_weight`](LayerParameter::loss_weight) if specified, otherwise 1 for
    /// `top[0]` of a loss layer and 0 for everything else.
    ///
    /// **Errors**
    ///
    /// A loss weight is specified, but not once per top.
    fn loss_weights(&self, num_top: usize) -> Result<Vec<f32>> {
        let loss_weight = &self.param().loss_weight;
        if !loss_weight.is_empty() {
            if loss_weight.len() != num_top {
                bail!(LayerError::BlobCount {
                    layer_type: self.layer_type(),
                    kind: "loss_weight",
                    expected: num_top.to_string(),
                    actual: loss_weight.len(),
                });
            }
            return Ok(loss_weight.clone());
        }
        let mut loss_weight = vec![0.; num_top];
        if self.is_loss() {
            if let Some(first) = loss_weight.first_mut() {
                *first = loss::DEFAULT_LOSS_WEIGHT;
            }
        }
        Ok(loss_weight)
    }
    /// Sets up the layer.
    ///
    /// Checks the blob counts, calls [`layer_set_up`](Self::layer_set_up) and
    /// [`reshape`](Self::reshape), then writes the loss weight of each top into its diff, which
    /// seeds the backward pass.
    fn set_up(&mut self, bottom: &[&Blob<T>], top: &mut [&mut Blob<T>]) -> Result<()> {
        let span = tracing::debug_span!(
            "set_up",
            name = %self.param().name,
            layer_type = self.layer_type()
        );
        let _enter = span.enter();
        self.blob_counts()
            .check(self.layer_type(), bottom.len(), top.len())?;
        self.layer_set_up(bottom, top)?;
        self.reshape(bottom, top)?;
        let loss_weights = self.loss_weights(top.len())?;
        for (top, loss_weight) in top.iter_mut().zip(loss_weights) {
            if loss_weight != 0. {
                tracing::debug!(loss_weight, "loss weight");
                top.set_diff(T::from_f64_lossy(loss_weight.into()));
            }
        }
        tracing::debug!(
            bottom = ?bottom.iter().map(|x| x.shape()).collect::<Vec<_>>(),
            top = ?top.iter().map(|x| x.shape()).collect::<Vec<_>>(),
            "set up"
        );
        Ok(())
    }
}

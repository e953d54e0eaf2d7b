use thiserror::Error;

/// Fatal configuration errors.
///
/// These are raised while a layer is created, set up or reshaped (or when a backward pass is
/// requested that the layer cannot perform). A layer that returned one of these from
/// [`set_up`](crate::layer::Layer::set_up) or [`reshape`](crate::layer::Layer::reshape) must
/// not be used further.
///
/// Functions in this crate return [`anyhow::Error`], wrapping a [`LayerError`] where one
/// applies; use [`downcast_ref`](anyhow::Error::downcast_ref) to inspect it.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LayerError {
    #[error("{layer_type} Layer does not allow in-place computation.")]
    InPlaceNotAllowed { layer_type: &'static str },
    #[error("{layer_type} Layer takes {expected} {kind} blob(s) as input, got {actual}.")]
    BlobCount {
        layer_type: &'static str,
        kind: &'static str,
        expected: String,
        actual: usize,
    },
    #[error(
        "Number of labels must match number of predictions; \
        e.g., if softmax axis == 1 and prediction shape is (N, C, H, W), \
        label count (number of labels) must be N*H*W, \
        with integer values in {{0, 1, ..., C-1}}. \
        Expected {expected} labels, got {actual}."
    )]
    LabelCountMismatch { expected: usize, actual: usize },
    #[error("The data and label should have the same first dimension ({data} != {label}).")]
    FirstDimMismatch { data: usize, label: usize },
    #[error("axis {axis} out of range for blob with shape {shape:?}")]
    AxisOutOfRange { axis: isize, shape: Vec<usize> },
    #[error("{layer_type} Layer cannot backpropagate to {input} inputs.")]
    NonDifferentiableInput {
        layer_type: &'static str,
        input: &'static str,
    },
    #[error("{layer_type} Layer does not support backward.")]
    BackwardNotSupported { layer_type: &'static str },
    #[error("Unknown layer type: {layer_type} (known types: {known})")]
    UnknownLayerType { layer_type: String, known: String },
    #[error("Layer type {layer_type} already registered.")]
    DuplicateLayerType { layer_type: String },
    #[error("shape {expected:?} does not match {count} elements")]
    ShapeMismatch { expected: Vec<usize>, count: usize },
}

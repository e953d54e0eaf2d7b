use super::loss::NormalizationMode;
use crate::result::Result;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Configuration of a layer.
///
/// Fixed when the layer is constructed. Records for other layer types are ignored, and
/// records that are absent take their defaults.
///
/// Parses from JSON:
/// ```
/// # use caffeine::layer::param::LayerParameter;
/// let param: LayerParameter = r#"{
///     "name": "loss",
///     "type": "SoftmaxWithLoss",
///     "bottom": ["fc8", "label"],
///     "top": ["loss"],
///     "loss_param": { "ignore_label": 255, "normalization": "VALID" }
/// }"#
/// .parse()
/// .unwrap();
/// assert_eq!(param.loss_param.ignore_label, Some(255));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerParameter {
    /// The name of the layer.
    pub name: String,
    /// The registered type of the layer, ie "ELU".
    #[serde(rename = "type")]
    pub layer_type: String,
    /// Names of the input blobs.
    pub bottom: Vec<String>,
    /// Names of the output blobs.
    pub top: Vec<String>,
    /// Weight of each top in the loss. Loss layers default to 1 for the first top.
    pub loss_weight: Vec<f32>,
    /// ELU.
    pub elu_param: EluParameter,
    /// Power.
    pub power_param: PowerParameter,
    /// Softmax, also used by SoftmaxWithLoss.
    pub softmax_param: SoftmaxParameter,
    /// Loss layers.
    pub loss_param: LossParameter,
}

impl LayerParameter {
    /// Creates a parameter with `name` and `layer_type`.
    pub fn new(name: impl Into<String>, layer_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layer_type: layer_type.into(),
            ..Self::default()
        }
    }
    /// Sets the bottom names.
    pub fn with_bottom<I, S>(mut self, bottom: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bottom = bottom.into_iter().map(Into::into).collect();
        self
    }
    /// Sets the top names.
    pub fn with_top<I, S>(mut self, top: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.top = top.into_iter().map(Into::into).collect();
        self
    }
    /// Sets the loss weights.
    pub fn with_loss_weight(mut self, loss_weight: impl Into<Vec<f32>>) -> Self {
        self.loss_weight = loss_weight.into();
        self
    }
    /// Sets the [`EluParameter`].
    pub fn with_elu_param(mut self, elu_param: EluParameter) -> Self {
        self.elu_param = elu_param;
        self
    }
    /// Sets the [`PowerParameter`].
    pub fn with_power_param(mut self, power_param: PowerParameter) -> Self {
        self.power_param = power_param;
        self
    }
    /// Sets the [`SoftmaxParameter`].
    pub fn with_softmax_param(mut self, softmax_param: SoftmaxParameter) -> Self {
        self.softmax_param = softmax_param;
        self
    }
    /// Sets the [`LossParameter`].
    pub fn with_loss_param(mut self, loss_param: LossParameter) -> Self {
        self.loss_param = loss_param;
        self
    }
    /// Parses from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
    /// Serializes to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl FromStr for LayerParameter {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        Self::from_json(s)
    }
}

/// ELU: `y = x` for `x > 0`, otherwise `alpha * (exp(x) - 1)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EluParameter {
    /// Default 1.
    pub alpha: f32,
}

impl Default for EluParameter {
    fn default() -> Self {
        Self { alpha: 1. }
    }
}

/// Power: `y = (shift + scale * x)^power`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerParameter {
    /// Default 1.
    pub power: f32,
    /// Default 1.
    pub scale: f32,
    /// Default 0.
    pub shift: f32,
}

impl Default for PowerParameter {
    fn default() -> Self {
        Self {
            power: 1.,
            scale: 1.,
            shift: 0.,
        }
    }
}

/// Softmax.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftmaxParameter {
    /// The axis the softmax is computed along, may be negative. Default 1.
    pub axis: isize,
}

impl Default for SoftmaxParameter {
    fn default() -> Self {
        Self { axis: 1 }
    }
}

/// Loss layers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossParameter {
    /// Targets with this label do not contribute to the loss or the gradient.
    pub ignore_label: Option<i32>,
    /// How to normalize the summed loss.
    ///
    /// If not set, [`normalize`](Self::normalize) is used, otherwise
    /// [`BatchSize`](NormalizationMode::BatchSize).
    pub normalization: Option<NormalizationMode>,
    /// Legacy flag: `true` is [`Valid`](NormalizationMode::Valid), `false` is
    /// [`BatchSize`](NormalizationMode::BatchSize). Ignored if
    /// [`normalization`](Self::normalization) is set.
    pub normalize: Option<bool>,
}

impl LossParameter {
    /// The effective [`NormalizationMode`].
    pub fn normalization_mode(&self) -> NormalizationMode {
        match (self.normalization, self.normalize) {
            (Some(mode), _) => mode,
            (None, Some(true)) => NormalizationMode::Valid,
            (None, Some(false)) | (None, None) => NormalizationMode::BatchSize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let param: LayerParameter = r#"{ "name": "p", "type": "Power" }"#.parse().unwrap();
        assert_eq!(param.layer_type, "Power");
        assert_eq!(param.power_param, PowerParameter::default());
        assert_eq!(param.elu_param.alpha, 1.);
        assert_eq!(param.softmax_param.axis, 1);
        assert!(param.bottom.is_empty());
        assert_eq!(
            param.loss_param.normalization_mode(),
            NormalizationMode::BatchSize
        );
    }

    #[test]
    fn partial_records() {
        let param = LayerParameter::from_json(
            r#"{ "type": "Power", "power_param": { "power": 2.0 }, "softmax_param": { "axis": -1 } }"#,
        )
        .unwrap();
        assert_eq!(param.power_param.power, 2.);
        assert_eq!(param.power_param.scale, 1.);
        assert_eq!(param.softmax_param.axis, -1);
    }

    #[test]
    fn legacy_normalize() {
        let valid = LossParameter {
            normalize: Some(true),
            ..LossParameter::default()
        };
        assert_eq!(valid.normalization_mode(), NormalizationMode::Valid);
        let batch = LossParameter {
            normalize: Some(false),
            ..LossParameter::default()
        };
        assert_eq!(batch.normalization_mode(), NormalizationMode::BatchSize);
        let explicit = LossParameter {
            normalize: Some(true),
            normalization: Some(NormalizationMode::Full),
            ..LossParameter::default()
        };
        assert_eq!(explicit.normalization_mode(), NormalizationMode::Full);
    }

    #[test]
    fn json_round_trip() {
        let param = LayerParameter::new("loss", "SoftmaxWithLoss")
            .with_bottom(["x", "label"])
            .with_top(["loss"])
            .with_loss_param(LossParameter {
                ignore_label: Some(-1),
                normalization: Some(NormalizationMode::None),
                normalize: None,
            });
        let json = param.to_json().unwrap();
        assert!(json.contains(r#""normalization":"NONE""#));
        assert_eq!(json.parse::<LayerParameter>().unwrap(), param);
    }
}

use burn::tensor::{backend::Backend, ElementConversion, Tensor};

use crate::{
    errors::ExtractError,
    features::{FeatureBundle, Layer},
    gram::{gram_matrix, StyleSignature},
};

/// How each layer's Gram matrix difference is scaled before it is summed
/// into the style loss
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StyleNormalization {
    /// Divide by `channels²`, so layers with many channels don't dominate
    /// purely because their matrices are larger
    ChannelsSquared,
    /// Divide by `channels * height * width`
    Volume,
}

impl Default for StyleNormalization {
    fn default() -> Self {
        Self::ChannelsSquared
    }
}

/// The relative weight of each style layer, shallowest first, in the order
/// of `Layer::STYLE`
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StyleLayerWeights(pub [f32; 5]);

impl Default for StyleLayerWeights {
    fn default() -> Self {
        Self([1.0, 0.75, 0.2, 0.2, 0.2])
    }
}

impl StyleLayerWeights {
    pub fn get(&self, layer: Layer) -> f32 {
        Layer::STYLE
            .iter()
            .position(|l| *l == layer)
            .map_or(0.0, |i| self.0[i])
    }
}

/// The weighting of the content and style terms of the loss
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LossWeights {
    pub content: f32,
    pub style: f32,
    pub layers: StyleLayerWeights,
    pub normalization: StyleNormalization,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self {
            content: 1.0,
            style: 1e3,
            layers: StyleLayerWeights::default(),
            normalization: StyleNormalization::default(),
        }
    }
}

/// The loss for one evaluation, each component already scaled by its weight
pub struct Loss<B: Backend> {
    pub content: Tensor<B, 1>,
    pub style: Tensor<B, 1>,
    pub total: Tensor<B, 1>,
}

/// Loss components read back from the device
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LossValues {
    pub content: f32,
    pub style: f32,
    pub total: f32,
}

impl<B: Backend> Loss<B> {
    pub fn values(&self) -> LossValues {
        LossValues {
            content: self.content.clone().into_scalar().elem(),
            style: self.style.clone().into_scalar().elem(),
            total: self.total.clone().into_scalar().elem(),
        }
    }
}

fn mean_squared_error<B: Backend, const D: usize>(
    a: Tensor<B, D>,
    b: Tensor<B, D>,
) -> Tensor<B, 1> {
    (a - b).powf_scalar(2.0).mean()
}

/// Evaluates the weighted content and style loss of the target's features.
///
/// The content term compares the target's and the content image's
/// activations at `Layer::CONTENT`, the style term compares the Gram matrix
/// of the target at every style layer with the precomputed style signature.
pub fn evaluate<B: Backend>(
    target: &FeatureBundle<B>,
    content: &FeatureBundle<B>,
    signature: &StyleSignature<B>,
    weights: &LossWeights,
) -> Result<Loss<B>, ExtractError> {
    let content_loss = mean_squared_error(
        target.get(Layer::CONTENT)?.clone(),
        content.get(Layer::CONTENT)?.clone(),
    );

    let mut style_loss: Option<Tensor<B, 1>> = None;
    for layer in Layer::STYLE.iter().copied() {
        let activation = target.get(layer)?;
        let [channels, height, width] = activation.dims();

        let norm = match weights.normalization {
            StyleNormalization::ChannelsSquared => channels * channels,
            StyleNormalization::Volume => channels * height * width,
        } as f32;

        let gram = gram_matrix(activation.clone());
        let layer_loss = mean_squared_error(gram, signature.get(layer)?.clone())
            .mul_scalar(weights.layers.get(layer) / norm);

        style_loss = Some(match style_loss {
            Some(sum) => sum + layer_loss,
            None => layer_loss,
        });
    }

    let content = content_loss.mul_scalar(weights.content);
    let style = match style_loss {
        Some(loss) => loss.mul_scalar(weights.style),
        None => content.zeros_like(),
    };

    Ok(Loss {
        total: content.clone() + style.clone(),
        content,
        style,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{features::LayerSet, vgg::Vgg19};
    use burn::{backend::NdArray, tensor::Distribution};

    type TB = NdArray<f32>;

    struct Fixture {
        target: FeatureBundle<TB>,
        content: FeatureBundle<TB>,
        signature: StyleSignature<TB>,
    }

    fn fixture() -> Fixture {
        let device = Default::default();
        TB::seed(3);
        let network = Vgg19::<TB>::new(&device);

        let random = || {
            Tensor::<TB, 4>::random([1, 3, 24, 24], Distribution::Uniform(-2.0, 2.0), &device)
        };
        let content = network.extract(random(), LayerSet::all());
        let style = network.extract(random(), LayerSet::all());
        let target = network.extract(random(), LayerSet::all());

        Fixture {
            target,
            content,
            signature: StyleSignature::build(&style).unwrap(),
        }
    }

    #[test]
    fn loss_is_non_negative() {
        let f = fixture();

        for normalization in [StyleNormalization::ChannelsSquared, StyleNormalization::Volume] {
            let weights = LossWeights {
                normalization,
                ..Default::default()
            };

            let values = evaluate(&f.target, &f.content, &f.signature, &weights)
                .unwrap()
                .values();

            assert!(values.content >= 0.0);
            assert!(values.style >= 0.0);
            assert!(values.total >= 0.0);
            assert!(values.total.is_finite());

            let sum = values.content + values.style;
            assert!((values.total - sum).abs() <= 1e-3 * values.total.max(1.0));
        }
    }

    #[test]
    fn identical_features_have_no_content_loss() {
        let f = fixture();

        let values = evaluate(&f.content, &f.content, &f.signature, &LossWeights::default())
            .unwrap()
            .values();

        assert_eq!(values.content, 0.0);
    }

    #[test]
    fn zero_style_weight_removes_style_term() {
        let f = fixture();

        let weights = LossWeights {
            style: 0.0,
            ..Default::default()
        };

        let values = evaluate(&f.target, &f.content, &f.signature, &weights)
            .unwrap()
            .values();

        assert_eq!(values.style, 0.0);
        assert_eq!(values.total, values.content);
    }

    #[test]
    fn layer_weights_lookup() {
        let weights = StyleLayerWeights::default();
        assert_eq!(weights.get(Layer::Conv1_1), 1.0);
        assert_eq!(weights.get(Layer::Conv2_1), 0.75);
        assert_eq!(weights.get(Layer::Conv5_1), 0.2);
        // The content layer never contributes to the style loss
        assert_eq!(weights.get(Layer::Conv4_2), 0.0);
    }
}

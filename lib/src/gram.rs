use burn::tensor::{backend::Backend, Tensor};
use std::collections::BTreeMap;

use crate::{
    errors::ExtractError,
    features::{FeatureBundle, Layer, LayerSet},
};

/// Computes the Gram matrix, `F·Fᵀ`, of a `[channels, height, width]`
/// activation, giving a `[channels, channels]` matrix of channel correlations
/// that ignores where in the image the features occurred.
pub fn gram_matrix<B: Backend>(activation: Tensor<B, 3>) -> Tensor<B, 2> {
    let [channels, height, width] = activation.dims();
    let flat = activation.reshape([channels, height * width]);

    flat.clone().matmul(flat.transpose())
}

/// The Gram matrices of the style image at each style layer, the style's
/// fingerprint. Built once per session and never modified.
#[derive(Clone, Debug)]
pub struct StyleSignature<B: Backend> {
    grams: BTreeMap<Layer, Tensor<B, 2>>,
    source_layers: LayerSet,
}

impl<B: Backend> StyleSignature<B> {
    /// Builds the signature from the style image's features, which must
    /// contain every style layer
    pub fn build(features: &FeatureBundle<B>) -> Result<Self, ExtractError> {
        let mut grams = BTreeMap::new();

        for layer in Layer::STYLE.iter().copied() {
            let activation = features.get(layer)?;
            grams.insert(layer, gram_matrix(activation.clone()));
        }

        Ok(Self {
            grams,
            source_layers: features.layers(),
        })
    }

    pub fn get(&self, layer: Layer) -> Result<&Tensor<B, 2>, ExtractError> {
        self.grams
            .get(&layer)
            .ok_or(ExtractError::MissingLayer(layer))
    }

    /// The layers of the bundle the signature was built from, which can
    /// include layers that only matter for content
    pub fn source_layers(&self) -> LayerSet {
        self.source_layers
    }

    pub fn iter(&self) -> impl Iterator<Item = (Layer, &Tensor<B, 2>)> {
        self.grams.iter().map(|(l, g)| (*l, g))
    }
}

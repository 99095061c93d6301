use burn::tensor::{backend::Backend, Tensor};
use std::{collections::BTreeMap, fmt};

use crate::errors::ExtractError;

/// The VGG-19 layers whose activations are compared during style transfer.
///
/// Each layer corresponds to a convolution in the network's `features` stack,
/// identified by its stage index in that stack.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Layer {
    Conv1_1,
    Conv2_1,
    Conv3_1,
    Conv4_1,
    Conv4_2,
    Conv5_1,
}

impl Layer {
    pub const ALL: [Layer; 6] = [
        Layer::Conv1_1,
        Layer::Conv2_1,
        Layer::Conv3_1,
        Layer::Conv4_1,
        Layer::Conv4_2,
        Layer::Conv5_1,
    ];

    /// The layers whose Gram matrices make up the style loss, shallowest first
    pub const STYLE: [Layer; 5] = [
        Layer::Conv1_1,
        Layer::Conv2_1,
        Layer::Conv3_1,
        Layer::Conv4_1,
        Layer::Conv5_1,
    ];

    /// The only layer compared for content
    pub const CONTENT: Layer = Layer::Conv4_2;

    /// Index of the layer's convolution in the `features` stack
    pub fn stage(self) -> usize {
        match self {
            Self::Conv1_1 => 0,
            Self::Conv2_1 => 5,
            Self::Conv3_1 => 10,
            Self::Conv4_1 => 19,
            Self::Conv4_2 => 21,
            Self::Conv5_1 => 28,
        }
    }

    pub fn from_stage(stage: usize) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.stage() == stage)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Conv1_1 => "conv1_1",
            Self::Conv2_1 => "conv2_1",
            Self::Conv3_1 => "conv3_1",
            Self::Conv4_1 => "conv4_1",
            Self::Conv4_2 => "conv4_2",
            Self::Conv5_1 => "conv5_1",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of layers to capture during a forward pass
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct LayerSet(u8);

impl LayerSet {
    pub fn empty() -> Self {
        Self(0)
    }

    /// Every content and style layer
    pub fn all() -> Self {
        Layer::ALL.iter().copied().collect()
    }

    pub fn style() -> Self {
        Layer::STYLE.iter().copied().collect()
    }

    pub fn with(mut self, layer: Layer) -> Self {
        self.0 |= layer.bit();
        self
    }

    #[inline]
    pub fn contains(self, layer: Layer) -> bool {
        self.0 & layer.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Layer> {
        Layer::ALL.into_iter().filter(move |l| self.contains(*l))
    }

    /// The deepest stage that has to be evaluated to capture every layer
    pub(crate) fn deepest_stage(self) -> Option<usize> {
        self.iter().map(Layer::stage).max()
    }
}

impl std::iter::FromIterator<Layer> for LayerSet {
    fn from_iter<I: IntoIterator<Item = Layer>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

/// The activation maps, `[channels, height, width]`, captured for one input
#[derive(Clone, Debug)]
pub struct FeatureBundle<B: Backend> {
    maps: BTreeMap<Layer, Tensor<B, 3>>,
}

impl<B: Backend> FeatureBundle<B> {
    pub(crate) fn new() -> Self {
        Self {
            maps: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, layer: Layer, activation: Tensor<B, 3>) {
        self.maps.insert(layer, activation);
    }

    pub fn get(&self, layer: Layer) -> Result<&Tensor<B, 3>, ExtractError> {
        self.maps
            .get(&layer)
            .ok_or(ExtractError::MissingLayer(layer))
    }

    pub fn layers(&self) -> LayerSet {
        self.maps.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Layer, &Tensor<B, 3>)> {
        self.maps.iter().map(|(l, t)| (*l, t))
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stages_roundtrip() {
        for layer in Layer::ALL {
            assert_eq!(Layer::from_stage(layer.stage()), Some(layer));
        }
        assert_eq!(Layer::from_stage(1), None);
    }

    #[test]
    fn layer_sets() {
        let all = LayerSet::all();
        assert_eq!(all.len(), 6);
        assert_eq!(all.deepest_stage(), Some(28));

        let style = LayerSet::style();
        assert_eq!(style.len(), 5);
        assert!(!style.contains(Layer::CONTENT));

        let content = LayerSet::empty().with(Layer::CONTENT);
        assert_eq!(content.deepest_stage(), Some(21));
        assert_eq!(content.iter().collect::<Vec<_>>(), vec![Layer::Conv4_2]);

        assert!(LayerSet::empty().is_empty());
        assert_eq!(LayerSet::empty().deepest_stage(), None);
    }
}

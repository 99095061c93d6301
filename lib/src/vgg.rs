//! The frozen VGG-19 feature network.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d,
    },
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{activation::relu, backend::Backend, Tensor},
};
use std::path::Path;

use crate::{
    features::{FeatureBundle, Layer, LayerSet},
    Error,
};

#[derive(Copy, Clone)]
enum Stage {
    /// Index into `Vgg19::convs`
    Conv(usize),
    Relu,
    Pool,
}

use Stage::{Conv, Pool, Relu};

/// The `features` stack of VGG-19, in the order (and with the indices) of the
/// torchvision implementation the pretrained weights come from.
#[rustfmt::skip]
const STAGES: [Stage; 37] = [
    Conv(0), Relu, Conv(1), Relu, Pool,
    Conv(2), Relu, Conv(3), Relu, Pool,
    Conv(4), Relu, Conv(5), Relu, Conv(6), Relu, Conv(7), Relu, Pool,
    Conv(8), Relu, Conv(9), Relu, Conv(10), Relu, Conv(11), Relu, Pool,
    Conv(12), Relu, Conv(13), Relu, Conv(14), Relu, Conv(15), Relu, Pool,
];

/// Input and output channels of each convolution
const CONVS: [[usize; 2]; 16] = [
    [3, 64],
    [64, 64],
    [64, 128],
    [128, 128],
    [128, 256],
    [256, 256],
    [256, 256],
    [256, 256],
    [256, 512],
    [512, 512],
    [512, 512],
    [512, 512],
    [512, 512],
    [512, 512],
    [512, 512],
    [512, 512],
];

/// The smallest side an input can have and still reach `conv5_1` after four
/// 2x2 pooling stages
pub const MIN_DIMENSION: u32 = 16;

/// The convolutional trunk of VGG-19.
///
/// All parameters are frozen, gradients only ever flow *through* the
/// network to its input. Cloning is cheap, the weights are reference counted
/// by the backend, so a single loaded network can be handed to any number of
/// concurrent sessions.
#[derive(Module, Debug)]
pub struct Vgg19<B: Backend> {
    convs: Vec<Conv2d<B>>,
    pool: MaxPool2d,
}

impl<B: Backend> Vgg19<B> {
    /// Creates a network with randomly initialized weights. Only useful for
    /// testing, real use requires loading pretrained weights.
    pub fn new(device: &B::Device) -> Self {
        let convs = CONVS
            .iter()
            .map(|channels| {
                Conv2dConfig::new(*channels, [3, 3])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device)
            })
            .collect();

        Self {
            convs,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
        .no_grad()
    }

    /// Loads weights from either a torchvision checkpoint (`.pth`/`.pt`) or
    /// a burn named message pack record (`.mpk`), based on the extension.
    pub fn load<P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Self, Error> {
        let path = path.as_ref();

        match path.extension().and_then(|ext| ext.to_str()) {
            #[cfg(feature = "pytorch")]
            Some("pth") | Some("pt") => Self::load_pytorch(path, device),
            _ => Self::load_mpk(path, device),
        }
    }

    /// Loads weights from a burn named message pack record
    pub fn load_mpk<P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Self, Error> {
        let path = path.as_ref();
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();

        let network = Self::new(device)
            .load_file(path.to_path_buf(), &recorder, device)
            .map_err(|err| Error::Weights(format!("{}: {:?}", path.display(), err)))?;

        log::info!("loaded VGG-19 weights from {}", path.display());
        Ok(network.no_grad())
    }

    /// Loads the `features` weights out of a torchvision VGG-19 checkpoint,
    /// eg. `vgg19-dcbb9e9d.pth`. The classifier weights are ignored.
    #[cfg(feature = "pytorch")]
    pub fn load_pytorch<P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Self, Error> {
        use burn::record::Recorder;
        use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

        let path = path.as_ref();

        let mut args = LoadArgs::new(path.to_path_buf());
        for (stage, conv) in STAGES.iter().enumerate().filter_map(|(i, s)| match s {
            Conv(c) => Some((i, *c)),
            _ => None,
        }) {
            args = args.with_key_remap(
                &format!(r"^features\.{}\.(weight|bias)$", stage),
                &format!("convs.{}.$1", conv),
            );
        }

        let record: Vgg19Record<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
            .load(args, device)
            .map_err(|err| Error::Weights(format!("{}: {:?}", path.display(), err)))?;

        log::info!("loaded VGG-19 weights from {}", path.display());
        Ok(Self::new(device).load_record(record).no_grad())
    }

    /// Saves the weights as a burn named message pack record, which loads
    /// without the PyTorch importer
    pub fn save_mpk<P: AsRef<Path>>(self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();

        self.save_file(path.to_path_buf(), &recorder)
            .map_err(|err| Error::Weights(format!("{}: {:?}", path.display(), err)))
    }

    /// Runs `input`, a `[1, 3, height, width]` tensor, through the network and
    /// captures the activations of every layer in `layers`.
    ///
    /// Activations are captured after the ReLU that follows the named
    /// convolution. Evaluation stops as soon as the deepest requested layer
    /// has been captured.
    pub fn extract(&self, input: Tensor<B, 4>, layers: LayerSet) -> FeatureBundle<B> {
        let mut bundle = FeatureBundle::new();
        let last = match layers.deepest_stage() {
            Some(stage) => stage,
            None => return bundle,
        };

        let mut x = input;
        for (index, stage) in STAGES.iter().enumerate() {
            x = match stage {
                Conv(c) => self.convs[*c].forward(x),
                Relu => relu(x),
                Pool => self.pool.forward(x),
            };

            // The activation of a layer is observed once its ReLU has run
            if let Relu = stage {
                if let Some(layer) = Layer::from_stage(index - 1) {
                    if layers.contains(layer) {
                        bundle.insert(layer, x.clone().squeeze::<3>(0));

                        if index - 1 == last {
                            break;
                        }
                    }
                }
            }
        }

        bundle
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use burn::backend::NdArray;

    type TB = NdArray<f32>;

    #[test]
    fn stage_table_matches_layers() {
        for layer in Layer::ALL {
            assert!(matches!(STAGES[layer.stage()], Conv(_)));
            assert!(matches!(STAGES[layer.stage() + 1], Relu));
        }

        let convs = STAGES.iter().filter(|s| matches!(s, Conv(_))).count();
        assert_eq!(convs, CONVS.len());
    }

    #[test]
    fn activation_shapes() {
        let device = Default::default();
        TB::seed(7);
        let network = Vgg19::<TB>::new(&device);

        let input = Tensor::<TB, 4>::zeros([1, 3, 32, 48], &device);
        let features = network.extract(input, LayerSet::all());

        assert_eq!(features.len(), 6);
        assert_eq!(features.get(Layer::Conv1_1).unwrap().dims(), [64, 32, 48]);
        assert_eq!(features.get(Layer::Conv2_1).unwrap().dims(), [128, 16, 24]);
        assert_eq!(features.get(Layer::Conv3_1).unwrap().dims(), [256, 8, 12]);
        assert_eq!(features.get(Layer::Conv4_1).unwrap().dims(), [512, 4, 6]);
        assert_eq!(features.get(Layer::Conv4_2).unwrap().dims(), [512, 4, 6]);
        assert_eq!(features.get(Layer::Conv5_1).unwrap().dims(), [512, 2, 3]);
    }

    #[test]
    fn only_requested_layers_are_captured() {
        let device = Default::default();
        let network = Vgg19::<TB>::new(&device);

        let input = Tensor::<TB, 4>::ones([1, 3, 16, 16], &device);
        let features = network.extract(input.clone(), LayerSet::empty().with(Layer::Conv2_1));

        assert_eq!(features.layers(), LayerSet::empty().with(Layer::Conv2_1));
        assert!(features.get(Layer::Conv1_1).is_err());

        assert!(network.extract(input, LayerSet::empty()).is_empty());
    }

    #[test]
    fn activations_are_rectified() {
        let device = Default::default();
        let network = Vgg19::<TB>::new(&device);

        let input = Tensor::<TB, 4>::random(
            [1, 3, 16, 16],
            burn::tensor::Distribution::Uniform(-2.0, 2.0),
            &device,
        );
        let features = network.extract(input, LayerSet::all());

        for (_, activation) in features.iter() {
            let min: f32 = activation.clone().min().into_scalar();
            assert!(min >= 0.0);
        }
    }
}

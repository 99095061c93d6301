use crate::*;

use burn::tensor::{backend::AutodiffBackend, Tensor};

use crate::{
    errors::{ExtractError, ImageRole},
    features::LayerSet,
    gram::StyleSignature,
    optimize::Inputs,
};

/// Style transfer session.
///
/// A session holds the decoded content image, its features and the style
/// signature, everything that is computed once per request. Calling `run()`
/// optimizes a copy of the content image and returns the stylized result,
/// consuming the session in the process. You can provide a `Progress`
/// implementation to get an update after every optimization step.
///
/// # Example
/// ```no_run
/// use neural_style::burn::backend::{Autodiff, NdArray};
///
/// let device = Default::default();
/// let network = neural_style::Vgg19::<Autodiff<NdArray>>::load("vgg19.mpk", &device)
///     .expect("failed to load weights");
///
/// let session = neural_style::Session::builder(network)
///     .content(&"imgs/content.jpg")
///     .style(&"imgs/style.jpg")
///     .steps(200)
///     .build().expect("failed to build session");
///
/// let styled = session.run(None).expect("style transfer failed");
/// styled.save("out/styled.jpg").expect("failed to save image");
/// ```
pub struct Session<B: AutodiffBackend> {
    network: Vgg19<B>,
    content: Tensor<B, 4>,
    content_features: FeatureBundle<B>,
    signature: StyleSignature<B>,
    layers: LayerSet,
    dims: Dims,
    params: Parameters,
}

impl<B: AutodiffBackend> Session<B> {
    /// Creates a new session builder with default parameters, using
    /// `network` to extract features.
    pub fn builder<'a>(network: Vgg19<B>) -> SessionBuilder<'a, B> {
        SessionBuilder::new(network)
    }

    /// The size of the output image, which is the size the content image
    /// was scaled to
    pub fn dims(&self) -> Dims {
        self.dims
    }

    /// The layers extracted from the content, style and target images
    pub fn layers(&self) -> LayerSet {
        self.layers
    }

    /// The content image's activations, the reference for the content loss
    pub fn content_features(&self) -> &FeatureBundle<B> {
        &self.content_features
    }

    pub fn signature(&self) -> &StyleSignature<B> {
        &self.signature
    }

    /// Runs every optimization step and outputs the stylized image.
    pub fn run(self, progress: Option<Box<dyn Progress>>) -> Result<StyledImage, Error> {
        self.run_until(progress, None)
    }

    /// Like `run`, but checks `cancel` before every step and stops with
    /// `Error::Cancelled` once it has been triggered.
    pub fn run_with_cancel(
        self,
        progress: Option<Box<dyn Progress>>,
        cancel: &CancelToken,
    ) -> Result<StyledImage, Error> {
        self.run_until(progress, Some(cancel))
    }

    fn run_until(
        self,
        mut progress: Option<Box<dyn Progress>>,
        cancel: Option<&CancelToken>,
    ) -> Result<StyledImage, Error> {
        log::info!(
            "starting style transfer at {}x{} for {} steps",
            self.dims.width,
            self.dims.height,
            self.params.steps
        );

        let inputs = Inputs {
            network: &self.network,
            content: &self.content_features,
            signature: &self.signature,
            weights: self.params.weights,
            layers: self.layers,
        };

        let mut opt = optimize::start(
            inputs,
            self.content.clone(),
            self.params.learning_rate,
            self.params.steps,
        );

        let mut final_loss = None;
        while !opt.is_finished() {
            if cancel.map_or(false, CancelToken::is_cancelled) {
                return Err(opt.cancel());
            }

            let event = opt.step()?;

            if event.current % 50 == 0 || event.completed {
                log::info!("step {}/{} - loss: {:.4}", event.current, event.total, event.loss);
            }

            if let Some(progress) = progress.as_mut() {
                if let Err(err) = progress.update(event) {
                    log::warn!("failed to deliver progress for step {}: {}", event.current, err);
                }
            }

            final_loss = Some(event.loss);
        }

        let target = opt.complete();
        let image = codec::encode(target.pixels())?;

        log::info!("style transfer completed");

        Ok(StyledImage {
            image,
            steps: self.params.steps,
            final_loss,
        })
    }
}

/// Builds a session by setting parameters and adding the content and style
/// images, calling `build` decodes both images, extracts their features and
/// checks that style transfer will provide valid output.
pub struct SessionBuilder<'a, B: AutodiffBackend> {
    network: Vgg19<B>,
    device: B::Device,
    content: Option<ImageSource<'a>>,
    style: Option<ImageSource<'a>>,
    params: Parameters,
}

impl<'a, B: AutodiffBackend> SessionBuilder<'a, B> {
    /// Creates a new `SessionBuilder`, can also be created via
    /// `Session::builder()`
    pub fn new(network: Vgg19<B>) -> Self {
        Self {
            network,
            device: Default::default(),
            content: None,
            style: None,
            params: Parameters::default(),
        }
    }

    /// The device the images are decoded onto, which must be the device the
    /// network lives on.
    ///
    /// Default: the backend's default device
    pub fn device(mut self, device: B::Device) -> Self {
        self.device = device;
        self
    }

    /// The image whose structure is preserved. The output has the size this
    /// image is scaled to.
    pub fn content<I: Into<ImageSource<'a>>>(mut self, content: I) -> Self {
        self.content = Some(content.into());
        self
    }

    /// The image whose texture and colors are transferred. It is always
    /// resized to the size of the content image.
    pub fn style<I: Into<ImageSource<'a>>>(mut self, style: I) -> Self {
        self.style = Some(style.into());
        self
    }

    /// Replaces the step count and loss weights with the values of a preset.
    /// Parameters set after this call override the preset.
    pub fn preset(mut self, preset: Preset) -> Self {
        preset.apply(&mut self.params);
        self
    }

    /// The number of optimization steps.
    ///
    /// Default: 500
    pub fn steps(mut self, steps: u32) -> Self {
        self.params.steps = steps;
        self
    }

    /// The Adam learning rate, in normalized image units.
    ///
    /// Default: 0.003
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.params.learning_rate = lr;
        self
    }

    /// The weight of the content loss.
    ///
    /// Default: 1.0
    pub fn content_weight(mut self, weight: f32) -> Self {
        self.params.weights.content = weight;
        self
    }

    /// The weight of the style loss. The ratio between this and the content
    /// weight is what decides how much of the style ends up in the output,
    /// higher values favor texture over structure.
    ///
    /// Default: 1000.0
    pub fn style_weight(mut self, weight: f32) -> Self {
        self.params.weights.style = weight;
        self
    }

    /// The relative weights of the `conv1_1`, `conv2_1`, `conv3_1`,
    /// `conv4_1` and `conv5_1` Gram matrices in the style loss.
    ///
    /// Default: [1.0, 0.75, 0.2, 0.2, 0.2]
    pub fn style_layer_weights(mut self, weights: [f32; 5]) -> Self {
        self.params.weights.layers = StyleLayerWeights(weights);
        self
    }

    /// How each layer's Gram matrix difference is normalized.
    ///
    /// Default: `StyleNormalization::ChannelsSquared`
    pub fn style_normalization(mut self, normalization: StyleNormalization) -> Self {
        self.params.weights.normalization = normalization;
        self
    }

    /// Content images with a longer side above this are scaled down to it,
    /// smaller images keep their native size.
    ///
    /// Default: 128
    pub fn max_dimension(mut self, max: u32) -> Self {
        self.params.max_dimension = max;
        self
    }

    /// Creates a `Session`, or returns an error if invalid parameters or input
    /// images were specified.
    pub fn build(self) -> Result<Session<B>, Error> {
        self.check_parameters_validity()?;

        let content_src = self.content.ok_or(Error::MissingInput(ImageRole::Content))?;
        let style_src = self.style.ok_or(Error::MissingInput(ImageRole::Style))?;

        let content = codec::decode::<B>(
            content_src,
            ImageRole::Content,
            self.params.max_dimension,
            None,
            &self.device,
        )?;

        let [_, _, height, width] = content.dims();
        let dims = Dims::new(width as u32, height as u32);

        if dims.width < MIN_DIMENSION || dims.height < MIN_DIMENSION {
            return Err(Error::Extract(ExtractError::TooSmall {
                role: ImageRole::Content,
                width: dims.width,
                height: dims.height,
                min: MIN_DIMENSION,
            }));
        }

        let style = codec::decode::<B>(
            style_src,
            ImageRole::Style,
            self.params.max_dimension,
            Some(dims),
            &self.device,
        )?;

        // Every image of a request goes through the same layers
        let layers = LayerSet::all();
        let content_features = self.network.extract(content.clone(), layers);
        let signature = StyleSignature::build(&self.network.extract(style, layers))?;

        Ok(Session {
            network: self.network,
            content,
            content_features,
            signature,
            layers,
            dims,
            params: self.params,
        })
    }

    fn check_parameters_validity(&self) -> Result<(), Error> {
        let params = &self.params;

        if params.steps == 0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 1.0,
                max: f64::from(u32::MAX),
                value: 0.0,
                name: "steps",
            }));
        }

        if !(params.learning_rate.is_finite() && params.learning_rate > 0.0) {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: f64::EPSILON,
                max: f64::MAX,
                value: params.learning_rate,
                name: "learning-rate",
            }));
        }

        let weights = [
            ("content-weight", params.weights.content),
            ("style-weight", params.weights.style),
        ]
        .into_iter()
        .chain(
            params
                .weights
                .layers
                .0
                .iter()
                .map(|w| ("style-layer-weight", *w)),
        );

        for (name, weight) in weights {
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(Error::InvalidRange(errors::InvalidRange {
                    min: 0.0,
                    max: f64::from(f32::MAX),
                    value: f64::from(weight),
                    name,
                }));
            }
        }

        if params.max_dimension < MIN_DIMENSION {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: f64::from(MIN_DIMENSION),
                max: f64::from(u32::MAX),
                value: f64::from(params.max_dimension),
                name: "max-dimension",
            }));
        }

        Ok(())
    }
}

//! The optimization loop that turns the content image into the stylized
//! output, one Adam step at a time.

use burn::{
    module::{Module, Param},
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Tensor,
    },
};

use crate::{
    errors::{NumericError, NumericKind},
    features::{FeatureBundle, LayerSet},
    gram::StyleSignature,
    loss::{self, LossWeights},
    progress::ProgressEvent,
    vgg::Vgg19,
    Error,
};

/// The image being optimized, wrapped as a module so the optimizer can
/// treat it as its only parameter
#[derive(Module, Debug)]
pub struct TargetImage<B: Backend> {
    pixels: Param<Tensor<B, 4>>,
}

impl<B: AutodiffBackend> TargetImage<B> {
    fn new(content: Tensor<B, 4>) -> Self {
        Self {
            pixels: Param::from_tensor(content.detach().require_grad()),
        }
    }

    /// Clamps every value into `[0, 1]`. This happens outside the autodiff
    /// graph and keeps the parameter id, so the optimizer state carries over.
    fn clamped(self) -> Self {
        let id = self.pixels.id.clone();
        let pixels = self.pixels.val().inner().clamp(0.0, 1.0);

        Self {
            pixels: Param::initialized(id, Tensor::from_inner(pixels).require_grad()),
        }
    }

    pub(crate) fn pixels(&self) -> Tensor<B::InnerBackend, 4> {
        self.pixels.val().inner()
    }
}

/// Where an optimization currently is
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum State {
    Initializing,
    Stepping,
    Clamping,
    Completed,
    Failed,
    Cancelled,
}

/// Everything a run reads but never modifies
pub(crate) struct Inputs<'a, B: Backend> {
    pub(crate) network: &'a Vgg19<B>,
    pub(crate) content: &'a FeatureBundle<B>,
    pub(crate) signature: &'a StyleSignature<B>,
    pub(crate) weights: LossWeights,
    /// Extracted for the target, the same set the content and style used
    pub(crate) layers: LayerSet,
}

pub(crate) struct Optimization<'a, B: AutodiffBackend, O> {
    inputs: Inputs<'a, B>,
    learning_rate: f64,
    total: u32,
    step: u32,
    target: TargetImage<B>,
    optim: O,
    state: State,
}

/// Starts an optimization with the target initialized to the content image
/// and Adam attached to it
pub(crate) fn start<'a, B: AutodiffBackend>(
    inputs: Inputs<'a, B>,
    content: Tensor<B, 4>,
    learning_rate: f64,
    total: u32,
) -> Optimization<'a, B, impl Optimizer<TargetImage<B>, B>> {
    let optim = AdamConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.999)
        .with_epsilon(1e-8)
        .init::<B, TargetImage<B>>();

    log::debug!("optimization initialized for {} steps", total);

    Optimization {
        inputs,
        learning_rate,
        total,
        step: 0,
        target: TargetImage::new(content),
        optim,
        state: State::Initializing,
    }
}

impl<'a, B, O> Optimization<'a, B, O>
where
    B: AutodiffBackend,
    O: Optimizer<TargetImage<B>, B>,
{
    #[cfg(test)]
    pub(crate) fn state(&self) -> State {
        self.state
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.step >= self.total
    }

    /// The step the next call to `step` will perform, starting at 1
    pub(crate) fn next_step(&self) -> u32 {
        self.step + 1
    }

    /// Performs one step: extracts the target's features, evaluates the loss,
    /// back-propagates it to the target and applies one optimizer update
    /// followed by the clamp.
    pub(crate) fn step(&mut self) -> Result<ProgressEvent, Error> {
        let step = self.next_step();
        self.state = State::Stepping;

        let pixels = self.target.pixels.val();
        let features = self.inputs.network.extract(pixels.clone(), self.inputs.layers);

        let loss = loss::evaluate(
            &features,
            self.inputs.content,
            self.inputs.signature,
            &self.inputs.weights,
        )
        .map_err(|err| self.fail(err.into()))?;

        let values = loss.values();
        if !values.total.is_finite() {
            return Err(self.fail(Error::Numeric(NumericError {
                step,
                kind: NumericKind::Loss,
                detail: format!(
                    "total {} (content {}, style {})",
                    values.total, values.content, values.style
                ),
            })));
        }

        let grads = loss.total.backward();

        if let Some(grad) = pixels.grad(&grads) {
            let magnitude: f32 = grad.abs().sum().into_scalar().elem();
            if !magnitude.is_finite() {
                return Err(self.fail(Error::Numeric(NumericError {
                    step,
                    kind: NumericKind::Gradient,
                    detail: format!("gradient magnitude {}", magnitude),
                })));
            }
        }

        let grads = GradientsParams::from_grads(grads, &self.target);
        self.target = self
            .optim
            .step(self.learning_rate, self.target.clone(), grads);

        self.state = State::Clamping;
        self.target = self.target.clone().clamped();

        self.step = step;

        log::debug!("step {}/{} - loss: {:.4}", step, self.total, values.total);

        Ok(ProgressEvent::new(step, self.total, values))
    }

    pub(crate) fn cancel(&mut self) -> Error {
        self.state = State::Cancelled;
        log::info!("style transfer cancelled before step {}", self.next_step());
        Error::Cancelled(self.next_step())
    }

    /// Finishes the run, handing back the optimized target
    pub(crate) fn complete(mut self) -> TargetImage<B> {
        self.state = State::Completed;
        log::debug!("optimization {:?} after {} steps", self.state, self.step);
        self.target
    }

    fn fail(&mut self, err: Error) -> Error {
        self.state = State::Failed;
        log::error!("style transfer failed at step {}: {}", self.next_step(), err);
        err
    }
}

// BEGIN - Embark standard lints v0.4
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_on_vec_items,
    clippy::match_same_arms,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::mismatched_target_os,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v0.4

//! `neural-style` is a light API for neural style transfer: optimizing an
//! image so that it keeps the structure of a content image while taking on
//! the textures and colors of a style image.
//!
//! Both images are run through the convolutional trunk of a pretrained
//! VGG-19. The content image's `conv4_2` activations describe its structure,
//! the Gram matrices of the style image's `conv1_1` to `conv5_1` activations
//! describe its style. Starting from the content image, every step nudges the
//! pixels with Adam so that both descriptions of the output get closer to
//! their targets.
//!
//! First, you load a `Vgg19` network once, and build a `Session` for each
//! request via a `SessionBuilder`, which follows the builder pattern. Calling
//! `build` on the `SessionBuilder` decodes both images and extracts their
//! features.
//!
//! `Session` has a `run()` method that optimizes the output image and returns
//! it as a `StyledImage`, which you can save, stream, or inspect.
//!
//! ## Usage
//! ```no_run
//! use neural_style::burn::backend::{Autodiff, NdArray};
//!
//! let device = Default::default();
//! // Load the frozen network once, it can be shared by every session
//! let network = neural_style::Vgg19::<Autodiff<NdArray>>::load("vgg19-dcbb9e9d.pth", &device)
//!     .expect("failed to load weights");
//!
//! let session = neural_style::Session::builder(network.clone())
//!     // Set some parameters
//!     .steps(300)
//!     .style_weight(1e4)
//!     // Specify the inputs
//!     .content(&"imgs/content.jpg")
//!     .style(&"imgs/style.jpg")
//!     // Build the session
//!     .build().expect("failed to build session");
//!
//! // Optimize the output image
//! let styled = session.run(None).expect("style transfer failed");
//!
//! // Save the stylized image to disk
//! styled.save("my_styled_img.jpg").expect("failed to save styled image");
//! ```
pub mod codec;
mod errors;
pub mod features;
pub mod gram;
pub mod loss;
mod optimize;
mod progress;
pub mod session;
mod utils;
pub mod vgg;

pub use burn;
pub use crossbeam_channel;
pub use image;
use std::{path::Path, str::FromStr};

pub use errors::{
    DecodeError, Error, ExtractError, ImageRole, NumericError, NumericKind, ObserverError,
};
pub use features::{FeatureBundle, Layer, LayerSet};
pub use gram::StyleSignature;
pub use loss::{LossWeights, StyleLayerWeights, StyleNormalization};
pub use progress::{CancelToken, ChannelProgress, Progress, ProgressEvent};
pub use session::{Session, SessionBuilder};
pub use utils::{load_dynamic_image, ImageSource};
pub use vgg::{Vgg19, MIN_DIMENSION};

/// Simple dimensions struct
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Dims {
    pub width: u32,
    pub height: u32,
}

impl Dims {
    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Named sets of defaults for the step count and loss weights
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Preset {
    /// Content weight 1, style weight 1000, 500 steps. Strongly favors the
    /// style's textures.
    Stylized,
    /// Content weight 10000, style weight 100, 200 steps. Keeps most of the
    /// content's structure and only tints it with the style.
    Faithful,
}

impl Default for Preset {
    fn default() -> Self {
        Self::Stylized
    }
}

impl Preset {
    fn apply(self, params: &mut Parameters) {
        let (content, style, steps) = match self {
            Self::Stylized => (1.0, 1e3, 500),
            Self::Faithful => (1e4, 1e2, 200),
        };

        params.weights.content = content;
        params.weights.style = style;
        params.steps = steps;
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stylized" => Ok(Self::Stylized),
            "faithful" => Ok(Self::Faithful),
            other => Err(format!(
                "preset `{}` not one of: 'stylized', 'faithful'",
                other
            )),
        }
    }
}

struct Parameters {
    steps: u32,
    learning_rate: f64,
    weights: LossWeights,
    max_dimension: u32,
}

impl Default for Parameters {
    fn default() -> Self {
        let mut params = Self {
            steps: 0,
            learning_rate: 0.003,
            weights: LossWeights::default(),
            max_dimension: 128,
        };

        Preset::default().apply(&mut params);
        params
    }
}

/// An image produced by a `Session::run()`
pub struct StyledImage {
    image: image::RgbImage,
    steps: u32,
    final_loss: Option<f32>,
}

impl StyledImage {
    /// Saves the image to the specified path, the format is inferred from
    /// the extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        if let Some(parent_path) = path.parent() {
            std::fs::create_dir_all(&parent_path)?;
        }

        self.image.save(&path)?;
        Ok(())
    }

    /// Writes the image to the specified stream
    pub fn write<W: std::io::Write + std::io::Seek>(
        &self,
        writer: &mut W,
        fmt: image::ImageOutputFormat,
    ) -> Result<(), Error> {
        let dyn_img = image::DynamicImage::ImageRgb8(self.image.clone());
        Ok(dyn_img.write_to(writer, fmt)?)
    }

    /// Encodes the image as a JPEG, the way it is usually sent back to a
    /// client
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, Error> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        self.write(&mut buffer, image::ImageOutputFormat::Jpeg(quality))?;
        Ok(buffer.into_inner())
    }

    /// The number of optimization steps that produced this image
    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// The loss after the last step
    pub fn final_loss(&self) -> Option<f32> {
        self.final_loss
    }

    /// Returns the output image
    pub fn into_image(self) -> image::DynamicImage {
        image::DynamicImage::ImageRgb8(self.image)
    }
}

impl AsRef<image::RgbImage> for StyledImage {
    fn as_ref(&self) -> &image::RgbImage {
        &self.image
    }
}

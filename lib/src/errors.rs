use std::fmt;

use crate::features::Layer;

#[derive(Debug)]
pub struct InvalidRange {
    pub(crate) min: f64,
    pub(crate) max: f64,
    pub(crate) value: f64,
    pub(crate) name: &'static str,
}

impl fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parameter '{}' - value '{}' is outside the range of {}-{}",
            self.name, self.value, self.min, self.max
        )
    }
}

/// Which of the two inputs an image belongs to
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ImageRole {
    Content,
    Style,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Content => "content",
            Self::Style => "style",
        })
    }
}

#[derive(Debug)]
pub struct DecodeError {
    pub role: ImageRole,
    pub source: image::ImageError,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to decode the {} image: {}", self.role, self.source)
    }
}

#[derive(Debug)]
pub enum ExtractError {
    /// A feature bundle was asked for a layer it never captured
    MissingLayer(Layer),
    /// The image is too small to survive the network's pooling stages
    TooSmall {
        role: ImageRole,
        width: u32,
        height: u32,
        min: u32,
    },
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingLayer(layer) => {
                write!(f, "layer '{}' was not captured during extraction", layer)
            }
            Self::TooSmall {
                role,
                width,
                height,
                min,
            } => write!(
                f,
                "the {} image is {}x{}, but both sides must be at least {} pixels",
                role, width, height, min
            ),
        }
    }
}

/// The quantity that stopped being finite
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NumericKind {
    Loss,
    Gradient,
}

#[derive(Debug)]
pub struct NumericError {
    pub step: u32,
    pub kind: NumericKind,
    pub detail: String,
}

impl fmt::Display for NumericError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            NumericKind::Loss => write!(f, "loss diverged at step {}: {}", self.step, self.detail),
            NumericKind::Gradient => write!(
                f,
                "gradient diverged at step {}: {}",
                self.step, self.detail
            ),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    /// One of the input images could not be opened or decoded
    Decode(DecodeError),
    /// The feature network could not produce the activations the loss needs
    Extract(ExtractError),
    /// The optimization produced a non-finite loss or gradient
    Numeric(NumericError),
    /// The run was cancelled before the given step
    Cancelled(u32),
    /// An input parameter had an invalid range specified
    InvalidRange(InvalidRange),
    /// An error in the image library occurred while saving or encoding output
    Image(image::ImageError),
    /// The output tensor could not be read back from the device
    Readback(String),
    /// The network weights could not be loaded or saved
    Weights(String),
    Io(std::io::Error),
    /// The user specified an image format we don't support as the output
    UnsupportedOutputFormat(String),
    /// `build` was called without a content or style image
    MissingInput(ImageRole),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(err) => Some(&err.source),
            Self::Image(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(de) => write!(f, "{}", de),
            Self::Extract(ee) => write!(f, "{}", ee),
            Self::Numeric(ne) => write!(f, "{}", ne),
            Self::Cancelled(step) => write!(f, "style transfer was cancelled before step {}", step),
            Self::InvalidRange(ir) => write!(f, "{}", ir),
            Self::Image(ie) => write!(f, "{}", ie),
            Self::Readback(msg) => write!(f, "failed to read the output image back: {}", msg),
            Self::Weights(msg) => write!(f, "failed to load network weights: {}", msg),
            Self::Io(io) => write!(f, "{}", io),
            Self::UnsupportedOutputFormat(fmt) => {
                write!(f, "the output format '{}' is not supported", fmt)
            }
            Self::MissingInput(role) => write!(f, "no {} image was provided", role),
        }
    }
}

impl Error {
    /// True for errors raised while reading the inputs, before any
    /// optimization work was done
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }

    /// True for errors raised because the optimization diverged
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Numeric(_))
    }
}

impl From<image::ImageError> for Error {
    fn from(ie: image::ImageError) -> Self {
        Self::Image(ie)
    }
}

impl From<std::io::Error> for Error {
    fn from(io: std::io::Error) -> Self {
        Self::Io(io)
    }
}

impl From<ExtractError> for Error {
    fn from(ee: ExtractError) -> Self {
        Self::Extract(ee)
    }
}

impl From<NumericError> for Error {
    fn from(ne: NumericError) -> Self {
        Self::Numeric(ne)
    }
}

/// A failure to deliver a progress event. These never abort a run, they are
/// logged and the run carries on.
#[derive(Debug)]
pub enum ObserverError {
    /// The receiving end of a progress channel was dropped
    Disconnected,
    /// The progress channel is at capacity, the event was dropped
    Full,
    Other(String),
}

impl fmt::Display for ObserverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("progress receiver disconnected"),
            Self::Full => f.write_str("progress channel is full"),
            Self::Other(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ObserverError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn readback_is_not_a_divergence() {
        let err = Error::Readback("device lost".to_owned());

        assert!(!err.is_numeric());
        assert!(!err.is_decode());
        assert_eq!(
            err.to_string(),
            "failed to read the output image back: device lost"
        );
    }

    #[test]
    fn divergence_reports_its_step() {
        let err = Error::from(NumericError {
            step: 7,
            kind: NumericKind::Gradient,
            detail: "gradient magnitude NaN".to_owned(),
        });

        assert!(err.is_numeric());
        assert!(err.to_string().contains("step 7"));
    }
}

use crate::Dims;
use std::path::Path;

/// Helper type used to define the source of `ImageSource`'s data
#[derive(Clone)]
pub enum ImageSource<'a> {
    /// A raw buffer of image data, see `image::load_from_memory` for details
    /// on what is supported
    Memory(&'a [u8]),
    /// The path to an image to load from disk. The image format is inferred
    /// from the file extension, see `image::open` for details
    Path(&'a Path),
    /// An already loaded image that is passed directly to the session
    Image(image::DynamicImage),
}

impl<'a> ImageSource<'a> {
    pub fn from_path(path: &'a Path) -> Self {
        Self::Path(path)
    }
}

impl<'a> From<image::DynamicImage> for ImageSource<'a> {
    fn from(img: image::DynamicImage) -> Self {
        Self::Image(img)
    }
}

impl<'a> From<image::RgbImage> for ImageSource<'a> {
    fn from(img: image::RgbImage) -> Self {
        Self::Image(image::DynamicImage::ImageRgb8(img))
    }
}

impl<'a, S> From<&'a S> for ImageSource<'a>
where
    S: AsRef<Path> + 'a,
{
    fn from(path: &'a S) -> Self {
        Self::Path(path.as_ref())
    }
}

pub fn load_dynamic_image(src: ImageSource<'_>) -> Result<image::DynamicImage, image::ImageError> {
    match src {
        ImageSource::Memory(data) => image::load_from_memory(data),
        ImageSource::Path(path) => image::open(path),
        ImageSource::Image(img) => Ok(img),
    }
}

/// The size an image of `dims` is scaled to so that its longer side is at
/// most `max_dimension`, keeping the aspect ratio. Images that already fit
/// are left at their native size.
pub(crate) fn fit_within(dims: Dims, max_dimension: u32) -> Dims {
    let longer = dims.width.max(dims.height);
    if longer <= max_dimension {
        return dims;
    }

    let scale = f64::from(max_dimension) / f64::from(longer);
    let side = |v: u32| ((f64::from(v) * scale).round() as u32).max(1);

    if dims.width >= dims.height {
        Dims::new(max_dimension, side(dims.height))
    } else {
        Dims::new(side(dims.width), max_dimension)
    }
}

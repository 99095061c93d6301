//! Conversion between RGB images and the normalized `[1, 3, height, width]`
//! tensors the feature network consumes.
//!
//! The normalization statistics are the ones the VGG-19 weights were trained
//! with, the activations are meaningless with anything else so they are not
//! configurable.

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{imageops, GenericImageView};

use crate::{
    errors::{DecodeError, ImageRole},
    utils::{fit_within, load_dynamic_image},
    Dims, Error, ImageSource,
};

/// Per channel mean of the network's training data
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per channel standard deviation of the network's training data
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Decodes an image and converts it into a normalized tensor.
///
/// The image is scaled so that its longer side is `max_dimension`, unless it
/// is already that size or smaller. If `forced` is set the image is resized
/// to exactly those dimensions instead, which is how the style image is made
/// to match the content image.
pub fn decode<B: Backend>(
    src: ImageSource<'_>,
    role: ImageRole,
    max_dimension: u32,
    forced: Option<Dims>,
    device: &B::Device,
) -> Result<Tensor<B, 4>, Error> {
    let img = load_dynamic_image(src).map_err(|source| Error::Decode(DecodeError { role, source }))?;

    let (width, height) = img.dimensions();
    let size = forced.unwrap_or_else(|| fit_within(Dims::new(width, height), max_dimension));

    let rgb = img.to_rgb8();
    let rgb = if size.width != width || size.height != height {
        imageops::resize(&rgb, size.width, size.height, imageops::FilterType::Triangle)
    } else {
        rgb
    };

    log::debug!(
        "decoded {} image {}x{} -> {}x{}",
        role,
        width,
        height,
        size.width,
        size.height
    );

    Ok(to_tensor(&rgb, device))
}

/// Normalizes an RGB image into a `[1, 3, height, width]` tensor
pub fn to_tensor<B: Backend>(img: &image::RgbImage, device: &B::Device) -> Tensor<B, 4> {
    let (width, height) = img.dimensions();
    let plane = width as usize * height as usize;

    let mut data = vec![0f32; 3 * plane];
    for (i, pixel) in img.pixels().enumerate() {
        for c in 0..3 {
            let value = f32::from(pixel[c]) / 255.0;
            data[c * plane + i] = (value - MEAN[c]) / STD[c];
        }
    }

    Tensor::from_data(
        TensorData::new(data, [1, 3, height as usize, width as usize]),
        device,
    )
}

/// Denormalizes a `[1, 3, height, width]` tensor back into an 8-bit RGB image
pub fn encode<B: Backend>(tensor: Tensor<B, 4>) -> Result<image::RgbImage, Error> {
    let [_, channels, height, width] = tensor.dims();
    debug_assert_eq!(channels, 3);

    let data = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| Error::Readback(format!("{:?}", err)))?;

    let plane = width * height;
    let mut img = image::RgbImage::new(width as u32, height as u32);

    for (i, pixel) in img.pixels_mut().enumerate() {
        for c in 0..3 {
            let value = (data[c * plane + i] * STD[c] + MEAN[c]).clamp(0.0, 1.0);
            pixel[c] = (value * 255.0).round() as u8;
        }
    }

    Ok(img)
}

#[cfg(test)]
mod test {
    use super::*;
    use burn::backend::NdArray;

    type TB = NdArray<f32>;

    fn gradient(width: u32, height: u32) -> image::RgbImage {
        image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) * 3 % 256) as u8])
        })
    }

    #[test]
    fn roundtrip_is_within_rounding() {
        let img = gradient(40, 24);
        let device = Default::default();

        let tensor = to_tensor::<TB>(&img, &device);
        assert_eq!(tensor.dims(), [1, 3, 24, 40]);

        let back = encode(tensor).unwrap();
        assert_eq!(back.dimensions(), img.dimensions());

        for (a, b) in img.pixels().zip(back.pixels()) {
            for c in 0..3 {
                assert!((i16::from(a[c]) - i16::from(b[c])).abs() <= 1);
            }
        }
    }

    #[test]
    fn normalizes_with_network_statistics() {
        let img = image::RgbImage::from_pixel(2, 2, image::Rgb([255, 0, 128]));
        let tensor = to_tensor::<TB>(&img, &Default::default());
        let values = tensor.into_data().to_vec::<f32>().unwrap();

        let expected = [
            (1.0 - MEAN[0]) / STD[0],
            (0.0 - MEAN[1]) / STD[1],
            (128.0 / 255.0 - MEAN[2]) / STD[2],
        ];

        for c in 0..3 {
            for v in &values[c * 4..(c + 1) * 4] {
                assert!((v - expected[c]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn decode_fits_longer_side() {
        let img = image::DynamicImage::ImageRgb8(gradient(400, 200));
        let tensor = decode::<TB>(img.into(), ImageRole::Content, 128, None, &Default::default())
            .unwrap();

        assert_eq!(tensor.dims(), [1, 3, 64, 128]);
    }

    #[test]
    fn decode_forced_size() {
        let img = image::DynamicImage::ImageRgb8(gradient(30, 90));
        let tensor = decode::<TB>(
            img.into(),
            ImageRole::Style,
            128,
            Some(Dims::new(50, 20)),
            &Default::default(),
        )
        .unwrap();

        assert_eq!(tensor.dims(), [1, 3, 20, 50]);
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode::<TB>(
            ImageSource::Memory(b"definitely not a png"),
            ImageRole::Style,
            128,
            None,
            &Default::default(),
        )
        .unwrap_err();

        assert!(err.is_decode());
        match err {
            Error::Decode(de) => assert_eq!(de.role, ImageRole::Style),
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn encode_clips_out_of_range_values() {
        let device = Default::default();
        let tensor = Tensor::<TB, 4>::from_data(
            TensorData::new(vec![100.0f32, -100.0, 0.0], [1, 3, 1, 1]),
            &device,
        );

        let img = encode(tensor).unwrap();
        let pixel = img.get_pixel(0, 0);
        assert_eq!(pixel[0], 255);
        assert_eq!(pixel[1], 0);
        assert_eq!(pixel[2], (MEAN[2] * 255.0).round() as u8);
    }
}

use base64::{prelude::BASE64_STANDARD, Engine};
use image::{codecs::jpeg::JpegEncoder, ImageReader, RgbImage};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("No se pudo decodificar la imagen")]
    InvalidImage(#[source] image::ImageError),
    #[error("Error decodificando base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("failed to encode jpeg: {0}")]
    Encode(#[source] image::ImageError),
}

/// Decodes raw upload bytes into an RGB pixel grid. Format sniffing is left
/// to the underlying codec.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, CodecError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| CodecError::InvalidImage(image::ImageError::IoError(e)))?;
    let image = reader.decode().map_err(CodecError::InvalidImage)?;
    Ok(image.to_rgb8())
}

/// Base64 payloads fail early with a distinct error before any image
/// decoding is attempted.
pub fn decode_base64_image(encoded: &str) -> Result<RgbImage, CodecError> {
    let bytes = BASE64_STANDARD.decode(encoded)?;
    decode_image(&bytes)
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new(&mut buf);
    image
        .write_with_encoder(encoder)
        .map_err(CodecError::Encode)?;
    Ok(buf)
}

pub fn to_base64(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 120, 40]));
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn decodes_png_bytes() {
        let image = decode_image(&png_bytes(64, 48)).unwrap();
        assert_eq!(image.dimensions(), (64, 48));
    }

    #[test]
    fn garbage_bytes_are_an_invalid_image() {
        let result = decode_image(b"definitely not an image");
        assert!(matches!(result, Err(CodecError::InvalidImage(_))));
    }

    #[test]
    fn invalid_base64_is_reported_before_image_decoding() {
        let result = decode_base64_image("%%% not base64 %%%");
        assert!(matches!(result, Err(CodecError::InvalidBase64(_))));
    }

    #[test]
    fn base64_of_garbage_is_an_invalid_image() {
        let encoded = to_base64(b"still not an image");
        let result = decode_base64_image(&encoded);
        assert!(matches!(result, Err(CodecError::InvalidImage(_))));
    }

    #[test]
    fn jpeg_round_trip_preserves_dimensions() {
        let source = decode_image(&png_bytes(80, 60)).unwrap();
        let jpeg = encode_jpeg(&source).unwrap();
        let decoded = decode_image(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), source.dimensions());
    }

    #[test]
    fn base64_image_round_trip() {
        let encoded = to_base64(&png_bytes(32, 32));
        let image = decode_base64_image(&encoded).unwrap();
        assert_eq!(image.dimensions(), (32, 32));
    }
}

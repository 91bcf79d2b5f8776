//! JPEG encoding of captured frames.

use guardian_media::Frame;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;

use crate::error::{StorageError, StorageResult};

/// Quality used for evidence images.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Encode an RGB24 frame as JPEG.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> StorageResult<Vec<u8>> {
    let expected = Frame::byte_len(frame.width, frame.height);
    if frame.data.len() < expected {
        return Err(StorageError::TruncatedFrame {
            expected,
            actual: frame.data.len(),
        });
    }
    if expected == 0 {
        return Err(StorageError::encode_failed("frame has no pixels"));
    }

    let mut buf = Vec::with_capacity(expected / 8);
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode(&frame.data[..expected], frame.width, frame.height, ColorType::Rgb8)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_produces_jpeg() {
        let frame = Frame::filled(64, 48, 0, 128);
        let bytes = encode_jpeg(&frame, DEFAULT_JPEG_QUALITY).unwrap();
        // SOI marker
        assert_eq!(&bytes[..2], &[0xff, 0xd8]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xff, 0xd9]);
    }

    #[test]
    fn test_encode_rejects_truncated_frame() {
        let frame = Frame::new(64, 48, 0, vec![0; 10]);
        assert!(matches!(
            encode_jpeg(&frame, DEFAULT_JPEG_QUALITY),
            Err(StorageError::TruncatedFrame { expected: 9216, actual: 10 })
        ));
    }
}

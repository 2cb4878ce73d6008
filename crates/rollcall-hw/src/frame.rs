//! Frame type and pixel conversion: YUYV/MJPG/Y16 to RGB or luma, JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat};

/// Pixel layout of a converted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// Packed 8-bit RGB (3 bytes/pixel).
    Rgb8,
    /// 8-bit grayscale (1 byte/pixel), from IR or monochrome sensors.
    Luma8,
}

impl PixelLayout {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelLayout::Rgb8 => 3,
            PixelLayout::Luma8 => 1,
        }
    }

    fn color_type(self) -> ExtendedColorType {
        match self {
            PixelLayout::Rgb8 => ExtendedColorType::Rgb8,
            PixelLayout::Luma8 => ExtendedColorType::L8,
        }
    }
}

/// A captured camera frame at the device's native resolution.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
}

impl Frame {
    /// Number of bytes `data` must hold for the frame's size and layout.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.layout.bytes_per_pixel()
    }

    /// Encode as baseline JPEG. `quality` is clamped to 1–100.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::Empty);
        }
        let expected = self.expected_len();
        if self.data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: self.data.len(),
            });
        }

        let mut out = Vec::with_capacity(expected / 8);
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        encoder
            .encode(&self.data, self.width, self.height, self.layout.color_type())
            .map_err(FrameError::Encode)?;
        Ok(out)
    }
}

/// Convert packed YUYV (4:2:2) to RGB using BT.601 limited-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    let expected = pixels * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    let chunks = yuyv[..expected].chunks_exact(4);
    let tail = chunks.remainder();
    for quad in chunks {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    // Odd pixel count: the last pixel has no V sample.
    if let &[y, u] = tail {
        rgb.extend_from_slice(&yuv_to_rgb(y, u, 128));
    }
    Ok(rgb)
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| (x >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e + 128),
        clamp(298 * c - 100 * d - 208 * e + 128),
        clamp(298 * c + 516 * d + 128),
    ]
}

/// Downscale 16-bit little-endian grayscale to 8-bit by keeping the high byte.
pub fn y16_to_luma(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    let expected = pixels * 2;
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    Ok(buf[..expected].chunks_exact(2).map(|px| px[1]).collect())
}

/// Decode a motion-JPEG buffer to RGB. Returns pixels and decoded dimensions.
pub fn decode_mjpeg(buf: &[u8]) -> Result<(Vec<u8>, u32, u32), FrameError> {
    let img = image::load_from_memory_with_format(buf, ImageFormat::Jpeg)
        .map_err(FrameError::Decode)?
        .to_rgb8();
    let (w, h) = img.dimensions();
    Ok((img.into_raw(), w, h))
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("frame has zero width or height")]
    Empty,
    #[error("JPEG encode failed: {0}")]
    Encode(image::ImageError),
    #[error("MJPG decode failed: {0}")]
    Decode(image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: Vec<u8>, width: u32, height: u32, layout: PixelLayout) -> Frame {
        Frame {
            data,
            width,
            height,
            layout,
        }
    }

    #[test]
    fn test_yuyv_black_white_gray() {
        // 2x1 image: Y0=16 (black), Y1=235 (white), neutral chroma
        let rgb = yuyv_to_rgb(&[16, 128, 235, 128], 2, 1).unwrap();
        assert_eq!(rgb, vec![0, 0, 0, 255, 255, 255]);

        let rgb = yuyv_to_rgb(&[126, 128, 126, 128], 2, 1).unwrap();
        assert_eq!(rgb, vec![128; 6]);
    }

    #[test]
    fn test_yuyv_red_dominant() {
        // Strong V pushes red up and green down.
        let rgb = yuyv_to_rgb(&[81, 90, 81, 240], 2, 1).unwrap();
        assert!(rgb[0] > 200, "red = {}", rgb[0]);
        assert!(rgb[1] < 40, "green = {}", rgb[1]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let result = yuyv_to_rgb(&[100, 128], 2, 1);
        assert!(matches!(
            result,
            Err(FrameError::InvalidLength { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_yuyv_odd_pixel_count() {
        // 3x1: one full quad plus a trailing [Y, U] pair
        let rgb = yuyv_to_rgb(&[16, 128, 16, 128, 235, 128], 3, 1).unwrap();
        assert_eq!(rgb.len(), 9);
        assert_eq!(&rgb[6..], &[255, 255, 255]);
    }

    #[test]
    fn test_y16_keeps_high_byte() {
        let buf = vec![0x34, 0x12, 0xff, 0xab];
        assert_eq!(y16_to_luma(&buf, 2, 1).unwrap(), vec![0x12, 0xab]);
        assert!(y16_to_luma(&buf, 3, 1).is_err());
    }

    #[test]
    fn test_encode_jpeg_rgb() {
        let f = frame(vec![200u8; 16 * 8 * 3], 16, 8, PixelLayout::Rgb8);
        let jpeg = f.encode_jpeg(70).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "missing SOI marker");
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9], "missing EOI marker");
    }

    #[test]
    fn test_encode_jpeg_luma() {
        let f = frame(vec![90u8; 8 * 8], 8, 8, PixelLayout::Luma8);
        assert!(f.encode_jpeg(70).is_ok());
    }

    #[test]
    fn test_encode_rejects_short_buffer() {
        let f = frame(vec![0u8; 10], 4, 4, PixelLayout::Rgb8);
        assert!(matches!(
            f.encode_jpeg(70),
            Err(FrameError::InvalidLength { expected: 48, actual: 10 })
        ));
    }

    #[test]
    fn test_encode_rejects_empty_frame() {
        let f = frame(vec![], 0, 0, PixelLayout::Rgb8);
        assert!(matches!(f.encode_jpeg(70), Err(FrameError::Empty)));
    }

    #[test]
    fn test_mjpeg_decode_roundtrip_dimensions() {
        let f = frame(vec![50u8; 24 * 16 * 3], 24, 16, PixelLayout::Rgb8);
        let jpeg = f.encode_jpeg(90).unwrap();
        let (rgb, w, h) = decode_mjpeg(&jpeg).unwrap();
        assert_eq!((w, h), (24, 16));
        assert_eq!(rgb.len(), 24 * 16 * 3);
    }

    #[test]
    fn test_mjpeg_decode_garbage() {
        assert!(matches!(
            decode_mjpeg(&[0, 1, 2, 3]),
            Err(FrameError::Decode(_))
        ));
    }
}

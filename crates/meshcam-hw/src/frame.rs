//! Frame type and pixel conversion from YUYV, GREY and MJPEG to packed RGB.

/// A captured camera frame in packed RGB8.
#[derive(Debug, Clone)]
pub struct Frame {
    /// RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Media time of this frame, seconds since the stream started.
    pub presentation_time: f64,
    pub sequence: u32,
}

impl Frame {
    /// Average luma (0.0–255.0), used for capture diagnostics.
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: f32 = self
            .data
            .chunks_exact(3)
            .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
            .sum();
        sum / (self.data.len() / 3) as f32
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// BT.601 limited-range YUV to RGB.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = (y as f32 - 16.0) * 1.164;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    [
        clamp_u8(c + 1.596 * e),
        clamp_u8(c - 0.392 * d - 0.813 * e),
        clamp_u8(c + 2.017 * d),
    ]
}

/// Convert packed YUYV (4:2:2) to RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for quad in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

/// Replicate 8-bit grayscale into RGB.
pub fn grey_to_rgb(gray: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height) as usize;
    if gray.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: gray.len(),
        });
    }
    Ok(gray[..expected].iter().flat_map(|&g| [g, g, g]).collect())
}

/// Decode one MJPEG frame. Returns the RGB data and its dimensions.
pub fn mjpeg_to_rgb(jpeg: &[u8]) -> Result<(Vec<u8>, u32, u32), FrameError> {
    let image = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)?.to_rgb8();
    let (w, h) = image.dimensions();
    Ok((image.into_raw(), w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_to_rgb_gray_levels() {
        // Neutral chroma: Y=16 is black, Y=235 is white.
        let yuyv = vec![16, 128, 235, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![0, 0, 0, 255, 255, 255]);
    }

    #[test]
    fn test_yuyv_to_rgb_red() {
        // BT.601 red: Y=81, U=90, V=240
        let yuyv = vec![81, 90, 81, 240];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert!(rgb[0] > 250, "r={}", rgb[0]);
        assert!(rgb[1] < 5, "g={}", rgb[1]);
        assert!(rgb[2] < 5, "b={}", rgb[2]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![100, 128]; // too short for 2x1
        assert!(matches!(
            yuyv_to_rgb(&yuyv, 2, 1),
            Err(FrameError::InvalidLength { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_grey_to_rgb() {
        let rgb = grey_to_rgb(&[7, 200], 2, 1).unwrap();
        assert_eq!(rgb, vec![7, 7, 7, 200, 200, 200]);
        assert!(grey_to_rgb(&[1], 2, 1).is_err());
    }

    #[test]
    fn test_mjpeg_roundtrip_dimensions() {
        let image = image::RgbImage::from_pixel(8, 6, image::Rgb([120, 60, 30]));
        let mut jpeg = Vec::new();
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();

        let (rgb, w, h) = mjpeg_to_rgb(&jpeg).unwrap();
        assert_eq!((w, h), (8, 6));
        assert_eq!(rgb.len(), 8 * 6 * 3);
    }

    #[test]
    fn test_mjpeg_garbage() {
        assert!(matches!(mjpeg_to_rgb(&[0, 1, 2, 3]), Err(FrameError::Decode(_))));
    }

    #[test]
    fn test_avg_brightness() {
        let frame = Frame {
            data: vec![255; 4 * 3],
            width: 2,
            height: 2,
            presentation_time: 0.0,
            sequence: 0,
        };
        assert!((frame.avg_brightness() - 255.0).abs() < 0.1);
    }
}

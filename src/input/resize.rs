/// 帧归一化: 任意分辨率 → 固定宫格分辨率
///
/// 使用 fast_image_resize (双线性插值), 不保持宽高比, 与宫格单元的固定形状一致。
use super::codec::RawFrame;
use crate::error::CodecError;
use crate::grid::types::Frame;
use fast_image_resize as fr;

pub struct FrameNormalizer {
    width: u32,
    height: u32,
    resizer: fr::Resizer,
    options: fr::ResizeOptions,
}

impl FrameNormalizer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            resizer: fr::Resizer::new(),
            options: fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        }
    }

    /// 目标分辨率的黑帧
    pub fn blank(&self) -> Frame {
        Frame::blank(self.width, self.height)
    }

    pub fn normalize(&mut self, raw: RawFrame) -> Result<Frame, CodecError> {
        if raw.width == 0 || raw.height == 0 {
            return Err(CodecError::decode(format!(
                "empty frame {}x{}",
                raw.width, raw.height
            )));
        }

        // 分辨率已一致时直接使用
        if raw.width == self.width && raw.height == self.height {
            if raw.rgba_data.len() != raw.width as usize * raw.height as usize * 4 {
                return Err(CodecError::decode("frame buffer size mismatch"));
            }
            return Ok(Frame::new(self.width, self.height, raw.rgba_data));
        }

        let src_image =
            fr::images::Image::from_vec_u8(raw.width, raw.height, raw.rgba_data, fr::PixelType::U8x4)
                .map_err(CodecError::decode)?;
        let mut dst_image = fr::images::Image::new(self.width, self.height, fr::PixelType::U8x4);

        self.resizer
            .resize(&src_image, &mut dst_image, &self.options)
            .map_err(CodecError::decode)?;

        Ok(Frame::new(self.width, self.height, dst_image.into_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::solid_frame;

    #[test]
    fn test_downscale_to_target() {
        let mut normalizer = FrameNormalizer::new(96, 54);
        let frame = normalizer.normalize(solid_frame(80, 1280, 720)).unwrap();
        assert_eq!((frame.width, frame.height), (96, 54));
        assert_eq!(frame.rgba_data.len(), 96 * 54 * 4);
        // 纯色图缩放后仍是纯色 (允许定点舍入误差)
        assert!(frame
            .rgba_data
            .chunks_exact(4)
            .all(|px| px[..3].iter().all(|c| c.abs_diff(80) <= 1) && px[3] >= 254));
    }

    #[test]
    fn test_upscale_distorts_aspect() {
        let mut normalizer = FrameNormalizer::new(64, 64);
        let frame = normalizer.normalize(solid_frame(10, 32, 8)).unwrap();
        assert_eq!((frame.width, frame.height), (64, 64));
    }

    #[test]
    fn test_rejects_bad_buffers() {
        let mut normalizer = FrameNormalizer::new(4, 4);
        let empty = RawFrame {
            rgba_data: Vec::new(),
            width: 0,
            height: 4,
        };
        assert!(normalizer.normalize(empty).is_err());

        let short = RawFrame {
            rgba_data: vec![0; 10],
            width: 8,
            height: 8,
        };
        assert!(normalizer.normalize(short).is_err());

        let short_same_size = RawFrame {
            rgba_data: vec![0; 10],
            width: 4,
            height: 4,
        };
        assert!(normalizer.normalize(short_same_size).is_err());
    }

    #[test]
    fn test_blank_matches_target() {
        let normalizer = FrameNormalizer::new(12, 6);
        let blank = normalizer.blank();
        assert_eq!((blank.width, blank.height), (12, 6));
        assert!(blank.is_blank());
    }
}

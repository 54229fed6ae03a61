// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 帧预处理
// RgbImage (HWC) → resize → NCHW 张量 [1, 3, H, W]

use image::{imageops, RgbImage};
use ndarray::Array4;

/// 输入张量的通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ChannelOrder {
    /// OpenVINO/Caffe 系列行人检测模型使用 BGR
    #[default]
    Bgr,
    Rgb,
}

/// 帧预处理器
///
/// 更换检测器只改变目标尺寸, 变换过程对每一帧完全相同。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocessor {
    width: u32,
    height: u32,
    channel_order: ChannelOrder,
    scale: f32,
}

impl Preprocessor {
    /// `width`, `height` 取自检测器声明的输入形状 [1, 3, height, width]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            channel_order: ChannelOrder::default(),
            scale: 1.0,
        }
    }

    pub fn with_channel_order(mut self, order: ChannelOrder) -> Self {
        self.channel_order = order;
        self
    }

    /// 像素值乘以 `scale` (默认 1.0, 即保留 0-255 原值)
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channel_order(&self) -> ChannelOrder {
        self.channel_order
    }

    /// 预处理: 缩放到检测器输入尺寸, HWC → CHW, 插入 batch 维
    pub fn preprocess(&self, frame: &RgbImage) -> Array4<f32> {
        let resized;
        let img = if frame.dimensions() == (self.width, self.height) {
            frame
        } else {
            resized = imageops::resize(
                frame,
                self.width,
                self.height,
                imageops::FilterType::Triangle,
            );
            &resized
        };

        let channels = match self.channel_order {
            ChannelOrder::Bgr => [2usize, 1, 0],
            ChannelOrder::Rgb => [0usize, 1, 2],
        };

        let mut ys = Array4::<f32>::zeros((1, 3, self.height as usize, self.width as usize));
        for (x, y, px) in img.enumerate_pixels() {
            let x = x as usize;
            let y = y as usize;
            for (c, &src) in channels.iter().enumerate() {
                ys[[0, c, y, x]] = px.0[src] as f32 * self.scale;
            }
        }
        ys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([x as u8, y as u8, 200]))
    }

    #[test]
    fn test_output_shape_is_nchw() {
        let pre = Preprocessor::new(544, 320);
        let ys = pre.preprocess(&gradient(1280, 720));
        assert_eq!(ys.shape(), &[1, 3, 320, 544]);
    }

    #[test]
    fn test_bgr_layout_without_resize() {
        let pre = Preprocessor::new(4, 3);
        let ys = pre.preprocess(&gradient(4, 3));
        // 通道0是B, 通道2是R
        assert_eq!(ys[[0, 0, 1, 2]], 200.0);
        assert_eq!(ys[[0, 1, 1, 2]], 1.0);
        assert_eq!(ys[[0, 2, 1, 2]], 2.0);
    }

    #[test]
    fn test_rgb_layout_and_scale() {
        let pre = Preprocessor::new(4, 3)
            .with_channel_order(ChannelOrder::Rgb)
            .with_scale(1.0 / 255.0);
        let ys = pre.preprocess(&gradient(4, 3));
        assert!((ys[[0, 0, 2, 3]] - 3.0 / 255.0).abs() < 1e-6);
        assert!((ys[[0, 1, 2, 3]] - 2.0 / 255.0).abs() < 1e-6);
        assert!((ys[[0, 2, 2, 3]] - 200.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_same_frame_same_tensor() {
        let pre = Preprocessor::new(32, 16);
        let frame = gradient(100, 50);
        assert_eq!(pre.preprocess(&frame), pre.preprocess(&frame));
    }
}

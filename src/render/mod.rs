// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 叠加绘制 (Overlay Renderer)
// - 检测框: 固定颜色的空心矩形
// - 区域人数: 每个区域一行文字, 按注册顺序自上而下排列

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detection::Detection;
use crate::zones::FrameOccupancy;

/// 检测框颜色 (橙红)
pub const BOX_COLOR: Rgb<u8> = Rgb([255, 55, 0]);
/// 文字颜色 (绿色)
pub const TEXT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
/// 第一行文字的 x 坐标
pub const TEXT_X: i32 = 15;
/// 第一行文字基线的 y 坐标
pub const TEXT_FIRST_Y: i32 = 25;
/// 行距
pub const TEXT_PITCH: i32 = 40;
/// 字号 (像素)
pub const TEXT_SCALE: f32 = 28.0;

/// 未指定字体时依次尝试的系统字体
const FALLBACK_FONTS: &[&str] = &[
    "assets/font/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// 一行区域人数文字及其基线位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyLine {
    pub zone_id: usize,
    pub text: String,
    pub x: i32,
    pub y: i32,
}

/// 排版: 每个区域一行, 顺序与区域注册顺序一致
pub fn occupancy_lines(occupancy: &FrameOccupancy, max_people: u32) -> Vec<OccupancyLine> {
    occupancy
        .iter()
        .enumerate()
        .map(|(row, (zone_id, count))| {
            let mut text = format!("No. of People in Queue {} is {}", zone_id, count);
            if count >= max_people {
                text.push_str("  Queue full; Please move to next Queue");
            }
            OccupancyLine {
                zone_id,
                text,
                x: TEXT_X,
                y: TEXT_FIRST_Y + TEXT_PITCH * row as i32,
            }
        })
        .collect()
}

/// 检测框对应的矩形; 退化框 (宽或高不为正) 返回 `None`
///
/// 坐标先限制到 [-1, 画面宽/高], 画面外的边不会被画出, 也不会在 imageproc 内部溢出。
pub fn detection_rect(detection: &Detection, width: u32, height: u32) -> Option<Rect> {
    if detection.is_degenerate() {
        return None;
    }
    let clamp_x = |v: i32| v.clamp(-1, width.min(i32::MAX as u32) as i32);
    let clamp_y = |v: i32| v.clamp(-1, height.min(i32::MAX as u32) as i32);
    let clipped = Detection::new(
        clamp_x(detection.xmin),
        clamp_y(detection.ymin),
        clamp_x(detection.xmax),
        clamp_y(detection.ymax),
    );
    if clipped.is_degenerate() {
        return None;
    }
    Some(
        Rect::at(clipped.xmin, clipped.ymin)
            .of_size(clipped.width() as u32, clipped.height() as u32),
    )
}

/// 叠加绘制器
pub struct OverlayRenderer {
    font: Option<FontVec>,
    box_color: Rgb<u8>,
    text_color: Rgb<u8>,
    scale: PxScale,
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new(None)
    }
}

impl OverlayRenderer {
    /// 没有字体时只画检测框, 不画文字
    pub fn new(font: Option<FontVec>) -> Self {
        Self {
            font,
            box_color: BOX_COLOR,
            text_color: TEXT_COLOR,
            scale: PxScale::from(TEXT_SCALE),
        }
    }

    /// 加载字体; `path` 为空时尝试常见的系统字体
    pub fn with_font_path(path: Option<&Path>) -> Result<Self> {
        let font = match path {
            Some(path) => Some(load_font(path)?),
            None => FALLBACK_FONTS
                .iter()
                .map(PathBuf::from)
                .filter(|p| p.is_file())
                .find_map(|p| load_font(&p).ok()),
        };
        if font.is_none() {
            log::warn!("⚠️  未找到可用字体, 叠加画面中不显示排队人数文字");
        }
        Ok(Self::new(font))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 画检测框 (1像素空心矩形), 退化框跳过
    pub fn draw(&self, frame: &mut RgbImage, detections: &[Detection]) {
        let (w, h) = frame.dimensions();
        for rect in detections.iter().filter_map(|d| detection_rect(d, w, h)) {
            draw_hollow_rect_mut(frame, rect, self.box_color);
        }
    }

    /// 画每个区域的人数, 达到上限时追加排队已满提示
    pub fn draw_occupancy_text(
        &self,
        frame: &mut RgbImage,
        occupancy: &FrameOccupancy,
        max_people: u32,
    ) -> Vec<OccupancyLine> {
        let lines = occupancy_lines(occupancy, max_people);
        if let Some(font) = &self.font {
            let ascent = self.scale.y.round() as i32;
            for line in &lines {
                // 布局坐标是基线, imageproc 从左上角开始画
                draw_text_mut(
                    frame,
                    self.text_color,
                    line.x,
                    line.y - ascent,
                    self.scale,
                    font,
                    &line.text,
                );
            }
        }
        lines
    }
}

fn load_font(path: &Path) -> Result<FontVec> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("could not read font {}", path.display()))?;
    let font = FontVec::try_from_vec(bytes)
        .with_context(|| format!("invalid font file {}", path.display()))?;
    log::info!("✅ 字体加载成功: {}", path.display());
    Ok(font)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::ZoneRegistry;

    fn occupancy(counts_by_zone: &[(i32, usize)]) -> FrameOccupancy {
        // 每个区域宽100, 在区域内放入指定数量的检测框
        let mut registry = ZoneRegistry::new();
        let mut dets = Vec::new();
        for &(x0, n) in counts_by_zone {
            registry.add_zone(x0, 0, x0 + 100, 100).unwrap();
            for _ in 0..n {
                dets.push(Detection::new(x0 + 10, 10, x0 + 90, 90));
            }
        }
        registry.evaluate(&dets)
    }

    #[test]
    fn test_lines_follow_registration_order() {
        let lines = occupancy_lines(&occupancy(&[(0, 1), (200, 0)]), 2);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "No. of People in Queue 1 is 1");
        assert_eq!(lines[1].text, "No. of People in Queue 2 is 0");
        assert_eq!((lines[0].x, lines[0].y), (15, 25));
        assert_eq!((lines[1].x, lines[1].y), (15, 65));
    }

    #[test]
    fn test_swapping_registration_swaps_lines() {
        let a = occupancy_lines(&occupancy(&[(0, 3), (200, 1)]), 5);
        let b = occupancy_lines(&occupancy(&[(200, 1), (0, 3)]), 5);
        assert!(a[0].text.ends_with("is 3"));
        assert!(b[0].text.ends_with("is 1"));
        assert_eq!(a[0].y, b[0].y);
    }

    #[test]
    fn test_queue_full_notice() {
        let lines = occupancy_lines(&occupancy(&[(0, 2), (200, 1), (400, 3)]), 2);
        assert!(lines[0].text.contains("Queue full"));
        assert!(!lines[1].text.contains("Queue full"));
        assert!(lines[2].text.starts_with("No. of People in Queue 3 is 3"));
        assert!(lines[2].text.contains("Queue full"));
    }

    #[test]
    fn test_draw_boxes_and_skip_degenerate() {
        let renderer = OverlayRenderer::new(None);
        let mut frame = RgbImage::new(50, 50);
        let dets = [
            Detection::new(10, 10, 20, 30),
            Detection::new(30, 30, 30, 40),
            Detection::new(40, 40, 35, 35),
        ];
        renderer.draw(&mut frame, &dets);

        assert_eq!(*frame.get_pixel(10, 10), BOX_COLOR);
        assert_eq!(*frame.get_pixel(19, 29), BOX_COLOR);
        // 内部不填充
        assert_eq!(*frame.get_pixel(15, 20), Rgb([0, 0, 0]));
        // 退化框不画
        assert_eq!(*frame.get_pixel(30, 35), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_boxes_outside_frame_do_not_panic() {
        let renderer = OverlayRenderer::new(None);
        let mut frame = RgbImage::new(20, 20);
        renderer.draw(
            &mut frame,
            &[Detection::new(-10, -10, 5, 5), Detection::new(15, 15, 60, 60)],
        );
        assert_eq!(*frame.get_pixel(4, 4), BOX_COLOR);
    }

    #[test]
    fn test_far_out_of_range_box_does_not_panic() {
        let raw = ndarray::array![[1.0f32, 0.9, -1e10, 0.1, 0.5, 0.5]];
        let dets = crate::detection::Postprocessor::new(0.5)
            .postprocess(raw.view(), 64, 64)
            .unwrap();
        assert_eq!(dets[0].xmin, i32::MIN);

        let renderer = OverlayRenderer::new(None);
        let mut frame = RgbImage::new(64, 64);
        renderer.draw(&mut frame, &dets);
        // 右边 x=31, 上边 y=6; 左边在画面外
        assert_eq!(*frame.get_pixel(31, 20), BOX_COLOR);
        assert_eq!(*frame.get_pixel(10, 6), BOX_COLOR);
        assert_eq!(*frame.get_pixel(0, 20), Rgb([0, 0, 0]));

        let huge = Detection::new(-10, -10, i32::MAX, i32::MAX);
        assert_eq!(
            detection_rect(&huge, 64, 64).map(|r| (r.left(), r.top(), r.width(), r.height())),
            Some((-1, -1, 65, 65))
        );
        renderer.draw(&mut frame, &[huge]);
    }

    #[test]
    fn test_text_without_font_is_layout_only() {
        let renderer = OverlayRenderer::new(None);
        let mut frame = RgbImage::new(64, 64);
        let before = frame.clone();
        let lines = renderer.draw_occupancy_text(&mut frame, &occupancy(&[(0, 0)]), 2);
        assert_eq!(lines.len(), 1);
        assert_eq!(frame, before);
    }
}

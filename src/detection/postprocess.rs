// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 检测结果后处理
// 归一化输出 [N, 6+] → 置信度过滤 → 像素坐标

use ndarray::{ArrayView2, Axis};

use super::types::{Detection, COL_SCORE, COL_X1, COL_X2, COL_Y1, COL_Y2, RAW_COLUMNS};
use crate::error::PostprocessError;

/// 默认置信度阈值
pub const DEFAULT_THRESHOLD: f32 = 0.60;

/// 检测后处理器
///
/// 不做NMS, 不按空间位置排序; 输出顺序与检测器输出的行顺序一致。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Postprocessor {
    threshold: f32,
}

impl Default for Postprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl Postprocessor {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn set_threshold(&mut self, val: f32) {
        self.threshold = val;
    }

    /// 后处理主函数
    ///
    /// # 参数
    /// - `raw`: 检测器输出, 每行 [class, score, x1, y1, x2, y2, ...], 坐标归一化到 [0, 1]
    /// - `width`, `height`: 原始帧的像素尺寸
    ///
    /// score >= threshold 的行被保留 (包含等于); 坐标乘以帧尺寸后四舍五入
    /// (`f32::round`, 0.5 远离零取整)。
    pub fn postprocess(
        &self,
        raw: ArrayView2<'_, f32>,
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, PostprocessError> {
        let cols = raw.ncols();
        if raw.nrows() > 0 && cols < RAW_COLUMNS {
            return Err(PostprocessError::TooFewColumns(cols));
        }

        let w = width as f32;
        let h = height as f32;
        let detections = raw
            .axis_iter(Axis(0))
            .filter(|row| row[COL_SCORE] >= self.threshold)
            .map(|row| Detection {
                xmin: denormalize(row[COL_X1], w),
                ymin: denormalize(row[COL_Y1], h),
                xmax: denormalize(row[COL_X2], w),
                ymax: denormalize(row[COL_Y2], h),
            })
            .collect();
        Ok(detections)
    }
}

/// 归一化坐标 → 像素坐标
#[inline]
pub fn denormalize(v: f32, extent: f32) -> i32 {
    (v * extent).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_denormalize_reference_box() {
        let raw = array![[0.0f32, 0.9, 0.1, 0.2, 0.3, 0.4]];
        let pp = Postprocessor::new(0.5);
        let dets = pp.postprocess(raw.view(), 544, 320).unwrap();
        assert_eq!(dets, vec![Detection::new(54, 64, 163, 128)]);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let raw = array![
            [1.0f32, 0.6, 0.1, 0.1, 0.2, 0.2],
            [1.0, 0.59999, 0.1, 0.1, 0.2, 0.2],
            [1.0, 0.61, 0.3, 0.3, 0.4, 0.4],
        ];
        let pp = Postprocessor::new(0.6);
        let dets = pp.postprocess(raw.view(), 100, 100).unwrap();
        assert_eq!(
            dets,
            vec![Detection::new(10, 10, 20, 20), Detection::new(30, 30, 40, 40)]
        );
    }

    #[test]
    fn test_keeps_row_order_and_extra_columns() {
        let raw = array![
            [1.0f32, 0.9, 0.8, 0.0, 0.9, 1.0, 42.0],
            [1.0, 0.9, 0.1, 0.0, 0.2, 1.0, 42.0],
        ];
        let dets = Postprocessor::new(0.5)
            .postprocess(raw.view(), 10, 10)
            .unwrap();
        assert_eq!(dets[0].xmin, 8);
        assert_eq!(dets[1].xmin, 1);
    }

    #[test]
    fn test_degenerate_boxes_pass_through() {
        let raw = array![[1.0f32, 0.9, 0.5, 0.5, 0.4, 0.5]];
        let dets = Postprocessor::new(0.5)
            .postprocess(raw.view(), 100, 100)
            .unwrap();
        assert_eq!(dets.len(), 1);
        assert!(dets[0].is_degenerate());
    }

    #[test]
    fn test_rejects_narrow_output() {
        let raw = Array2::<f32>::zeros((3, 5));
        assert_eq!(
            Postprocessor::default().postprocess(raw.view(), 10, 10),
            Err(PostprocessError::TooFewColumns(5))
        );
        // 空输出不检查列数
        let empty = Array2::<f32>::zeros((0, 0));
        assert_eq!(
            Postprocessor::default().postprocess(empty.view(), 10, 10),
            Ok(vec![])
        );
    }
}

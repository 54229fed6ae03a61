// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// SSD 风格检测输出解码
// [1, 1, N, 7]: image_id, label, conf, x_min, y_min, x_max, y_max

use anyhow::{bail, Result};
use ndarray::Array2;

use crate::detection::types::RAW_COLUMNS;

/// SSD 输出每个候选框的长度
pub const SSD_STEP: usize = 7;

/// 把 SSD 输出转换为 [N, 6] (去掉 image_id 列)
///
/// image_id < 0 的行表示有效结果已经结束, 之后的行全部忽略。
pub fn decode_ssd_output(data: &[f32]) -> Result<Array2<f32>> {
    if data.len() % SSD_STEP != 0 {
        bail!(
            "SSD output length {} is not a multiple of {}",
            data.len(),
            SSD_STEP
        );
    }

    let mut rows = Vec::with_capacity(data.len() / SSD_STEP * RAW_COLUMNS);
    let mut n = 0;
    for candidate in data.chunks_exact(SSD_STEP) {
        if candidate[0] < 0.0 {
            break;
        }
        rows.extend_from_slice(&candidate[1..]);
        n += 1;
    }
    Ok(Array2::from_shape_vec((n, RAW_COLUMNS), rows)?)
}

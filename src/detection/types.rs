// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测结果数据结构定义
/// Data structures for per-frame person detections

// ========== 公共常量 ==========

/// 检测器输出每行的最少列数: [class, score, x1, y1, x2, y2]
pub const RAW_COLUMNS: usize = 6;

/// 行内各字段的列号
pub const COL_CLASS: usize = 0;
pub const COL_SCORE: usize = 1;
pub const COL_X1: usize = 2;
pub const COL_Y1: usize = 3;
pub const COL_X2: usize = 4;
pub const COL_Y2: usize = 5;

// ========== 数据结构 ==========

/// 检测框 (像素坐标)
///
/// 只在一帧内有效; 不做合法性校验, xmax <= xmin 的退化框也会原样保留。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Detection {
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
}

impl Detection {
    pub fn new(xmin: i32, ymin: i32, xmax: i32, ymax: i32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// 坐标可能是饱和后的极值, 宽高按饱和减法计算
    pub fn width(&self) -> i32 {
        self.xmax.saturating_sub(self.xmin)
    }

    pub fn height(&self) -> i32 {
        self.ymax.saturating_sub(self.ymin)
    }

    /// 宽或高不为正
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 排队区域 (Zone Registry)
// - Zone:           像素坐标系下的轴对齐矩形
// - ZoneRegistry:   按注册顺序保存区域, 统计每帧各区域人数
// - FrameOccupancy: 单帧的区域人数表 (区域编号从1开始)

pub mod loader;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use image::{GenericImageView, RgbImage, SubImage};

use crate::detection::Detection;
use crate::error::InvalidZoneError;

pub use loader::{load_registry, load_zone_file};

/// 区域子图调试输出所在的子目录
pub const ZONE_CROPS_DIR: &str = "zone_crops";

/// 排队区域 (x_min, y_min, x_max, y_max), 像素坐标, 0起始
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zone {
    x_min: i32,
    y_min: i32,
    x_max: i32,
    y_max: i32,
}

impl Zone {
    pub fn new(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Result<Self, InvalidZoneError> {
        if x_max <= x_min || y_max <= y_min {
            return Err(InvalidZoneError {
                x_min,
                y_min,
                x_max,
                y_max,
            });
        }
        Ok(Self {
            x_min,
            y_min,
            x_max,
            y_max,
        })
    }

    pub fn x_min(&self) -> i32 {
        self.x_min
    }

    pub fn y_min(&self) -> i32 {
        self.y_min
    }

    pub fn x_max(&self) -> i32 {
        self.x_max
    }

    pub fn y_max(&self) -> i32 {
        self.y_max
    }

    /// 检测框是否落在区域内
    ///
    /// 只比较水平方向且为严格不等式; 垂直方向不参与判断,
    /// 区域默认覆盖整幅画面高度。
    pub fn contains(&self, detection: &Detection) -> bool {
        detection.xmin > self.x_min && detection.xmax < self.x_max
    }
}

/// 单帧区域人数
///
/// 与注册的区域一一对应, 没有命中的区域计数为 0。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameOccupancy {
    counts: Vec<u32>,
}

impl FrameOccupancy {
    fn zeroed(zones: usize) -> Self {
        Self {
            counts: vec![0; zones],
        }
    }

    /// 区域数量
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// 按区域编号 (从1开始) 取人数
    pub fn get(&self, zone_id: usize) -> Option<u32> {
        zone_id
            .checked_sub(1)
            .and_then(|idx| self.counts.get(idx))
            .copied()
    }

    /// (区域编号, 人数), 按注册顺序
    pub fn iter(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .map(|(idx, &count)| (idx + 1, count))
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    pub fn is_all_zero(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }
}

impl std::fmt::Display for FrameOccupancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (i, (zone_id, count)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", zone_id, count)?;
        }
        f.write_str("}")
    }
}

/// 区域注册表: 启动时注册, 运行期间只读
#[derive(Debug, Clone, Default)]
pub struct ZoneRegistry {
    zones: Vec<Zone>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个区域, 返回其编号 (从1开始)
    pub fn add_zone(
        &mut self,
        x_min: i32,
        y_min: i32,
        x_max: i32,
        y_max: i32,
    ) -> Result<usize, InvalidZoneError> {
        let zone = Zone::new(x_min, y_min, x_max, y_max)?;
        self.zones.push(zone);
        Ok(self.zones.len())
    }

    pub fn push(&mut self, zone: Zone) -> usize {
        self.zones.push(zone);
        self.zones.len()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// 按编号 (从1开始) 取区域
    pub fn get(&self, zone_id: usize) -> Option<&Zone> {
        zone_id.checked_sub(1).and_then(|idx| self.zones.get(idx))
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// 统计每个区域内的检测框数量
    ///
    /// 一个检测框可以同时计入多个重叠区域。
    pub fn evaluate(&self, detections: &[Detection]) -> FrameOccupancy {
        let mut occupancy = FrameOccupancy::zeroed(self.zones.len());
        for detection in detections {
            for (idx, zone) in self.zones.iter().enumerate() {
                if zone.contains(detection) {
                    occupancy.counts[idx] += 1;
                }
            }
        }
        occupancy
    }

    /// 每个区域在画面中的子图 (裁剪到画面范围内)
    ///
    /// 完全落在画面之外的区域返回 `None`。
    pub fn crop_regions<'a>(
        &'a self,
        frame: &'a RgbImage,
    ) -> impl Iterator<Item = Option<SubImage<&'a RgbImage>>> + 'a {
        let (w, h) = frame.dimensions();
        self.zones.iter().map(move |zone| {
            let x0 = zone.x_min.clamp(0, w as i32) as u32;
            let y0 = zone.y_min.clamp(0, h as i32) as u32;
            let x1 = zone.x_max.clamp(0, w as i32) as u32;
            let y1 = zone.y_max.clamp(0, h as i32) as u32;
            if x1 <= x0 || y1 <= y0 {
                None
            } else {
                Some(frame.view(x0, y0, x1 - x0, y1 - y0))
            }
        })
    }
}

impl ZoneRegistry {
    /// 保存每个区域的子图: `<dir>/<prefix>_zone<K>.png`, 返回写出的文件数
    ///
    /// 完全在画面外的区域跳过。
    pub fn save_crops(&self, frame: &RgbImage, dir: &Path, prefix: &str) -> Result<usize> {
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create crop directory {}", dir.display()))?;
        let mut saved = 0;
        for (idx, crop) in self.crop_regions(frame).enumerate() {
            let Some(crop) = crop else { continue };
            let path = dir.join(format!("{}_zone{}.png", prefix, idx + 1));
            crop.to_image()
                .save(&path)
                .with_context(|| format!("cannot write {}", path.display()))?;
            saved += 1;
        }
        Ok(saved)
    }
}

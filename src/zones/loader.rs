// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 区域文件加载
// 支持 NumPy `.npy` (形状 (N, 4)) 与 JSON 两种格式

use std::fs;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use super::{Zone, ZoneRegistry};
use crate::error::ZoneFileError;

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

/// JSON 中的单个区域: `[x_min, y_min, x_max, y_max]` 或带字段名的对象
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ZoneSpec {
    Array([i32; 4]),
    Object {
        x_min: i32,
        y_min: i32,
        x_max: i32,
        y_max: i32,
    },
}

impl ZoneSpec {
    fn into_rect(self) -> [i32; 4] {
        match self {
            ZoneSpec::Array(rect) => rect,
            ZoneSpec::Object {
                x_min,
                y_min,
                x_max,
                y_max,
            } => [x_min, y_min, x_max, y_max],
        }
    }
}

/// 读取区域文件, 按扩展名选择解析方式
///
/// 任意一个矩形非法都会使整个文件失败, 保证区域编号不会错位。
pub fn load_zone_file(path: &Path) -> Result<Vec<Zone>, ZoneFileError> {
    let bytes = fs::read(path).map_err(|source| ZoneFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let rects = match ext.as_deref() {
        Some("npy") => parse_npy(&bytes)?,
        Some("json") => parse_json(&bytes)?,
        _ => return Err(ZoneFileError::UnsupportedFormat(path.to_path_buf())),
    };

    rects
        .into_iter()
        .enumerate()
        .map(|(index, [x_min, y_min, x_max, y_max])| {
            Zone::new(x_min, y_min, x_max, y_max)
                .map_err(|source| ZoneFileError::InvalidZone { index, source })
        })
        .collect()
}

/// 构建区域注册表; 加载失败不会中断运行, 只会得到空表
pub fn load_registry(path: Option<&Path>) -> ZoneRegistry {
    let mut registry = ZoneRegistry::new();
    let Some(path) = path else {
        log::warn!("⚠️  未指定区域文件, 不统计排队人数");
        return registry;
    };

    match load_zone_file(path) {
        Ok(zones) => {
            for zone in zones {
                registry.push(zone);
            }
            log::info!("✅ 区域已从 {} 加载: {} 个", path.display(), registry.len());
        }
        Err(e) => {
            log::warn!("⚠️  区域文件加载失败: {}, 使用空区域表", e);
        }
    }
    registry
}

fn parse_json(bytes: &[u8]) -> Result<Vec<[i32; 4]>, ZoneFileError> {
    let specs: Vec<ZoneSpec> = serde_json::from_slice(bytes)?;
    Ok(specs.into_iter().map(ZoneSpec::into_rect).collect())
}

/// 解析 `.npy` 头部与数据区
///
/// 只支持 C 顺序、小端的整数/浮点数组, 形状必须是 (N, 4)。
fn parse_npy(bytes: &[u8]) -> Result<Vec<[i32; 4]>, ZoneFileError> {
    let npy_err = |msg: &str| ZoneFileError::Npy(msg.to_string());

    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err(npy_err("missing NUMPY magic"));
    }
    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(npy_err("truncated header length"));
            }
            (
                u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
                12,
            )
        }
        v => return Err(ZoneFileError::Npy(format!("unsupported version {}", v))),
    };
    let data_start = header_start + header_len;
    if bytes.len() < data_start {
        return Err(npy_err("truncated header"));
    }
    let header = std::str::from_utf8(&bytes[header_start..data_start])
        .map_err(|_| npy_err("header is not valid text"))?;

    let header = NpyHeader::parse(header)?;
    if header.fortran_order {
        return Err(npy_err("fortran order is not supported"));
    }
    let rows = match header.shape.as_slice() {
        [rows, 4] => *rows,
        _ => {
            return Err(ZoneFileError::Npy(format!(
                "expected shape (N, 4), got {:?}",
                header.shape
            )))
        }
    };

    let data = &bytes[data_start..];
    let width = header.dtype.size();
    let count = rows
        .checked_mul(4)
        .ok_or_else(|| npy_err("shape too large"))?;
    let needed = count
        .checked_mul(width)
        .ok_or_else(|| npy_err("shape too large"))?;
    if data.len() < needed {
        return Err(npy_err("data section shorter than shape"));
    }

    let values: Vec<i32> = data
        .chunks_exact(width)
        .take(count)
        .map(|chunk| header.dtype.read(chunk))
        .collect::<Result<_, _>>()?;

    Ok(values
        .chunks_exact(4)
        .map(|c| [c[0], c[1], c[2], c[3]])
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum NpyDtype {
    I1,
    I2,
    I4,
    I8,
    U1,
    U2,
    U4,
    U8,
    F4,
    F8,
}

impl NpyDtype {
    fn from_descr(kind: &str, size: &str) -> Option<Self> {
        Some(match (kind, size) {
            ("i", "1") => NpyDtype::I1,
            ("i", "2") => NpyDtype::I2,
            ("i", "4") => NpyDtype::I4,
            ("i", "8") => NpyDtype::I8,
            ("u", "1") => NpyDtype::U1,
            ("u", "2") => NpyDtype::U2,
            ("u", "4") => NpyDtype::U4,
            ("u", "8") => NpyDtype::U8,
            ("f", "4") => NpyDtype::F4,
            ("f", "8") => NpyDtype::F8,
            _ => return None,
        })
    }

    fn size(&self) -> usize {
        match self {
            NpyDtype::I1 | NpyDtype::U1 => 1,
            NpyDtype::I2 | NpyDtype::U2 => 2,
            NpyDtype::I4 | NpyDtype::U4 | NpyDtype::F4 => 4,
            NpyDtype::I8 | NpyDtype::U8 | NpyDtype::F8 => 8,
        }
    }

    /// 读取一个元素并转换为像素坐标
    fn read(&self, b: &[u8]) -> Result<i32, ZoneFileError> {
        let wide: i64 = match self {
            NpyDtype::I1 => i8::from_le_bytes([b[0]]) as i64,
            NpyDtype::U1 => b[0] as i64,
            NpyDtype::I2 => i16::from_le_bytes([b[0], b[1]]) as i64,
            NpyDtype::U2 => u16::from_le_bytes([b[0], b[1]]) as i64,
            NpyDtype::I4 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64,
            NpyDtype::U4 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64,
            NpyDtype::I8 => i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]),
            NpyDtype::U8 => {
                let v = u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
                i64::try_from(v).map_err(|_| ZoneFileError::Npy(format!("{} out of range", v)))?
            }
            NpyDtype::F4 => float_to_i64(f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)?,
            NpyDtype::F8 => float_to_i64(f64::from_le_bytes([
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            ]))?,
        };
        i32::try_from(wide).map_err(|_| ZoneFileError::Npy(format!("{} out of range", wide)))
    }
}

fn float_to_i64(v: f64) -> Result<i64, ZoneFileError> {
    if !v.is_finite() {
        return Err(ZoneFileError::Npy(format!("non-finite coordinate {}", v)));
    }
    Ok(v.round() as i64)
}

#[derive(Debug)]
struct NpyHeader {
    dtype: NpyDtype,
    fortran_order: bool,
    shape: Vec<usize>,
}

impl NpyHeader {
    fn parse(header: &str) -> Result<Self, ZoneFileError> {
        let descr_re = Regex::new(r"'descr'\s*:\s*'([<>|=])([iuf])(\d+)'")
            .map_err(|e| ZoneFileError::Npy(e.to_string()))?;
        let order_re = Regex::new(r"'fortran_order'\s*:\s*(True|False)")
            .map_err(|e| ZoneFileError::Npy(e.to_string()))?;
        let shape_re = Regex::new(r"'shape'\s*:\s*\(([^)]*)\)")
            .map_err(|e| ZoneFileError::Npy(e.to_string()))?;

        let descr = descr_re
            .captures(header)
            .ok_or_else(|| ZoneFileError::Npy(format!("unsupported descr in {}", header)))?;
        if &descr[1] == ">" {
            return Err(ZoneFileError::Npy("big-endian data is not supported".into()));
        }
        let dtype = NpyDtype::from_descr(&descr[2], &descr[3])
            .ok_or_else(|| ZoneFileError::Npy(format!("unsupported dtype {}{}", &descr[2], &descr[3])))?;

        let fortran_order = order_re
            .captures(header)
            .map(|c| &c[1] == "True")
            .ok_or_else(|| ZoneFileError::Npy("missing fortran_order".into()))?;

        let shape_src = shape_re
            .captures(header)
            .ok_or_else(|| ZoneFileError::Npy("missing shape".into()))?;
        let shape = shape_src[1]
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.trim_end_matches('L')
                    .parse::<usize>()
                    .map_err(|_| ZoneFileError::Npy(format!("bad shape entry '{}'", s)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            dtype,
            fortran_order,
            shape,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// 按 npy v1.0 格式写出一个 (N, 4) 数组
    fn npy_bytes(descr: &str, rows: usize, data: &[u8]) -> Vec<u8> {
        let mut header = format!(
            "{{'descr': '{}', 'fortran_order': False, 'shape': ({}, 4), }}",
            descr, rows
        );
        // 头部总长度 (含 magic 与长度字段) 对齐到 64 字节, 以换行结尾
        let unpadded = 10 + header.len() + 1;
        let pad = (64 - unpadded % 64) % 64;
        header.push_str(&" ".repeat(pad));
        header.push('\n');

        let mut out = Vec::new();
        out.extend_from_slice(NPY_MAGIC);
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(data);
        out
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_load_npy_int64() {
        let values: [i64; 8] = [620, 1, 915, 562, 1000, 1, 1264, 461];
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "queue_param.npy", &npy_bytes("<i8", 2, &data));

        let zones = load_zone_file(&path).unwrap();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0], Zone::new(620, 1, 915, 562).unwrap());
        assert_eq!(zones[1], Zone::new(1000, 1, 1264, 461).unwrap());
    }

    #[test]
    fn test_load_npy_float_rounds() {
        let values: [f32; 4] = [10.4, 0.0, 99.6, 50.0];
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "zones.npy", &npy_bytes("<f4", 1, &data));

        let zones = load_zone_file(&path).unwrap();
        assert_eq!(zones, vec![Zone::new(10, 0, 100, 50).unwrap()]);
    }

    #[test]
    fn test_npy_wrong_shape_is_rejected() {
        let data: Vec<u8> = [1i32, 2, 3].iter().flat_map(|v| v.to_le_bytes()).collect();
        let mut bytes = npy_bytes("<i4", 1, &data);
        // 把形状改成 (1, 3)
        let pos = bytes.windows(6).position(|w| w == b"(1, 4)").unwrap();
        bytes[pos + 4] = b'3';
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "zones.npy", &bytes);

        assert!(matches!(load_zone_file(&path), Err(ZoneFileError::Npy(_))));
    }

    #[test]
    fn test_npy_huge_shape_is_rejected() {
        let data: Vec<u8> = [1i64, 2, 3, 4].iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = npy_bytes("<i8", 4611686018427387904, &data);
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "zones.npy", &bytes);

        match load_zone_file(&path) {
            Err(ZoneFileError::Npy(msg)) => assert_eq!(msg, "shape too large"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(load_registry(Some(path.as_path())).is_empty());

        // 乘法不溢出但数据区不够
        let path = write_file(&dir, "short.npy", &npy_bytes("<i8", 1 << 40, &data));
        assert!(matches!(load_zone_file(&path), Err(ZoneFileError::Npy(_))));
    }

    #[test]
    fn test_load_json_arrays_and_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "zones.json",
            br#"[[0, 0, 100, 200], {"x_min": 150, "y_min": 0, "x_max": 300, "y_max": 200}]"#,
        );
        let zones = load_zone_file(&path).unwrap();
        assert_eq!(
            zones,
            vec![
                Zone::new(0, 0, 100, 200).unwrap(),
                Zone::new(150, 0, 300, 200).unwrap()
            ]
        );
    }

    #[test]
    fn test_invalid_rect_fails_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "zones.json", b"[[0, 0, 100, 200], [50, 0, 40, 10]]");
        match load_zone_file(&path) {
            Err(ZoneFileError::InvalidZone { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_registry_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.npy");
        assert!(load_registry(Some(missing.as_path())).is_empty());

        let garbage = write_file(&dir, "zones.json", b"not json");
        assert!(load_registry(Some(garbage.as_path())).is_empty());

        let unknown = write_file(&dir, "zones.csv", b"0,0,1,1");
        assert!(load_registry(Some(unknown.as_path())).is_empty());

        assert!(load_registry(None).is_empty());
    }

    #[test]
    fn test_registry_keeps_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "zones.json", b"[[300, 0, 400, 10], [0, 0, 100, 10]]");
        let registry = load_registry(Some(path.as_path()));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(1).map(Zone::x_min), Some(300));
        assert_eq!(registry.get(2).map(Zone::x_min), Some(0));
    }
}

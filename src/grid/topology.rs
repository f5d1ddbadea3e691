//! 宫格拓扑: 槽位分配与行列布局

use super::types::{StreamSource, StreamSpec};
use crate::error::ConfigError;

/// 默认 4x4 宫格
pub const DEFAULT_COLUMNS: usize = 4;
pub const DEFAULT_MAX_SLOTS: usize = 16;

/// 槽位 → (行, 列), 行优先
pub fn placement(slot_index: usize, columns: usize) -> (usize, usize) {
    (slot_index / columns, slot_index % columns)
}

/// 宫格拓扑参数
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridTopology {
    columns: usize,
    max_slots: usize,
}

impl Default for GridTopology {
    fn default() -> Self {
        Self {
            columns: DEFAULT_COLUMNS,
            max_slots: DEFAULT_MAX_SLOTS,
        }
    }
}

impl GridTopology {
    pub fn new(columns: usize, max_slots: usize) -> Result<Self, ConfigError> {
        if columns == 0 || max_slots == 0 {
            return Err(ConfigError::InvalidTopology { columns, max_slots });
        }
        Ok(Self { columns, max_slots })
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    /// 容纳 `max_slots` 所需的行数
    pub fn rows(&self) -> usize {
        self.max_slots.div_ceil(self.columns)
    }

    pub fn placement(&self, slot_index: usize) -> (usize, usize) {
        placement(slot_index, self.columns)
    }

    /// 按配置顺序分配连续槽位 0..N-1
    ///
    /// 数量超过容量时返回 [`ConfigError::TooManySlots`]。
    pub fn assign(&self, cameras: &[(u32, StreamSource)]) -> Result<Vec<StreamSpec>, ConfigError> {
        if cameras.len() > self.max_slots {
            return Err(ConfigError::TooManySlots {
                count: cameras.len(),
                max: self.max_slots,
            });
        }

        cameras
            .iter()
            .enumerate()
            .map(|(slot_index, (camera_id, source))| {
                if matches!(source, StreamSource::Path(p) if p.trim().is_empty()) {
                    return Err(ConfigError::EmptySource { camera: *camera_id });
                }
                Ok(StreamSpec {
                    slot_index,
                    camera_id: *camera_id,
                    source: source.clone(),
                })
            })
            .collect()
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
/// 多宫格监控数据结构定义
/// Data structures for the camera grid

// ========== 视频源 ==========

/// 视频源: 本地设备索引 或 文件/网络地址
///
/// JSON中整数解析为设备索引, 字符串解析为路径/URL。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamSource {
    Device(u32),
    Path(String),
}

impl StreamSource {
    pub fn is_network(&self) -> bool {
        match self {
            StreamSource::Device(_) => false,
            StreamSource::Path(p) => p.contains("://"),
        }
    }
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamSource::Device(index) => write!(f, "device:{}", index),
            StreamSource::Path(path) => f.write_str(path),
        }
    }
}

// ========== 数据结构 ==========

/// 槽位分配 (Supervisor 生成后不可变)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamSpec {
    pub slot_index: usize,
    pub camera_id: u32,
    pub source: StreamSource,
}

/// 归一化后的视频帧 (固定分辨率, RGBA8 行优先)
///
/// 像素数据通过 `Arc` 共享, 采集线程发出后不再持有可变引用。
#[derive(Clone)]
pub struct Frame {
    pub rgba_data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(width: u32, height: u32, rgba_data: Vec<u8>) -> Self {
        debug_assert_eq!(rgba_data.len(), width as usize * height as usize * 4);
        Self {
            rgba_data: Arc::new(rgba_data),
            width,
            height,
        }
    }

    /// 全零黑帧 (离线事件携带)
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(width, height, vec![0u8; width as usize * height as usize * 4])
    }

    pub fn is_blank(&self) -> bool {
        self.rgba_data.iter().all(|&b| b == 0)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba_data.len())
            .finish()
    }
}

/// 采集线程 → 宫格控制器 的消息
///
/// `is_live == false` 表示该路结束, 携带黑帧。
#[derive(Clone, Debug)]
pub struct FrameEvent {
    pub frame: Frame,
    pub slot_index: usize,
    pub camera_id: u32,
    pub is_live: bool,
}

/// 单个槽位的状态 (仅由宫格控制器修改)
#[derive(Clone, Debug, Default)]
pub struct SlotState {
    pub camera_id: Option<u32>,
    pub source: Option<StreamSource>,
    pub is_live: bool,
    pub last_frame: Option<Frame>,
}

impl SlotState {
    pub fn assigned(spec: &StreamSpec) -> Self {
        Self {
            camera_id: Some(spec.camera_id),
            source: Some(spec.source.clone()),
            is_live: false,
            last_frame: None,
        }
    }
}

/// 当前选中 (放大显示) 的槽位
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FocusSelection {
    pub slot_index: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_from_json() {
        let sources: Vec<StreamSource> =
            serde_json::from_str(r#"[0, "videos/t1.mp4", "rtsp://cam/1"]"#).unwrap();
        assert_eq!(sources[0], StreamSource::Device(0));
        assert_eq!(sources[1], StreamSource::Path("videos/t1.mp4".into()));
        assert!(!sources[1].is_network());
        assert!(sources[2].is_network());
        assert_eq!(sources[0].to_string(), "device:0");
    }

    #[test]
    fn test_blank_frame() {
        let frame = Frame::blank(8, 4);
        assert_eq!(frame.rgba_data.len(), 8 * 4 * 4);
        assert!(frame.is_blank());
    }
}

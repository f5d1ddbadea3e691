#![allow(clippy::type_complexity)]
pub mod bus; // 帧总线 (多生产者 → 单消费者)
pub mod config; // JSON配置
pub mod error; // 错误类型
pub mod grid; // 宫格显示系统
pub mod input; // 视频输入系统
pub mod monitor; // 监控墙入口
pub mod supervisor; // 采集线程管理

#[cfg(test)]
mod testing;

pub use crate::bus::{frame_bus, BusCounters, BusPolicy, BusReceiver, FrameBus};
pub use crate::config::{CameraEntry, GridConfig, DEFAULT_CONFIG_PATH};
pub use crate::error::{BusError, CodecError, ConfigError, RuntimeError};
pub use crate::grid::{
    placement, Command, DetailSink, DisplaySink, FocusSelection, Frame, FrameEvent, GridController,
    GridTopology, LivenessClock, SlotState, StreamSource, StreamSpec,
};
pub use crate::input::{Codec, FrameSource, RawFrame, StreamWorker, WorkerSettings};
#[cfg(feature = "ffmpeg")]
pub use crate::input::{list_video_devices, FfmpegCodec, VideoDevice};
pub use crate::monitor::Monitor;
pub use crate::supervisor::Supervisor;

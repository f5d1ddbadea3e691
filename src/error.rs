//! 错误类型定义
//!
//! - [`ConfigError`] : 配置/拓扑错误 (致命, 在任何采集线程启动前返回)
//! - [`CodecError`]  : 单路视频流的打开/解码错误 (非致命, 该路降级为离线)
//! - [`BusError`]    : 帧总线投递错误 (非致命, 丢弃或合并)
//! - [`RuntimeError`]: 启动/关闭阶段的错误
//!
//! 所有错误都提供 `as_label()`, 返回稳定的 snake_case 标签, 便于日志检索。

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// 配置错误 (致命)
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 摄像头数量超过宫格容量
    #[error("{count} cameras configured but the grid only has {max} slots")]
    TooManySlots { count: usize, max: usize },

    /// 宫格拓扑不合法 (列数或容量为0)
    #[error("invalid grid topology: columns={columns}, max_slots={max_slots}")]
    InvalidTopology { columns: usize, max_slots: usize },

    /// 宫格单元分辨率为0或过大
    #[error("invalid tile size {width}x{height} (each side must be 1..={max})")]
    InvalidTileSize { width: u32, height: u32, max: u32 },

    /// 摄像头源为空字符串
    #[error("camera {camera} has an empty source")]
    EmptySource { camera: u32 },

    /// 配置文件读写失败
    #[error("config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 配置文件解析失败
    #[error("config file {path:?} is malformed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::TooManySlots { .. } => "config_too_many_slots",
            ConfigError::InvalidTopology { .. } => "config_invalid_topology",
            ConfigError::InvalidTileSize { .. } => "config_invalid_tile_size",
            ConfigError::EmptySource { .. } => "config_empty_source",
            ConfigError::Io { .. } => "config_io",
            ConfigError::Parse { .. } => "config_parse",
        }
    }
}

/// 解码器错误 (单路非致命)
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// 视频源打开失败
    #[error("failed to open {input}: {reason}")]
    Open { input: String, reason: String },

    /// 解码过程中失败
    #[error("decode failed: {reason}")]
    Decode { reason: String },
}

impl CodecError {
    pub fn open(input: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        CodecError::Open {
            input: input.into(),
            reason: reason.to_string(),
        }
    }

    pub fn decode(reason: impl std::fmt::Display) -> Self {
        CodecError::Decode {
            reason: reason.to_string(),
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            CodecError::Open { .. } => "source_open_failure",
            CodecError::Decode { .. } => "decode_failure",
        }
    }
}

/// 帧总线错误
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// 队列已满, 该帧被丢弃
    #[error("frame bus full, event for slot {slot} dropped")]
    Overflow { slot: usize },

    /// 槽位号超出总线范围
    #[error("slot {slot} is not served by this bus")]
    UnknownSlot { slot: usize },

    /// 消费者已退出
    #[error("frame bus closed")]
    Closed,
}

impl BusError {
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::Overflow { .. } => "bus_overflow",
            BusError::UnknownSlot { .. } => "bus_unknown_slot",
            BusError::Closed => "bus_closed",
        }
    }
}

/// 运行时错误
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// 关闭超时: 部分采集线程仍阻塞在解码器内部, 已分离
    #[error("shutdown grace {grace:?} exceeded; stuck slots: {stuck:?}")]
    GraceExceeded { grace: Duration, stuck: Vec<usize> },

    /// 宫格控制线程异常退出
    #[error("grid controller thread panicked")]
    ControllerPanicked,

    /// 线程创建失败
    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// 启动前的配置错误
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RuntimeError {
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::ControllerPanicked => "runtime_controller_panicked",
            RuntimeError::Spawn { .. } => "runtime_spawn",
            RuntimeError::Config(err) => err.as_label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        let err = ConfigError::TooManySlots { count: 17, max: 16 };
        assert_eq!(err.as_label(), "config_too_many_slots");
        assert_eq!(
            err.to_string(),
            "17 cameras configured but the grid only has 16 slots"
        );

        assert_eq!(CodecError::open("a.mp4", "missing").as_label(), "source_open_failure");
        assert_eq!(CodecError::decode("boom").as_label(), "decode_failure");
        assert_eq!(BusError::Overflow { slot: 3 }.as_label(), "bus_overflow");
        assert_eq!(BusError::Closed.to_string(), "frame bus closed");

        let err: RuntimeError = ConfigError::InvalidTopology { columns: 0, max_slots: 16 }.into();
        assert_eq!(err.as_label(), "config_invalid_topology");
    }
}

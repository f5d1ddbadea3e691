/// 视频输入系统 (Video Input System)
///
/// 每路视频一个独立采集线程, 负责解码, 归一化与投递
/// - Codec: 解码器抽象 (打开/读帧/关闭)
/// - FfmpegCodec: FFmpeg 实现 (本地摄像头 + 文件 + 网络流)
/// - FrameNormalizer: 缩放到宫格单元分辨率
/// - StreamWorker: 采集线程主循环
pub mod codec;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod resize;
pub mod worker;

pub use codec::{Codec, FrameSource, RawFrame, SourceGuard};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{list_video_devices, FfmpegCodec, VideoDevice};
pub use resize::FrameNormalizer;
pub use worker::{StreamWorker, WorkerExit, WorkerReport, WorkerSettings};

/// 解码器抽象 (Codec abstraction)
///
/// 采集线程只依赖这里的接口: 打开视频源, 逐帧读取原始图像, 关闭。
/// FFmpeg 实现见 [`super::ffmpeg`], 测试中使用脚本化的假解码器。
use crate::error::CodecError;
use crate::grid::types::StreamSource;

/// 解码器输出的原始帧 (任意分辨率, RGBA8)
#[derive(Clone, Debug)]
pub struct RawFrame {
    pub rgba_data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// 已打开的视频流句柄
pub trait FrameSource: Send {
    /// 读取下一帧; `Ok(None)` 表示流结束
    fn read_frame(&mut self) -> Result<Option<RawFrame>, CodecError>;

    /// 释放底层资源, 可重复调用
    fn close(&mut self) {}
}

/// 解码器: 按视频源打开句柄
pub trait Codec: Send + Sync {
    fn open(&self, source: &StreamSource) -> Result<Box<dyn FrameSource>, CodecError>;
}

/// 作用域句柄: 任何退出路径 (包括 panic 展开) 都会关闭底层视频流
pub struct SourceGuard {
    inner: Box<dyn FrameSource>,
    closed: bool,
}

impl SourceGuard {
    pub fn new(inner: Box<dyn FrameSource>) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    pub fn read_frame(&mut self) -> Result<Option<RawFrame>, CodecError> {
        self.inner.read_frame()
    }

    pub fn close(mut self) {
        self.close_inner();
    }

    fn close_inner(&mut self) {
        if !self.closed {
            self.closed = true;
            self.inner.close();
        }
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.close_inner();
    }
}

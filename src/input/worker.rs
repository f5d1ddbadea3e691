//! 采集线程 (StreamWorker)
//!
//! 每路视频一个独立线程: 打开解码句柄 → 循环读帧 → 归一化 → 投递到帧总线。
//! 无论正常结束, 打开失败, 解码失败还是被关闭, 退出前都恰好投递一条
//! `is_live = false` 的黑帧事件, 之后再释放解码句柄。

use super::codec::{Codec, SourceGuard};
use super::resize::FrameNormalizer;
use crate::bus::FrameBus;
use crate::error::{BusError, CodecError, ConfigError};
use crate::grid::types::{Frame, FrameEvent, StreamSpec};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 默认宫格单元分辨率 (1920/2 x 1080/2)
pub const DEFAULT_TILE_WIDTH: u32 = 960;
pub const DEFAULT_TILE_HEIGHT: u32 = 540;
/// 默认读帧间隔
pub const DEFAULT_CAPTURE_DELAY: Duration = Duration::from_millis(80);
/// 宫格单元单边最大像素
pub const MAX_TILE_DIMENSION: u32 = 4096;

#[derive(Clone, Copy, Debug)]
pub struct WorkerSettings {
    pub tile_width: u32,
    pub tile_height: u32,
    pub capture_delay: Duration,
}

impl WorkerSettings {
    /// 宫格单元分辨率必须在 1..=MAX_TILE_DIMENSION 之间
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid = |side: u32| (1..=MAX_TILE_DIMENSION).contains(&side);
        if valid(self.tile_width) && valid(self.tile_height) {
            Ok(())
        } else {
            Err(ConfigError::InvalidTileSize {
                width: self.tile_width,
                height: self.tile_height,
                max: MAX_TILE_DIMENSION,
            })
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            tile_width: DEFAULT_TILE_WIDTH,
            tile_height: DEFAULT_TILE_HEIGHT,
            capture_delay: DEFAULT_CAPTURE_DELAY,
        }
    }
}

/// 退出原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    EndOfStream,
    OpenFailed(CodecError),
    DecodeFailed(CodecError),
    Stopped,
    BusClosed,
}

/// 采集线程运行统计
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub slot_index: usize,
    pub generation: u64,
    pub frames: u64,
    pub dropped: u64,
    pub exit: WorkerExit,
}

pub struct StreamWorker {
    spec: StreamSpec,
    generation: u64,
    codec: Arc<dyn Codec>,
    bus: FrameBus,
    settings: WorkerSettings,
    stop: Receiver<()>,
}

impl StreamWorker {
    /// `stop` 通道的发送端被丢弃即表示关闭
    pub fn new(
        spec: StreamSpec,
        generation: u64,
        codec: Arc<dyn Codec>,
        bus: FrameBus,
        settings: WorkerSettings,
        stop: Receiver<()>,
    ) -> Self {
        Self {
            spec,
            generation,
            codec,
            bus,
            settings,
            stop,
        }
    }

    pub fn run(self) -> WorkerReport {
        let slot = self.spec.slot_index;
        let camera = self.spec.camera_id;
        info!(
            slot,
            camera,
            generation = self.generation,
            source = %self.spec.source,
            "🎬 采集线程启动"
        );

        let mut report = WorkerReport {
            slot_index: slot,
            generation: self.generation,
            frames: 0,
            dropped: 0,
            exit: WorkerExit::EndOfStream,
        };

        // 分辨率不合法时不打开视频源, 用空帧通知离线
        if let Err(err) = self.settings.validate() {
            warn!(slot, camera, error = %err, label = err.as_label(), "❌ 宫格单元分辨率无效");
            TerminalEvent::new(&self.bus, &self.spec, Frame::blank(0, 0)).emit();
            report.exit = WorkerExit::OpenFailed(CodecError::open(self.spec.source.to_string(), err));
            return report;
        }

        let mut normalizer = FrameNormalizer::new(self.settings.tile_width, self.settings.tile_height);
        let mut terminal = TerminalEvent::new(&self.bus, &self.spec, normalizer.blank());

        let exit = match self.codec.open(&self.spec.source) {
            Ok(handle) => {
                let mut source = SourceGuard::new(handle);
                info!(slot, camera, "✅ 视频源已打开");
                let exit = self.pump(&mut source, &mut normalizer, &mut report);
                terminal.emit();
                source.close();
                exit
            }
            Err(err) => {
                warn!(slot, camera, error = %err, label = err.as_label(), "❌ 视频源打开失败");
                terminal.emit();
                WorkerExit::OpenFailed(err)
            }
        };
        report.exit = exit;

        match &report.exit {
            WorkerExit::DecodeFailed(err) => {
                warn!(slot, camera, error = %err, frames = report.frames, "⚠️ 解码失败, 该路离线")
            }
            exit => info!(
                slot,
                camera,
                frames = report.frames,
                dropped = report.dropped,
                exit = ?exit,
                "❌ 采集线程退出"
            ),
        }
        report
    }

    /// 读帧主循环, 返回退出原因
    fn pump(
        &self,
        source: &mut SourceGuard,
        normalizer: &mut FrameNormalizer,
        report: &mut WorkerReport,
    ) -> WorkerExit {
        let slot = self.spec.slot_index;
        let mut count = 0u64;
        let mut last = Instant::now();

        loop {
            if self.stop_requested() {
                return WorkerExit::Stopped;
            }

            let raw = match source.read_frame() {
                Ok(Some(raw)) => raw,
                Ok(None) => return WorkerExit::EndOfStream,
                Err(err) => return WorkerExit::DecodeFailed(err),
            };

            let frame = match normalizer.normalize(raw) {
                Ok(frame) => frame,
                Err(err) => return WorkerExit::DecodeFailed(err),
            };

            match self.bus.post(FrameEvent {
                frame,
                slot_index: slot,
                camera_id: self.spec.camera_id,
                is_live: true,
            }) {
                Ok(()) => report.frames += 1,
                Err(BusError::Overflow { .. }) => report.dropped += 1,
                Err(err) => {
                    debug!(slot, error = %err, "帧总线不可用, 停止采集");
                    return WorkerExit::BusClosed;
                }
            }

            // 每秒打印一次采集统计
            count += 1;
            if last.elapsed().as_secs_f64() >= 1.0 {
                let fps = count as f64 / last.elapsed().as_secs_f64();
                debug!(
                    slot,
                    fps = format_args!("{:.1}", fps),
                    total = report.frames,
                    dropped = report.dropped,
                    "📺 采集统计"
                );
                last = Instant::now();
                count = 0;
            }

            if self.pace() {
                return WorkerExit::Stopped;
            }
        }
    }

    fn stop_requested(&self) -> bool {
        !matches!(self.stop.try_recv(), Err(TryRecvError::Empty))
    }

    /// 读帧间隔, 期间收到关闭信号返回 true
    fn pace(&self) -> bool {
        if self.settings.capture_delay.is_zero() {
            return self.stop_requested();
        }
        !matches!(
            self.stop.recv_timeout(self.settings.capture_delay),
            Err(RecvTimeoutError::Timeout)
        )
    }
}

/// 离线事件: 显式 `emit()`; 若线程 panic 展开, 在 Drop 中补发
struct TerminalEvent<'a> {
    bus: &'a FrameBus,
    spec: &'a StreamSpec,
    blank: Option<Frame>,
}

impl<'a> TerminalEvent<'a> {
    fn new(bus: &'a FrameBus, spec: &'a StreamSpec, blank: Frame) -> Self {
        Self {
            bus,
            spec,
            blank: Some(blank),
        }
    }

    fn emit(&mut self) {
        let Some(frame) = self.blank.take() else {
            return;
        };
        let event = FrameEvent {
            frame,
            slot_index: self.spec.slot_index,
            camera_id: self.spec.camera_id,
            is_live: false,
        };
        if let Err(err) = self.bus.post(event) {
            debug!(slot = self.spec.slot_index, error = %err, "离线事件未送达");
        }
    }
}

impl Drop for TerminalEvent<'_> {
    fn drop(&mut self) {
        self.emit();
    }
}

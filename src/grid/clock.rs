//! 离线槽位时钟 (LivenessClock)
//!
//! 定时向所有离线槽位绘制 "摄像头编号 + 时间 + 日期" 占位文字。
//! 节拍通过 `crossbeam_channel::tick` 投递到宫格控制器的事件循环里执行,
//! 与帧事件共用同一个串行上下文, 因此不会覆盖在线槽位。

use super::sink::DisplaySink;
use super::types::SlotState;
use chrono::{DateTime, Local};
use crossbeam_channel::Receiver;
use std::time::{Duration, Instant};

pub const DEFAULT_CLOCK_INTERVAL: Duration = Duration::from_millis(1000);

/// 离线占位文字
pub fn placeholder_text(camera_id: Option<u32>, now: &DateTime<Local>) -> String {
    format!(
        "{}\n{}\n{}",
        camera_label(camera_id),
        now.format("%H:%M:%S"),
        now.format("%a, %B %-d")
    )
}

/// 放大窗口选中离线槽位时的提示
pub fn inactive_detail_text(camera_id: Option<u32>) -> String {
    format!("{}\nnot active!", camera_label(camera_id))
}

fn camera_label(camera_id: Option<u32>) -> String {
    match camera_id {
        Some(id) => format!("Camera {}", id),
        None => "Camera -".to_string(),
    }
}

pub struct LivenessClock {
    interval: Duration,
    ticker: Receiver<Instant>,
}

impl LivenessClock {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ticker: crossbeam_channel::tick(interval),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 节拍通道, 供控制器 `select!`
    pub fn ticker(&self) -> &Receiver<Instant> {
        &self.ticker
    }

    /// 为所有离线槽位绘制占位文字, 返回绘制数量
    pub fn render<D: DisplaySink + ?Sized>(
        slots: &[SlotState],
        sink: &mut D,
        now: &DateTime<Local>,
    ) -> usize {
        let mut rendered = 0;
        for (slot_index, slot) in slots.iter().enumerate() {
            if slot.is_live {
                continue;
            }
            sink.render_placeholder(slot_index, &placeholder_text(slot.camera_id, now));
            rendered += 1;
        }
        rendered
    }
}

impl Default for LivenessClock {
    fn default() -> Self {
        Self::new(DEFAULT_CLOCK_INTERVAL)
    }
}

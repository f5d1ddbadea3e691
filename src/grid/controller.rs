//! 宫格控制器 (GridController)
//!
//! 唯一的消费者, 也是槽位状态的唯一写入者。帧事件, 界面命令和时钟节拍
//! 都在同一个线程的 `select!` 循环中串行处理, 因此槽位状态不需要加锁。

use super::clock::{inactive_detail_text, LivenessClock};
use super::sink::{DetailSink, DisplaySink};
use super::types::{FocusSelection, FrameEvent, SlotState, StreamSpec};
use crate::bus::{BusReceiver, Envelope};
use chrono::{DateTime, Local};
use crossbeam_channel::{never, select, Receiver};
use tracing::{debug, info, trace, warn};

/// 界面 → 控制器 的命令
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// 放大显示某个槽位, `None` 取消
    Focus(Option<usize>),
    Shutdown,
}

/// 事件循环单步结果
enum Step {
    Continue,
    BusClosed,
    CommandsClosed,
    Shutdown,
}

pub struct GridController {
    slots: Vec<SlotState>,
    focus: FocusSelection,
    display: Box<dyn DisplaySink>,
    detail: Option<Box<dyn DetailSink>>,
    applied: u64,
}

impl GridController {
    pub fn new(
        specs: &[StreamSpec],
        display: Box<dyn DisplaySink>,
        detail: Option<Box<dyn DetailSink>>,
    ) -> Self {
        let mut slots = vec![SlotState::default(); specs.len()];
        for spec in specs {
            if let Some(slot) = slots.get_mut(spec.slot_index) {
                *slot = SlotState::assigned(spec);
            }
        }
        Self {
            slots,
            focus: FocusSelection::default(),
            display,
            detail,
            applied: 0,
        }
    }

    pub fn slots(&self) -> &[SlotState] {
        &self.slots
    }

    pub fn focus(&self) -> FocusSelection {
        self.focus
    }

    /// 已处理的帧事件数
    pub fn applied(&self) -> u64 {
        self.applied
    }

    /// 处理一条帧事件
    pub fn apply(&mut self, event: FrameEvent) {
        let slot_index = event.slot_index;
        let Some(slot) = self.slots.get_mut(slot_index) else {
            warn!(slot = slot_index, "未知槽位的帧事件, 已忽略");
            return;
        };
        self.applied += 1;

        if slot.is_live != event.is_live {
            info!(
                slot = slot_index,
                camera = event.camera_id,
                live = event.is_live,
                "{}",
                if event.is_live { "🟢 槽位上线" } else { "⚫ 槽位离线" }
            );
        }
        slot.is_live = event.is_live;
        slot.last_frame = event.is_live.then(|| event.frame.clone());
        trace!(slot = slot_index, live = event.is_live, "apply");

        // 离线时清空画面, 之后由时钟绘制占位文字
        if event.is_live {
            self.display.render(slot_index, &event.frame);
        } else {
            self.display.clear(slot_index, &event.frame);
        }

        if self.focus.slot_index == Some(slot_index) {
            if let Some(detail) = self.detail.as_mut() {
                if event.is_live {
                    detail.render_detail(&event.frame);
                } else {
                    detail.clear_detail(&event.frame);
                }
            }
        }
    }

    /// 切换放大槽位
    pub fn set_focus(&mut self, slot_index: Option<usize>) {
        let Some(index) = slot_index else {
            debug!("取消放大");
            self.focus = FocusSelection::default();
            return;
        };
        let Some(slot) = self.slots.get(index) else {
            warn!(slot = index, slots = self.slots.len(), "放大槽位越界, 已忽略");
            return;
        };

        self.focus = FocusSelection {
            slot_index: Some(index),
        };
        debug!(slot = index, camera = ?slot.camera_id, live = slot.is_live, "🔍 放大槽位");

        let Some(detail) = self.detail.as_mut() else {
            return;
        };
        match (&slot.last_frame, slot.is_live) {
            (Some(frame), true) => detail.render_detail(frame),
            _ => detail.render_detail_placeholder(&inactive_detail_text(slot.camera_id)),
        }
    }

    /// 时钟节拍: 刷新所有离线槽位的占位文字
    pub fn on_tick(&mut self, now: &DateTime<Local>) -> usize {
        LivenessClock::render(&self.slots, self.display.as_mut(), now)
    }

    /// 控制器事件循环, 返回最终槽位状态
    ///
    /// 收到 `Shutdown` 时先处理总线上已到达的事件再退出;
    /// 总线与命令通道都断开时也会退出。
    pub fn run(mut self, bus: BusReceiver, commands: Receiver<Command>, clock: LivenessClock) -> Vec<SlotState> {
        info!(slots = self.slots.len(), interval = ?clock.interval(), "🖥️ 宫格控制器启动");
        self.on_tick(&Local::now());

        let mut events: Receiver<Envelope> = bus.channel().clone();
        let mut commands = commands;
        let mut events_open = true;
        let mut commands_open = true;

        while events_open || commands_open {
            let step = select! {
                recv(events) -> msg => match msg {
                    Ok(envelope) => {
                        if let Some(event) = bus.resolve(envelope) {
                            self.apply(event);
                        }
                        Step::Continue
                    }
                    Err(_) => Step::BusClosed,
                },
                recv(commands) -> cmd => match cmd {
                    Ok(Command::Focus(slot)) => {
                        self.set_focus(slot);
                        Step::Continue
                    }
                    Ok(Command::Shutdown) => Step::Shutdown,
                    Err(_) => Step::CommandsClosed,
                },
                recv(clock.ticker()) -> _ => {
                    self.on_tick(&Local::now());
                    Step::Continue
                }
            };

            match step {
                Step::Continue => {}
                Step::BusClosed => {
                    debug!("帧总线已断开");
                    events = never();
                    events_open = false;
                }
                Step::CommandsClosed => {
                    debug!("命令通道已断开");
                    commands = never();
                    commands_open = false;
                }
                Step::Shutdown => {
                    for event in bus.drain() {
                        self.apply(event);
                    }
                    break;
                }
            }
        }

        info!(applied = self.applied, counters = ?bus.counters(), "❌ 宫格控制器退出");
        self.slots
    }
}

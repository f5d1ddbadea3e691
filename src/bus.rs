//! 帧总线 (FrameBus): 多生产者 → 单消费者
//!
//! 所有采集线程通过 [`FrameBus::post`] 投递 [`FrameEvent`], 宫格控制器持有唯一的
//! [`BusReceiver`]。同一采集线程的事件保持发送顺序, 不同线程之间不保证顺序。
//!
//! 两种背压策略:
//! - `Coalesce` (默认): 每个槽位一个待取信箱, 新事件覆盖未被取走的旧事件。
//!   唤醒队列容量等于槽位数, 每个槽位最多一条唤醒, 永远不会满。
//! - `Queue`: 有界FIFO。在线帧 `try_send`, 满则丢弃并返回 [`BusError::Overflow`];
//!   离线事件阻塞发送, 保证不丢失 (消费者从不阻塞在生产者上, 不会死锁)。

use crate::error::BusError;
use crate::grid::types::FrameEvent;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 背压策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum BusPolicy {
    /// 每槽位只保留最新一条
    #[default]
    Coalesce,
    /// 有界队列, 容量至少为槽位数
    Queue { capacity: usize },
}

/// 总线计数快照
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BusCounters {
    pub posted: u64,
    pub coalesced: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct BusStats {
    posted: AtomicU64,
    coalesced: AtomicU64,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl BusStats {
    fn snapshot(&self) -> BusCounters {
        BusCounters {
            posted: self.posted.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

enum Inner {
    /// 合并模式: 槽位有新事件
    Wake(usize),
    /// 队列模式: 事件本体
    Event(FrameEvent),
}

/// 总线上传递的信封, 交给 [`BusReceiver::resolve`] 取出事件
pub struct Envelope(Inner);

type Mailbox = Mutex<Vec<Option<FrameEvent>>>;

/// 创建帧总线
pub fn frame_bus(slots: usize, policy: BusPolicy) -> (FrameBus, BusReceiver) {
    let stats = Arc::new(BusStats::default());
    let (tx, rx, mailbox) = match policy {
        BusPolicy::Coalesce => {
            let (tx, rx) = crossbeam_channel::bounded(slots.max(1));
            let mailbox: Arc<Mailbox> = Arc::new(Mutex::new(vec![None; slots]));
            (tx, rx, Some(mailbox))
        }
        BusPolicy::Queue { capacity } => {
            let (tx, rx) = crossbeam_channel::bounded(capacity.max(slots).max(1));
            (tx, rx, None)
        }
    };

    (
        FrameBus {
            tx,
            mailbox: mailbox.clone(),
            slots,
            stats: stats.clone(),
        },
        BusReceiver { rx, mailbox, stats },
    )
}

/// 生产者句柄 (可克隆, 每个采集线程一份)
#[derive(Clone)]
pub struct FrameBus {
    tx: Sender<Envelope>,
    mailbox: Option<Arc<Mailbox>>,
    slots: usize,
    stats: Arc<BusStats>,
}

impl FrameBus {
    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn counters(&self) -> BusCounters {
        self.stats.snapshot()
    }

    /// 投递事件, 不会无限期阻塞在线帧
    pub fn post(&self, event: FrameEvent) -> Result<(), BusError> {
        let slot = event.slot_index;
        if slot >= self.slots {
            return Err(BusError::UnknownSlot { slot });
        }
        if self.stats.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }

        match &self.mailbox {
            Some(mailbox) => self.post_coalesced(mailbox, event),
            None => self.post_queued(event),
        }
    }

    fn post_coalesced(&self, mailbox: &Mailbox, event: FrameEvent) -> Result<(), BusError> {
        let slot = event.slot_index;
        let previous = mailbox.lock()[slot].replace(event);
        self.stats.posted.fetch_add(1, Ordering::Relaxed);

        if previous.is_some() {
            // 旧事件尚未被取走, 唤醒已在队列中
            self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        match self.tx.try_send(Envelope(Inner::Wake(slot))) {
            // 队列满意味着每个槽位(包括本槽位)都已有一条唤醒在排队
            Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
            Err(TrySendError::Disconnected(_)) => Err(BusError::Closed),
        }
    }

    fn post_queued(&self, event: FrameEvent) -> Result<(), BusError> {
        let slot = event.slot_index;
        if !event.is_live {
            // 离线事件必须送达
            return match self.tx.send(Envelope(Inner::Event(event))) {
                Ok(()) => {
                    self.stats.posted.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
                Err(_) => Err(BusError::Closed),
            };
        }

        match self.tx.try_send(Envelope(Inner::Event(event))) {
            Ok(()) => {
                self.stats.posted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(BusError::Overflow { slot })
            }
            Err(TrySendError::Disconnected(_)) => Err(BusError::Closed),
        }
    }
}

/// 消费者句柄 (唯一, 由宫格控制器持有)
pub struct BusReceiver {
    rx: Receiver<Envelope>,
    mailbox: Option<Arc<Mailbox>>,
    stats: Arc<BusStats>,
}

impl BusReceiver {
    /// 底层通道, 供 `select!` 使用
    pub fn channel(&self) -> &Receiver<Envelope> {
        &self.rx
    }

    /// 从信封中取出事件; 合并模式下信箱可能已被取空
    pub fn resolve(&self, envelope: Envelope) -> Option<FrameEvent> {
        match envelope.0 {
            Inner::Event(event) => Some(event),
            Inner::Wake(slot) => self
                .mailbox
                .as_ref()
                .and_then(|mailbox| mailbox.lock()[slot].take()),
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<FrameEvent>, RecvTimeoutError> {
        self.rx
            .recv_timeout(timeout)
            .map(|envelope| self.resolve(envelope))
    }

    /// 取出当前所有已到达的事件 (不阻塞)
    pub fn drain(&self) -> Vec<FrameEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(envelope) => events.extend(self.resolve(envelope)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    pub fn counters(&self) -> BusCounters {
        self.stats.snapshot()
    }
}

impl Drop for BusReceiver {
    fn drop(&mut self) {
        self.stats.closed.store(true, Ordering::Release);
    }
}

//! 采集线程管理 (Supervisor)
//!
//! 持有槽位分配表, 为每个槽位启动采集线程, 负责刷新与关闭。
//! 每个槽位同一时间最多一个采集线程; 每次启动递增该槽位的代数 (generation)。

use crate::bus::FrameBus;
use crate::error::RuntimeError;
use crate::grid::types::StreamSpec;
use crate::input::codec::Codec;
use crate::input::worker::{StreamWorker, WorkerReport, WorkerSettings};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 单个槽位的线程记录
#[derive(Default)]
struct SlotWorker {
    handle: Option<JoinHandle<WorkerReport>>,
    generation: u64,
}

impl SlotWorker {
    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

pub struct Supervisor {
    specs: Vec<StreamSpec>,
    codec: Arc<dyn Codec>,
    bus: FrameBus,
    settings: WorkerSettings,
    stop_tx: Option<Sender<()>>,
    stop_rx: Receiver<()>,
    workers: Vec<SlotWorker>,
}

impl Supervisor {
    /// 不会启动任何线程, 调用 [`Supervisor::refresh`] 启动
    pub fn new(
        specs: Vec<StreamSpec>,
        codec: Arc<dyn Codec>,
        bus: FrameBus,
        settings: WorkerSettings,
    ) -> Self {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        let workers = specs.iter().map(|_| SlotWorker::default()).collect();
        Self {
            specs,
            codec,
            bus,
            settings,
            stop_tx: Some(stop_tx),
            stop_rx,
            workers,
        }
    }

    pub fn specs(&self) -> &[StreamSpec] {
        &self.specs
    }

    /// 槽位当前代数, 从未启动为 0
    pub fn generation(&self, slot_index: usize) -> Option<u64> {
        self.workers.get(slot_index).map(|w| w.generation)
    }

    /// 仍在运行的槽位
    pub fn running(&self) -> Vec<usize> {
        self.workers
            .iter()
            .enumerate()
            .filter(|(_, w)| w.is_running())
            .map(|(slot, _)| slot)
            .collect()
    }

    /// (重新) 启动采集线程: 只为没有线程或线程已结束的槽位启动
    ///
    /// 返回本次启动的线程数。关闭之后调用不会启动任何线程。
    pub fn refresh(&mut self) -> usize {
        if self.stop_tx.is_none() {
            warn!("已关闭, 忽略刷新");
            return 0;
        }

        let mut started = 0;
        for (spec, worker) in self.specs.iter().zip(self.workers.iter_mut()) {
            if worker.is_running() {
                continue;
            }
            if let Some(handle) = worker.handle.take() {
                log_exit(spec.slot_index, handle.join());
            }

            let generation = worker.generation + 1;
            let stream = StreamWorker::new(
                spec.clone(),
                generation,
                self.codec.clone(),
                self.bus.clone(),
                self.settings,
                self.stop_rx.clone(),
            );
            match thread::Builder::new()
                .name(format!("stream-{}", spec.slot_index))
                .spawn(move || stream.run())
            {
                Ok(handle) => {
                    worker.handle = Some(handle);
                    worker.generation = generation;
                    started += 1;
                    debug!(slot = spec.slot_index, camera = spec.camera_id, generation, "采集线程已启动");
                }
                Err(err) => {
                    warn!(slot = spec.slot_index, error = %err, "❌ 采集线程创建失败");
                }
            }
        }

        if started > 0 {
            info!(started, slots = self.specs.len(), "🔄 刷新采集线程");
        }
        started
    }

    /// 通知所有采集线程退出, 最多等待 `grace`
    ///
    /// 超时仍阻塞在解码器内部的线程被分离 (不会强杀), 以
    /// [`RuntimeError::GraceExceeded`] 报告其槽位。
    pub fn shutdown(&mut self, grace: Duration) -> Result<(), RuntimeError> {
        if self.stop_tx.take().is_some() {
            info!(grace = ?grace, "🛑 通知采集线程退出");
        }

        let deadline = Instant::now() + grace;
        while !self.running().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        let mut stuck = Vec::new();
        for (slot, worker) in self.workers.iter_mut().enumerate() {
            let Some(handle) = worker.handle.take() else {
                continue;
            };
            if handle.is_finished() {
                log_exit(slot, handle.join());
            } else {
                warn!(slot, generation = worker.generation, "⚠️ 采集线程未在期限内退出, 已分离");
                stuck.push(slot);
            }
        }

        if stuck.is_empty() {
            Ok(())
        } else {
            Err(RuntimeError::GraceExceeded { grace, stuck })
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // 只发出信号, 不等待
        self.stop_tx.take();
    }
}

fn log_exit(slot: usize, result: thread::Result<WorkerReport>) {
    match result {
        Ok(report) => debug!(
            slot,
            generation = report.generation,
            frames = report.frames,
            exit = ?report.exit,
            "采集线程已回收"
        ),
        Err(_) => warn!(slot, "❌ 采集线程 panic"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{frame_bus, BusPolicy};
    use crate::grid::types::StreamSource;
    use crate::testing::{solid_frame, wait_until, Script, ScriptedCodec};

    fn settings() -> WorkerSettings {
        WorkerSettings {
            tile_width: 8,
            tile_height: 4,
            capture_delay: Duration::from_millis(1),
        }
    }

    fn spec(slot: usize, source: &StreamSource) -> StreamSpec {
        StreamSpec {
            slot_index: slot,
            camera_id: slot as u32 + 1,
            source: source.clone(),
        }
    }

    #[test]
    fn test_refresh_skips_running_and_restarts_finished() {
        let source = StreamSource::Path("live".into());
        let (frames_tx, frames_rx) = crossbeam_channel::unbounded();
        let codec = Arc::new(ScriptedCodec::new().with(&source, Script::Gated(frames_rx)));
        let (bus, rx) = frame_bus(1, BusPolicy::Queue { capacity: 16 });
        let mut sup = Supervisor::new(vec![spec(0, &source)], codec.clone(), bus, settings());

        assert_eq!(sup.generation(0), Some(0));
        assert_eq!(sup.refresh(), 1);
        frames_tx.send(solid_frame(1, 8, 4)).unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap().is_live);

        // 线程仍在运行
        assert_eq!(sup.refresh(), 0);
        assert_eq!(sup.generation(0), Some(1));
        assert_eq!(codec.opened(), 1);

        // 结束该路
        drop(frames_tx);
        let last = rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap();
        assert!(!last.is_live);
        assert!(wait_until(Duration::from_secs(2), || sup.running().is_empty()));

        assert_eq!(sup.refresh(), 1);
        assert_eq!(sup.generation(0), Some(2));
        assert!(sup.shutdown(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn test_shutdown_stops_all_workers() {
        let sources: Vec<StreamSource> = (0..3).map(|i| StreamSource::Path(format!("s{}", i))).collect();
        let mut codec = ScriptedCodec::new();
        for source in &sources {
            codec = codec.with(
                source,
                Script::Frames {
                    count: usize::MAX,
                    width: 8,
                    height: 4,
                },
            );
        }
        let codec = Arc::new(codec);
        let (bus, _rx) = frame_bus(3, BusPolicy::Coalesce);
        let specs = sources.iter().enumerate().map(|(i, s)| spec(i, s)).collect();
        let mut sup = Supervisor::new(specs, codec.clone(), bus, settings());

        assert_eq!(sup.refresh(), 3);
        assert!(sup.shutdown(Duration::from_secs(5)).is_ok());
        assert!(sup.running().is_empty());
        assert_eq!(codec.closed(), 3);

        // 关闭后不再启动
        assert_eq!(sup.refresh(), 0);
    }

    #[test]
    fn test_shutdown_reports_stuck_worker() {
        let source = StreamSource::Path("stuck".into());
        let (frames_tx, frames_rx) = crossbeam_channel::unbounded::<crate::input::RawFrame>();
        let codec = Arc::new(ScriptedCodec::new().with(&source, Script::Gated(frames_rx)));
        let (bus, _rx) = frame_bus(1, BusPolicy::Coalesce);
        let mut sup = Supervisor::new(vec![spec(0, &source)], codec.clone(), bus, settings());
        sup.refresh();
        assert!(wait_until(Duration::from_secs(2), || codec.opened() == 1));

        // 采集线程阻塞在读帧中, 看不到关闭信号
        match sup.shutdown(Duration::from_millis(50)) {
            Err(RuntimeError::GraceExceeded { stuck, .. }) => assert_eq!(stuck, vec![0]),
            other => panic!("unexpected {:?}", other),
        }
        drop(frames_tx);
        assert!(wait_until(Duration::from_secs(2), || codec.closed() == 1));
    }
}

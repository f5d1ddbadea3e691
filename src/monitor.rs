//! 监控墙 (Monitor)
//!
//! 组装帧总线, 宫格控制器 (独立线程), 离线时钟与采集线程管理,
//! 对界面只暴露 `focus` / `refresh` / `shutdown`。

use crate::bus::{frame_bus, BusCounters, FrameBus};
use crate::config::GridConfig;
use crate::error::RuntimeError;
use crate::grid::clock::LivenessClock;
use crate::grid::controller::{Command, GridController};
use crate::grid::sink::{DetailSink, DisplaySink};
use crate::grid::topology::GridTopology;
use crate::grid::types::{SlotState, StreamSpec};
use crate::input::codec::Codec;
use crate::supervisor::Supervisor;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct Monitor {
    supervisor: Supervisor,
    bus: FrameBus,
    commands: Sender<Command>,
    controller: Option<JoinHandle<Vec<SlotState>>>,
    topology: GridTopology,
    grace: Duration,
}

impl Monitor {
    /// 校验配置, 启动宫格控制器与所有采集线程
    ///
    /// 配置错误在任何线程启动前返回。
    pub fn start(
        config: &GridConfig,
        codec: Arc<dyn Codec>,
        display: Box<dyn DisplaySink>,
        detail: Option<Box<dyn DetailSink>>,
    ) -> Result<Self, RuntimeError> {
        let topology = config.topology()?;
        let specs = config.stream_specs()?;
        let settings = config.worker_settings()?;

        let (bus, receiver) = frame_bus(specs.len(), config.bus);
        let (commands, command_rx) = crossbeam_channel::unbounded();
        let clock = LivenessClock::new(config.clock_interval());
        let controller = GridController::new(&specs, display, detail);

        let handle = thread::Builder::new()
            .name("grid-controller".into())
            .spawn(move || controller.run(receiver, command_rx, clock))
            .map_err(|source| RuntimeError::Spawn {
                name: "grid-controller".into(),
                source,
            })?;

        let mut supervisor = Supervisor::new(specs, codec, bus.clone(), settings);
        let started = supervisor.refresh();
        info!(
            cameras = supervisor.specs().len(),
            started,
            columns = topology.columns(),
            rows = topology.rows(),
            policy = ?config.bus,
            "🚀 监控墙已启动"
        );

        Ok(Self {
            supervisor,
            bus,
            commands,
            controller: Some(handle),
            topology,
            grace: config.shutdown_grace(),
        })
    }

    pub fn topology(&self) -> GridTopology {
        self.topology
    }

    pub fn specs(&self) -> &[StreamSpec] {
        self.supervisor.specs()
    }

    /// 每个槽位的 (行, 列)
    pub fn placements(&self) -> Vec<(usize, usize)> {
        self.specs()
            .iter()
            .map(|spec| self.topology.placement(spec.slot_index))
            .collect()
    }

    pub fn counters(&self) -> BusCounters {
        self.bus.counters()
    }

    /// 放大显示槽位, `None` 取消
    pub fn focus(&self, slot_index: Option<usize>) {
        if self.commands.send(Command::Focus(slot_index)).is_err() {
            debug!("宫格控制器已退出, 忽略放大命令");
        }
    }

    /// 重启已结束的采集线程, 返回启动数量
    pub fn refresh(&mut self) -> usize {
        self.supervisor.refresh()
    }

    /// 停止所有采集线程与宫格控制器, 返回最终槽位状态
    pub fn shutdown(mut self) -> Result<Vec<SlotState>, RuntimeError> {
        let workers = self.supervisor.shutdown(self.grace);
        // 采集线程的离线事件已投递, 控制器处理完后退出
        let _ = self.commands.send(Command::Shutdown);

        let slots = match self.controller.take() {
            Some(handle) => handle.join().map_err(|_| RuntimeError::ControllerPanicked)?,
            None => Vec::new(),
        };

        match workers {
            Ok(()) => {
                info!(counters = ?self.bus.counters(), "✅ 监控墙已关闭");
                Ok(slots)
            }
            Err(err) => {
                warn!(error = %err, "⚠️ 监控墙关闭超时");
                Err(err)
            }
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if self.controller.is_some() {
            let _ = self.commands.send(Command::Shutdown);
        }
    }
}

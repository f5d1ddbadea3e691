//! 监控墙配置 - 通过JSON文件调整参数
//!
//! 文件不存在时写入默认配置并使用; 文件存在但格式错误时返回 [`ConfigError::Parse`],
//! 不会静默回退到默认值 (摄像头列表错了应该让用户看到)。

use crate::bus::BusPolicy;
use crate::error::ConfigError;
use crate::grid::clock::DEFAULT_CLOCK_INTERVAL;
use crate::grid::topology::{GridTopology, DEFAULT_COLUMNS, DEFAULT_MAX_SLOTS};
use crate::grid::types::{StreamSource, StreamSpec};
use crate::input::worker::{WorkerSettings, DEFAULT_CAPTURE_DELAY, DEFAULT_TILE_HEIGHT, DEFAULT_TILE_WIDTH};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "cameras.json";

/// 单路摄像头: 编号 + 视频源 (整数为本地设备, 字符串为文件/URL)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraEntry {
    pub id: u32,
    pub source: StreamSource,
}

/// 监控墙参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    // === 画面 ===
    pub tile_width: u32,  // 宫格单元宽度
    pub tile_height: u32, // 宫格单元高度

    // === 拓扑 ===
    pub columns: usize,   // 列数
    pub max_slots: usize, // 最大槽位数

    // === 时序 ===
    pub capture_delay_ms: u64,  // 读帧间隔
    pub clock_interval_ms: u64, // 离线时钟刷新间隔
    pub shutdown_grace_ms: u64, // 关闭等待时间

    // === 帧总线 ===
    pub bus: BusPolicy,

    // === 摄像头列表 (顺序即槽位顺序) ===
    pub cameras: Vec<CameraEntry>,
}

impl Default for GridConfig {
    fn default() -> Self {
        let mut cameras = vec![CameraEntry {
            id: 1,
            source: StreamSource::Device(0),
        }];
        cameras.extend((2..=15).map(|id| CameraEntry {
            id,
            source: StreamSource::Path(format!("videos/t{}.mp4", id - 1)),
        }));

        Self {
            tile_width: DEFAULT_TILE_WIDTH,
            tile_height: DEFAULT_TILE_HEIGHT,
            columns: DEFAULT_COLUMNS,
            max_slots: DEFAULT_MAX_SLOTS,
            capture_delay_ms: DEFAULT_CAPTURE_DELAY.as_millis() as u64,
            clock_interval_ms: DEFAULT_CLOCK_INTERVAL.as_millis() as u64,
            shutdown_grace_ms: 2000,
            bus: BusPolicy::default(),
            cameras,
        }
    }
}

impl GridConfig {
    /// 从JSON文件加载配置, 不存在则写入默认配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let config = Self::default();
                config.save(path)?;
                info!(path = %path.display(), "📝 配置文件不存在, 已写入默认配置");
                return Ok(config);
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), cameras = config.cameras.len(), "✅ 配置已加载");
        Ok(config)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        fs::write(path, json).map_err(io_err)?;
        info!(path = %path.display(), "💾 配置已保存");
        Ok(())
    }

    pub fn topology(&self) -> Result<GridTopology, ConfigError> {
        GridTopology::new(self.columns, self.max_slots)
    }

    /// 按配置顺序分配槽位
    pub fn stream_specs(&self) -> Result<Vec<StreamSpec>, ConfigError> {
        let cameras: Vec<(u32, StreamSource)> = self
            .cameras
            .iter()
            .map(|c| (c.id, c.source.clone()))
            .collect();
        self.topology()?.assign(&cameras)
    }

    pub fn worker_settings(&self) -> Result<WorkerSettings, ConfigError> {
        let settings = WorkerSettings {
            tile_width: self.tile_width,
            tile_height: self.tile_height,
            capture_delay: Duration::from_millis(self.capture_delay_ms),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn clock_interval(&self) -> Duration {
        Duration::from_millis(self.clock_interval_ms.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cctv-grid-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir.join("cameras.json")
    }

    #[test]
    fn test_default_matches_reference_wall() {
        let config = GridConfig::default();
        assert_eq!((config.tile_width, config.tile_height), (960, 540));
        assert_eq!((config.columns, config.max_slots), (4, 16));
        assert_eq!(config.capture_delay_ms, 80);
        assert_eq!(config.clock_interval_ms, 1000);
        assert_eq!(config.cameras.len(), 15);
        assert_eq!(config.cameras[0].source, StreamSource::Device(0));
        assert_eq!(config.stream_specs().unwrap().len(), 15);
    }

    #[test]
    fn test_missing_file_writes_default() {
        let path = temp_path("missing");
        let config = GridConfig::load(&path).unwrap();
        assert_eq!(config, GridConfig::default());
        assert!(path.exists());

        // 再次加载读取的是刚写入的文件
        assert_eq!(GridConfig::load(&path).unwrap(), config);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_mixed_sources_and_partial_file() {
        let path = temp_path("mixed");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            r#"{
                "columns": 2,
                "max_slots": 4,
                "bus": {"policy": "queue", "capacity": 8},
                "cameras": [
                    {"id": 1, "source": 0},
                    {"id": 2, "source": "videos/t1.mp4"},
                    {"id": 9, "source": "rtsp://10.0.0.2/stream"}
                ]
            }"#,
        )
        .unwrap();

        let config = GridConfig::load(&path).unwrap();
        assert_eq!(config.tile_width, 960);
        assert_eq!(config.bus, BusPolicy::Queue { capacity: 8 });

        let specs = config.stream_specs().unwrap();
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0].source, StreamSource::Device(0));
        assert_eq!(specs[2].camera_id, 9);
        assert!(specs[2].source.is_network());
        assert_eq!(config.topology().unwrap().placement(2), (1, 0));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let path = temp_path("malformed");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ \"cameras\": [ {\"id\": 1} ] }").unwrap();
        let err = GridConfig::load(&path).unwrap_err();
        assert_eq!(err.as_label(), "config_parse");
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_too_many_cameras() {
        let mut config = GridConfig::default();
        config.max_slots = 4;
        assert!(matches!(
            config.stream_specs(),
            Err(ConfigError::TooManySlots { count: 15, max: 4 })
        ));
        config.columns = 0;
        assert!(matches!(config.topology(), Err(ConfigError::InvalidTopology { .. })));
    }

    #[test]
    fn test_tile_size_is_validated() {
        let mut config = GridConfig::default();
        assert_eq!(config.worker_settings().unwrap().tile_width, 960);

        for (w, h) in [(70000, 70000), (0, 540), (960, 0), (4097, 540)] {
            config.tile_width = w;
            config.tile_height = h;
            let err = config.worker_settings().unwrap_err();
            assert_eq!(err.as_label(), "config_invalid_tile_size");
            assert!(matches!(err, ConfigError::InvalidTileSize { width, height, .. } if (width, height) == (w, h)));
        }

        config.tile_width = 4096;
        config.tile_height = 1;
        assert!(config.worker_settings().is_ok());
    }
}

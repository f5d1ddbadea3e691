/// 多路监控墙 (CCTV Grid)
///
/// 多摄像头宫格显示
///
/// 系统架构:
/// 1. 采集线程: 每路视频一个, 解码 + 缩放 (独立工作线程)
/// 2. 控制线程: 宫格状态唯一写入者, 离线槽位显示编号与时钟
/// 3. 主线程:   渲染显示 (macroquad事件循环)
///
/// 操作: 左键放大 | 右键/Backspace 取消放大 | F5 刷新 | Esc 退出
use anyhow::Context as _;
use cctv_grid::{list_video_devices, FfmpegCodec, GridConfig, Monitor, DEFAULT_CONFIG_PATH};
use clap::Parser;
use macroquad::prelude::*;
use macroquad::window::{Conf, Window};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod tiles;
use tiles::TileBoard;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// 渲染通道容量
const UPDATE_CAPACITY: usize = 256;
/// 宫格单元显示尺寸 (16:9)
const TILE_VIEW_WIDTH: f32 = 320.0;
const TILE_VIEW_HEIGHT: f32 = 180.0;

/// 监控墙参数
#[derive(Parser, Debug)]
#[command(author, version, about = "多路监控墙 - 多摄像头宫格显示", long_about = None)]
struct Args {
    /// 配置文件路径 (不存在则写入默认配置)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// 列出本机视频采集设备后退出
    #[arg(long)]
    list_devices: bool,

    /// 日志过滤, 覆盖 RUST_LOG (例如 "debug" 或 "cctv_grid=trace")
    #[arg(long)]
    log: Option<String>,

    /// 定时刷新间隔(秒), 重启已结束的视频流
    #[arg(long)]
    refresh_secs: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = match &args.log {
        Some(directives) => EnvFilter::try_new(directives).context("日志过滤参数无效")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .init();

    if args.list_devices {
        let devices = list_video_devices()?;
        info!("✅ 找到 {} 个视频设备", devices.len());
        for device in devices {
            println!("[{}] {}", device.index, device.name);
        }
        return Ok(());
    }

    // 配置错误时不打开窗口
    let config = GridConfig::load(&args.config)
        .with_context(|| format!("加载配置失败: {}", args.config.display()))?;
    let topology = config.topology()?;
    let slots = config.stream_specs()?.len();

    let (display, detail, updates) = tiles::channel(UPDATE_CAPACITY);
    let monitor = Monitor::start(
        &config,
        Arc::new(FfmpegCodec::default()),
        Box::new(display),
        Some(Box::new(detail)),
    )?;

    let layout = Layout::new(topology.columns(), topology.rows(), slots);
    let conf = Conf {
        window_title: "多路监控墙 - CCTV Grid".to_owned(),
        window_width: layout.default_width() as i32,
        window_height: layout.default_height() as i32,
        window_resizable: true,
        ..Default::default()
    };
    let refresh = args.refresh_secs.filter(|s| *s > 0).map(Duration::from_secs);

    Window::from_config(conf, viewer(monitor, layout, updates, refresh));
    Ok(())
}

/// 窗口布局: 左侧宫格, 右侧放大窗口
#[derive(Clone, Copy)]
struct Layout {
    columns: usize,
    rows: usize,
    slots: usize,
}

impl Layout {
    fn new(columns: usize, rows: usize, slots: usize) -> Self {
        Self { columns, rows, slots }
    }

    fn default_width(&self) -> f32 {
        TILE_VIEW_WIDTH * self.columns as f32 + TILE_VIEW_WIDTH * 2.0
    }

    fn default_height(&self) -> f32 {
        (TILE_VIEW_HEIGHT * self.rows as f32).max(TILE_VIEW_HEIGHT * 2.0)
    }

    fn grid_width(&self) -> f32 {
        let columns = self.columns as f32;
        screen_width() * columns / (columns + 2.0)
    }

    fn tile_rect(&self, slot: usize) -> Rect {
        let w = self.grid_width() / self.columns as f32;
        let h = screen_height() / self.rows as f32;
        let (row, col) = cctv_grid::placement(slot, self.columns);
        Rect::new(col as f32 * w, row as f32 * h, w, h)
    }

    fn detail_rect(&self) -> Rect {
        let x = self.grid_width();
        let w = screen_width() - x;
        let h = w * 9.0 / 16.0;
        Rect::new(x, (screen_height() - h) / 2.0, w, h)
    }

    /// 鼠标位置 → 槽位
    fn slot_at(&self, pos: Vec2) -> Option<usize> {
        (0..self.slots).find(|slot| self.tile_rect(*slot).contains(pos))
    }
}

async fn viewer(
    mut monitor: Monitor,
    layout: Layout,
    updates: crossbeam_channel::Receiver<tiles::TileUpdate>,
    refresh: Option<Duration>,
) {
    prevent_quit();
    let mut board = TileBoard::new(layout.slots);
    let mut focused: Option<usize> = None;
    let mut last_refresh = Instant::now();
    let camera_ids: Vec<u32> = monitor.specs().iter().map(|s| s.camera_id).collect();
    info!("✅ 系统就绪,开始监控...");

    loop {
        if is_key_pressed(KeyCode::Escape) || is_quit_requested() {
            break;
        }

        // ========== 输入 ==========
        if is_mouse_button_pressed(MouseButton::Left) {
            let (x, y) = mouse_position();
            if let Some(slot) = layout.slot_at(vec2(x, y)) {
                focused = Some(slot);
                monitor.focus(Some(slot));
            }
        }
        if is_mouse_button_pressed(MouseButton::Right) || is_key_pressed(KeyCode::Backspace) {
            focused = None;
            monitor.focus(None);
            board.clear_detail();
        }
        if is_key_pressed(KeyCode::F5) {
            monitor.refresh();
        }
        if let Some(interval) = refresh {
            if last_refresh.elapsed() >= interval {
                monitor.refresh();
                last_refresh = Instant::now();
            }
        }

        // ========== 绘制 ==========
        board.drain(&updates);
        clear_background(DARKGRAY);

        let tile_font = (layout.tile_rect(0).h / 8.0).clamp(12.0, 32.0);
        for (slot, tile) in board.tiles().iter().enumerate() {
            let rect = layout.tile_rect(slot);
            tile.draw(rect, tile_font);
            let color = if focused == Some(slot) { YELLOW } else { GRAY };
            draw_rectangle_lines(rect.x, rect.y, rect.w, rect.h, 2.0, color);
        }

        let detail = layout.detail_rect();
        board.detail().draw(detail, (detail.h / 10.0).clamp(16.0, 48.0));
        if let Some(id) = focused.and_then(|slot| camera_ids.get(slot)) {
            draw_text(&format!("Camera {}", id), detail.x + 10.0, detail.y - 10.0, 24.0, WHITE);
        }

        next_frame().await;
    }

    let code = match monitor.shutdown() {
        Ok(slots) => {
            info!(slots = slots.len(), "👋 已退出");
            0
        }
        Err(err) => {
            error!(error = %err, label = err.as_label(), "❌ 退出时出错");
            1
        }
    };
    std::process::exit(code);
}

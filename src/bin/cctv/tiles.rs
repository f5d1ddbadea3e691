//! 窗口侧的宫格状态
//!
//! 宫格控制器线程通过 [`ChannelDisplay`] / [`ChannelDetail`] 把更新投递到有界通道,
//! 渲染循环每帧取空通道, 每个宫格只保留最新一条再上传纹理。

use cctv_grid::{DetailSink, DisplaySink, Frame};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use macroquad::prelude::*;
use tracing::trace;

/// 控制器线程 → 渲染循环
pub enum TileUpdate {
    Frame { slot: usize, frame: Frame },
    Text { slot: usize, text: String },
    Clear { slot: usize },
    Detail(Frame),
    DetailText(String),
    DetailClear,
}

fn forward(tx: &Sender<TileUpdate>, update: TileUpdate) {
    // 通道满时丢弃: 下一帧或下一次时钟节拍会覆盖
    if let Err(TrySendError::Full(_)) = tx.try_send(update) {
        trace!("渲染通道已满, 丢弃一次更新");
    }
}

pub struct ChannelDisplay {
    tx: Sender<TileUpdate>,
}

impl DisplaySink for ChannelDisplay {
    fn render(&mut self, slot_index: usize, frame: &Frame) {
        forward(
            &self.tx,
            TileUpdate::Frame {
                slot: slot_index,
                frame: frame.clone(),
            },
        );
    }

    fn render_placeholder(&mut self, slot_index: usize, text: &str) {
        forward(
            &self.tx,
            TileUpdate::Text {
                slot: slot_index,
                text: text.to_string(),
            },
        );
    }

    fn clear(&mut self, slot_index: usize, _blank: &Frame) {
        forward(&self.tx, TileUpdate::Clear { slot: slot_index });
    }
}

pub struct ChannelDetail {
    tx: Sender<TileUpdate>,
}

impl DetailSink for ChannelDetail {
    fn render_detail(&mut self, frame: &Frame) {
        forward(&self.tx, TileUpdate::Detail(frame.clone()));
    }

    fn render_detail_placeholder(&mut self, text: &str) {
        forward(&self.tx, TileUpdate::DetailText(text.to_string()));
    }

    fn clear_detail(&mut self, _blank: &Frame) {
        forward(&self.tx, TileUpdate::DetailClear);
    }
}

/// 创建一对输出端与渲染端共用的通道
pub fn channel(capacity: usize) -> (ChannelDisplay, ChannelDetail, Receiver<TileUpdate>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (
        ChannelDisplay { tx: tx.clone() },
        ChannelDetail { tx },
        rx,
    )
}

enum Content {
    Empty,
    Video,
    Blank,
    Text(String),
}

/// 单个画面 (宫格单元或放大窗口)
pub struct TileView {
    texture: Option<Texture2D>,
    content: Content,
}

impl TileView {
    pub fn new() -> Self {
        Self {
            texture: None,
            content: Content::Empty,
        }
    }

    fn show_frame(&mut self, frame: &Frame) {
        // 只在分辨率变化时重建纹理，否则更新像素数据
        let needs_rebuild = match &self.texture {
            Some(tex) => tex.width() != frame.width as f32 || tex.height() != frame.height as f32,
            None => true,
        };
        if needs_rebuild {
            let texture = Texture2D::from_rgba8(frame.width as u16, frame.height as u16, &frame.rgba_data);
            texture.set_filter(FilterMode::Linear);
            self.texture = Some(texture);
        } else if let Some(tex) = &self.texture {
            let img = Image {
                bytes: frame.rgba_data.to_vec(),
                width: frame.width as u16,
                height: frame.height as u16,
            };
            tex.update(&img);
        }
        self.content = Content::Video;
    }

    fn show_text(&mut self, text: String) {
        self.content = Content::Text(text);
    }

    fn show_blank(&mut self) {
        self.content = Content::Blank;
    }

    pub fn draw(&self, rect: Rect, font_size: f32) {
        draw_rectangle(rect.x, rect.y, rect.w, rect.h, BLACK);
        match (&self.content, &self.texture) {
            (Content::Video, Some(texture)) => draw_texture_ex(
                texture,
                rect.x,
                rect.y,
                WHITE,
                DrawTextureParams {
                    dest_size: Some(vec2(rect.w, rect.h)),
                    ..Default::default()
                },
            ),
            (Content::Text(text), _) => draw_centered_lines(text, rect, font_size),
            _ => {}
        }
    }
}

/// 多行文字居中
fn draw_centered_lines(text: &str, rect: Rect, font_size: f32) {
    let lines: Vec<&str> = text.lines().collect();
    let line_height = font_size * 1.2;
    let top = rect.y + (rect.h - line_height * lines.len() as f32) / 2.0 + font_size;
    for (i, line) in lines.iter().enumerate() {
        let dims = measure_text(line, None, font_size as u16, 1.0);
        let x = rect.x + (rect.w - dims.width) / 2.0;
        draw_text(line, x, top + i as f32 * line_height, font_size, WHITE);
    }
}

/// 所有宫格 + 放大窗口
pub struct TileBoard {
    tiles: Vec<TileView>,
    detail: TileView,
}

impl TileBoard {
    pub fn new(slots: usize) -> Self {
        Self {
            tiles: (0..slots).map(|_| TileView::new()).collect(),
            detail: TileView::new(),
        }
    }

    pub fn tiles(&self) -> &[TileView] {
        &self.tiles
    }

    pub fn detail(&self) -> &TileView {
        &self.detail
    }

    /// 取空通道, 每个画面只应用最新一条
    pub fn drain(&mut self, rx: &Receiver<TileUpdate>) {
        let mut latest: Vec<Option<TileUpdate>> = (0..self.tiles.len()).map(|_| None).collect();
        let mut detail = None;
        for update in rx.try_iter() {
            match &update {
                TileUpdate::Frame { slot, .. }
                | TileUpdate::Text { slot, .. }
                | TileUpdate::Clear { slot } => {
                    if let Some(entry) = latest.get_mut(*slot) {
                        *entry = Some(update);
                    }
                }
                TileUpdate::Detail(_) | TileUpdate::DetailText(_) | TileUpdate::DetailClear => {
                    detail = Some(update)
                }
            }
        }

        for (tile, update) in self.tiles.iter_mut().zip(latest) {
            match update {
                Some(TileUpdate::Frame { frame, .. }) => tile.show_frame(&frame),
                Some(TileUpdate::Text { text, .. }) => tile.show_text(text),
                Some(TileUpdate::Clear { .. }) => tile.show_blank(),
                _ => {}
            }
        }
        match detail {
            Some(TileUpdate::Detail(frame)) => self.detail.show_frame(&frame),
            Some(TileUpdate::DetailText(text)) => self.detail.show_text(text),
            Some(TileUpdate::DetailClear) => self.detail.show_blank(),
            _ => {}
        }
    }

    /// 取消放大时清空放大窗口
    pub fn clear_detail(&mut self) {
        self.detail.content = Content::Empty;
    }
}

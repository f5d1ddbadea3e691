//! 测试辅助: 脚本化解码器 + 记录型显示输出

use crate::error::CodecError;
use crate::grid::sink::{DetailSink, DisplaySink};
use crate::grid::types::{Frame, StreamSource};
use crate::input::codec::{Codec, FrameSource, RawFrame};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ========== 假解码器 ==========

/// 单个视频源的行为脚本
#[derive(Clone)]
pub enum Script {
    /// 打开失败
    FailOpen,
    /// 输出 `count` 帧后结束, 第 i 帧像素值为 i+1
    Frames { count: usize, width: u32, height: u32 },
    /// 输出 `count` 帧后解码失败
    FailAfter { count: usize },
    /// 由测试逐帧推送, 通道断开即结束
    Gated(Receiver<RawFrame>),
    /// 输出 `count` 帧后在读帧时 panic
    PanicAfter { count: usize },
}

pub fn solid_frame(value: u8, width: u32, height: u32) -> RawFrame {
    let mut rgba_data = vec![value; (width * height * 4) as usize];
    for px in rgba_data.chunks_exact_mut(4) {
        px[3] = 255;
    }
    RawFrame {
        rgba_data,
        width,
        height,
    }
}

#[derive(Default)]
pub struct ScriptedCodec {
    scripts: HashMap<String, Script>,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

impl ScriptedCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: &StreamSource, script: Script) -> Self {
        self.scripts.insert(source.to_string(), script);
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Codec for ScriptedCodec {
    fn open(&self, source: &StreamSource) -> Result<Box<dyn FrameSource>, CodecError> {
        let script = match self.scripts.get(&source.to_string()) {
            None | Some(Script::FailOpen) => {
                return Err(CodecError::open(source.to_string(), "no such source"))
            }
            Some(script) => script.clone(),
        };
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            script,
            emitted: 0,
            closed: self.closed.clone(),
        }))
    }
}

struct ScriptedSource {
    script: Script,
    emitted: usize,
    closed: Arc<AtomicUsize>,
}

impl FrameSource for ScriptedSource {
    fn read_frame(&mut self) -> Result<Option<RawFrame>, CodecError> {
        let frame = match &self.script {
            Script::FailOpen => None,
            Script::Frames {
                count,
                width,
                height,
            } => (self.emitted < *count)
                .then(|| solid_frame((self.emitted + 1) as u8, *width, *height)),
            Script::FailAfter { count } => {
                if self.emitted >= *count {
                    return Err(CodecError::decode("corrupt packet"));
                }
                Some(solid_frame((self.emitted + 1) as u8, 32, 18))
            }
            Script::Gated(rx) => rx.recv().ok(),
            Script::PanicAfter { count } => {
                if self.emitted >= *count {
                    panic!("decoder crashed");
                }
                Some(solid_frame((self.emitted + 1) as u8, 16, 9))
            }
        };
        if frame.is_some() {
            self.emitted += 1;
        }
        Ok(frame)
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// ========== 记录型输出 ==========

#[derive(Clone, Debug)]
pub enum SinkCall {
    Frame { slot: usize, frame: Frame },
    Placeholder { slot: usize, text: String },
    Clear { slot: usize },
    Detail { frame: Frame },
    DetailPlaceholder { text: String },
    DetailClear,
}

pub type CallLog = Arc<Mutex<Vec<SinkCall>>>;

pub struct RecordingDisplay {
    log: CallLog,
}

impl RecordingDisplay {
    pub fn new() -> (Self, CallLog) {
        let log = CallLog::default();
        (Self { log: log.clone() }, log)
    }
}

impl DisplaySink for RecordingDisplay {
    fn render(&mut self, slot_index: usize, frame: &Frame) {
        self.log.lock().push(SinkCall::Frame {
            slot: slot_index,
            frame: frame.clone(),
        });
    }

    fn render_placeholder(&mut self, slot_index: usize, text: &str) {
        self.log.lock().push(SinkCall::Placeholder {
            slot: slot_index,
            text: text.to_string(),
        });
    }

    fn clear(&mut self, slot_index: usize, _blank: &Frame) {
        self.log.lock().push(SinkCall::Clear { slot: slot_index });
    }
}

pub struct RecordingDetail {
    log: CallLog,
}

impl RecordingDetail {
    pub fn new() -> (Self, CallLog) {
        let log = CallLog::default();
        (Self { log: log.clone() }, log)
    }
}

impl DetailSink for RecordingDetail {
    fn render_detail(&mut self, frame: &Frame) {
        self.log.lock().push(SinkCall::Detail {
            frame: frame.clone(),
        });
    }

    fn render_detail_placeholder(&mut self, text: &str) {
        self.log.lock().push(SinkCall::DetailPlaceholder {
            text: text.to_string(),
        });
    }

    fn clear_detail(&mut self, _blank: &Frame) {
        self.log.lock().push(SinkCall::DetailClear);
    }
}

/// 等待条件成立 (最多 `timeout`)
pub fn wait_until(timeout: std::time::Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    cond()
}

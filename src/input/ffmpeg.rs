//! FFmpeg 解码器 (ez-ffmpeg)
//!
//! 每个视频源一条 FFmpeg 管线: 输入 → `format=yuv420p` → 帧过滤器 → 空输出。
//! 帧过滤器把 YUV420P 转成 RGBA 后通过容量为 1 的通道交给采集线程,
//! 采集线程按自己的节奏拉取。
//!
//! - 本地文件: 阻塞发送即背压, 读帧间隔就是播放速度
//! - 摄像头/网络流: 只保留最新一帧, 旧帧直接替换, 解码不等待采集线程
//!
//! 本地摄像头按平台选择输入格式: DirectShow(Windows) / AVFoundation(macOS) / V4L2(Linux)

use super::codec::{Codec, FrameSource, RawFrame};
use crate::error::CodecError;
use crate::grid::types::StreamSource;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Frame, Input};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 单帧最大分辨率
const MAX_DIMENSION: u32 = 4096;

/// 摄像头采集参数
const CAMERA_OPTS: [(&str, &str); 2] = [("framerate", "30"), ("video_size", "1280x720")];

/// 网络流参数
const NETWORK_OPTS: [(&str, &str); 3] = [
    ("rtsp_transport", "tcp"),
    ("buffer_size", "67108864"),
    ("rtsp_flags", "prefer_tcp"),
];

#[cfg(target_os = "windows")]
const CAMERA_FORMAT: &str = "dshow";
#[cfg(target_os = "macos")]
const CAMERA_FORMAT: &str = "avfoundation";
#[cfg(target_os = "linux")]
const CAMERA_FORMAT: &str = "v4l2";
#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
const CAMERA_FORMAT: &str = "video4linux2";

/// 本机视频采集设备
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDevice {
    pub index: u32,
    pub name: String,
}

/// 获取可用的视频设备列表
pub fn list_video_devices() -> Result<Vec<VideoDevice>, CodecError> {
    let devices = ez_ffmpeg::device::get_input_video_devices()
        .map_err(|e| CodecError::open("video devices", e))?;
    Ok(devices
        .into_iter()
        .enumerate()
        .map(|(index, name)| VideoDevice {
            index: index as u32,
            name,
        })
        .collect())
}

/// 摄像头输入地址 - 根据平台选择
fn camera_url(index: u32) -> Result<String, CodecError> {
    #[cfg(target_os = "windows")]
    {
        // dshow 只认设备名
        let devices = list_video_devices()?;
        devices
            .into_iter()
            .find(|d| d.index == index)
            .map(|d| format!("video={}", d.name))
            .ok_or_else(|| CodecError::open(format!("device:{}", index), "no such device"))
    }
    #[cfg(target_os = "linux")]
    {
        Ok(format!("/dev/video{}", index))
    }
    #[cfg(not(any(target_os = "windows", target_os = "linux")))]
    {
        Ok(format!("{}", index))
    }
}

/// FFmpeg 解码器
#[derive(Clone, Debug)]
pub struct FfmpegCodec {
    /// 打开后等待管线启动的最长时间
    open_timeout: Duration,
}

impl Default for FfmpegCodec {
    fn default() -> Self {
        Self {
            open_timeout: Duration::from_secs(10),
        }
    }
}

impl FfmpegCodec {
    pub fn new(open_timeout: Duration) -> Self {
        Self { open_timeout }
    }

    fn input(source: &StreamSource) -> Result<Input, CodecError> {
        let input = match source {
            StreamSource::Device(index) => Input::new(camera_url(*index)?)
                .set_format(CAMERA_FORMAT)
                .set_input_opts(CAMERA_OPTS.into()),
            StreamSource::Path(path) if source.is_network() => {
                Input::new(path.as_str()).set_input_opts(NETWORK_OPTS.into())
            }
            StreamSource::Path(path) => Input::new(path.as_str()),
        };
        Ok(input)
    }
}

impl Codec for FfmpegCodec {
    fn open(&self, source: &StreamSource) -> Result<Box<dyn FrameSource>, CodecError> {
        let name = source.to_string();
        let closed = Arc::new(AtomicBool::new(false));
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(1);
        let handoff = match source {
            StreamSource::Path(_) if !source.is_network() => FrameHandoff::blocking(frame_tx),
            _ => FrameHandoff::latest_only(frame_tx, frame_rx.clone()),
        };

        let filter = RgbaFilter {
            handoff: Some(handoff),
            closed: closed.clone(),
            total_frames: 0,
            dropped_frames: 0,
        };
        let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
        let pipe = pipe.filter("rgba", Box::new(filter));
        let out = create_null_output().add_frame_pipeline(pipe);

        let ctx = FfmpegContext::builder()
            .input(Self::input(source)?)
            .filter_desc("format=yuv420p")
            .output(out)
            .build()
            .map_err(|e| CodecError::open(&name, format!("构建失败: {}", e)))?;

        let sch = ctx
            .start()
            .map_err(|e| CodecError::open(&name, format!("启动失败: {}", e)))?;
        info!(source = %name, "✅ FFmpeg 管线启动");

        // 调度结束 (流结束或出错) 后回报结果
        let (status_tx, status_rx) = crossbeam_channel::bounded(1);
        thread::Builder::new()
            .name(format!("ffmpeg-{}", name))
            .spawn(move || {
                let result = sch.wait().map_err(|e| e.to_string());
                let _ = status_tx.send(result);
            })
            .map_err(|e| CodecError::open(&name, e))?;

        let mut source = FfmpegSource {
            name,
            frames: Some(frame_rx),
            status: status_rx,
            closed,
            pending: None,
        };

        // 首帧到达或管线结束前视为打开中
        match source.frames.as_ref().map(|rx| rx.recv_timeout(self.open_timeout)) {
            Some(Ok(frame)) => source.pending = Some(frame),
            Some(Err(RecvTimeoutError::Timeout)) => {
                source.close();
                return Err(CodecError::open(&source.name, "首帧超时"));
            }
            Some(Err(RecvTimeoutError::Disconnected)) | None => {
                if let Err(err) = source.finish() {
                    return Err(CodecError::open(&source.name, err));
                }
            }
        }
        Ok(Box::new(source))
    }
}

/// 已打开的 FFmpeg 视频流
pub struct FfmpegSource {
    name: String,
    frames: Option<Receiver<RawFrame>>,
    status: Receiver<Result<(), String>>,
    closed: Arc<AtomicBool>,
    pending: Option<RawFrame>,
}

impl FfmpegSource {
    /// 管线已结束, 取调度结果
    fn finish(&mut self) -> Result<(), CodecError> {
        self.frames = None;
        match self.status.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(CodecError::decode(reason)),
            // 结果已取过
            Err(_) => Ok(()),
        }
    }
}

impl FrameSource for FfmpegSource {
    fn read_frame(&mut self) -> Result<Option<RawFrame>, CodecError> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        let Some(frames) = &self.frames else {
            return Ok(None);
        };
        match frames.recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(_) => self.finish().map(|()| None),
        }
    }

    fn close(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // 丢弃接收端, 阻塞中的帧过滤器立即返回错误;
        // 只保留最新帧的过滤器在下一帧看到关闭标志, 管线随之结束
        self.frames = None;
        self.pending = None;
        debug!(source = %self.name, "FFmpeg 视频流已关闭");
    }
}

/// 帧过滤器 → 采集线程 的交接
struct FrameHandoff {
    tx: Sender<RawFrame>,
    /// 只保留最新帧时用于取出旧帧
    stale: Option<Receiver<RawFrame>>,
}

impl FrameHandoff {
    fn blocking(tx: Sender<RawFrame>) -> Self {
        Self { tx, stale: None }
    }

    fn latest_only(tx: Sender<RawFrame>, stale: Receiver<RawFrame>) -> Self {
        Self {
            tx,
            stale: Some(stale),
        }
    }

    /// 交出一帧, 返回被替换掉的旧帧数
    fn push(&self, frame: RawFrame) -> Result<usize, String> {
        let Some(stale) = &self.stale else {
            self.tx
                .send(frame)
                .map_err(|_| "frame receiver dropped".to_string())?;
            return Ok(0);
        };

        match self.tx.try_send(frame) {
            Ok(()) => Ok(0),
            Err(TrySendError::Full(frame)) => {
                // 采集线程可能刚好取走了旧帧
                let replaced = stale.try_recv().map_or(0, |_| 1);
                match self.tx.try_send(frame) {
                    Ok(()) => Ok(replaced),
                    Err(TrySendError::Full(_)) => Ok(replaced + 1),
                    Err(TrySendError::Disconnected(_)) => Err("frame receiver dropped".to_string()),
                }
            }
            Err(TrySendError::Disconnected(_)) => Err("frame receiver dropped".to_string()),
        }
    }
}

/// 帧过滤器: YUV420P → RGBA
struct RgbaFilter {
    handoff: Option<FrameHandoff>,
    closed: Arc<AtomicBool>,
    total_frames: usize,
    dropped_frames: usize,
}

impl FrameFilter for RgbaFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        debug!("✅ 帧过滤器启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        if self.closed.load(Ordering::Acquire) {
            return Err("source closed".to_string());
        }
        self.total_frames += 1;

        let Some(raw) = convert(&frame) else {
            self.dropped_frames += 1;
            if self.total_frames <= 10 {
                warn!(frame = self.total_frames, "⚠️ 丢弃帧: 空帧/损坏帧");
            }
            return Ok(None);
        };

        match &self.handoff {
            Some(handoff) => self.dropped_frames += handoff.push(raw)?,
            None => return Err("source closed".to_string()),
        }
        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        // 发送端随之丢弃, 采集线程看到流结束
        self.handoff = None;
        debug!(
            total = self.total_frames,
            dropped = self.dropped_frames,
            "✅ 帧过滤器退出"
        );
    }
}

/// 校验并转换一帧, 非法帧返回 None
fn convert(frame: &Frame) -> Option<RawFrame> {
    // SAFETY: 指针非空且帧由 FFmpeg 持有到本函数返回
    unsafe {
        if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
            return None;
        }
        let av = &*frame.as_ptr();
        let (w, h) = (av.width as u32, av.height as u32);
        if w == 0 || h == 0 || w > MAX_DIMENSION || h > MAX_DIMENSION {
            return None;
        }
        // 缺少参考帧, 无效比特流
        if av.decode_error_flags & 0x03 != 0 {
            return None;
        }

        let (y_plane, u_plane, v_plane) = (av.data[0], av.data[1], av.data[2]);
        if y_plane.is_null() || u_plane.is_null() || v_plane.is_null() {
            return None;
        }
        let y_stride = av.linesize[0] as usize;
        let uv_stride = av.linesize[1] as usize;
        if y_stride < w as usize || uv_stride < (w as usize).div_ceil(2) {
            return None;
        }

        let mut rgba_data = vec![255u8; (w * h * 4) as usize];
        yuv420p_to_rgba(
            y_plane,
            u_plane,
            v_plane,
            y_stride,
            uv_stride,
            &mut rgba_data,
            w as usize,
            h as usize,
        );
        Some(RawFrame {
            rgba_data,
            width: w,
            height: h,
        })
    }
}

/// BT.601 整数近似 (系数乘以 128)
#[inline]
#[allow(clippy::too_many_arguments)]
unsafe fn yuv420p_to_rgba(
    y_plane: *const u8,
    u_plane: *const u8,
    v_plane: *const u8,
    y_stride: usize,
    uv_stride: usize,
    buffer: &mut [u8],
    width: usize,
    height: usize,
) {
    let mut out_idx = 0;
    for y in 0..height {
        let y_row = y * y_stride;
        let uv_row = (y >> 1) * uv_stride;

        for x in 0..width {
            let y_val = *y_plane.add(y_row + x) as i32;
            let u_val = *u_plane.add(uv_row + (x >> 1)) as i32 - 128;
            let v_val = *v_plane.add(uv_row + (x >> 1)) as i32 - 128;

            let (r, g, b) = yuv_to_rgb(y_val, u_val, v_val);
            buffer[out_idx] = r;
            buffer[out_idx + 1] = g;
            buffer[out_idx + 2] = b;
            out_idx += 4;
        }
    }
}

#[inline]
fn yuv_to_rgb(y: i32, u: i32, v: i32) -> (u8, u8, u8) {
    (
        (y + ((v * 179) >> 7)).clamp(0, 255) as u8,
        (y - ((u * 44) >> 7) - ((v * 91) >> 7)).clamp(0, 255) as u8,
        (y + ((u * 227) >> 7)).clamp(0, 255) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuv_gray_is_neutral() {
        assert_eq!(yuv_to_rgb(0, 0, 0), (0, 0, 0));
        assert_eq!(yuv_to_rgb(128, 0, 0), (128, 128, 128));
        assert_eq!(yuv_to_rgb(255, 0, 0), (255, 255, 255));
    }

    #[test]
    fn test_yuv_saturates() {
        let (r, _, b) = yuv_to_rgb(250, 127, 127);
        assert_eq!((r, b), (255, 255));
        let (r, _, b) = yuv_to_rgb(5, -128, -128);
        assert_eq!((r, b), (0, 0));
    }

    #[test]
    fn test_plane_conversion_uses_strides() {
        // 2x2 帧, Y 步长 4 (含填充), UV 步长 2
        let y = [10u8, 20, 0, 0, 30, 40, 0, 0];
        let u = [128u8, 0];
        let v = [128u8, 0];
        let mut out = vec![0u8; 16];
        unsafe { yuv420p_to_rgba(y.as_ptr(), u.as_ptr(), v.as_ptr(), 4, 2, &mut out, 2, 2) };
        let reds: Vec<u8> = out.chunks_exact(4).map(|px| px[0]).collect();
        assert_eq!(reds, vec![10, 20, 30, 40]);
    }

    fn raw(value: u8) -> RawFrame {
        RawFrame {
            rgba_data: vec![value; 4],
            width: 1,
            height: 1,
        }
    }

    #[test]
    fn test_latest_only_handoff_replaces_stale_frame() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let handoff = FrameHandoff::latest_only(tx, rx.clone());
        assert_eq!(handoff.push(raw(1)).unwrap(), 0);
        // 采集线程没来取, 新帧不阻塞, 直接替换旧帧
        assert_eq!(handoff.push(raw(2)).unwrap(), 1);
        assert_eq!(handoff.push(raw(3)).unwrap(), 1);
        assert_eq!(rx.try_recv().unwrap().rgba_data[0], 3);
        assert!(rx.try_recv().is_err());

        assert_eq!(handoff.push(raw(4)).unwrap(), 0);
        assert_eq!(rx.try_recv().unwrap().rgba_data[0], 4);
    }

    #[test]
    fn test_blocking_handoff_waits_for_reader() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let handoff = FrameHandoff::blocking(tx);
        handoff.push(raw(1)).unwrap();

        let writer = thread::spawn(move || handoff.push(raw(2)));
        thread::sleep(Duration::from_millis(50));
        assert!(!writer.is_finished());

        assert_eq!(rx.recv().unwrap().rgba_data[0], 1);
        assert_eq!(writer.join().unwrap().unwrap(), 0);
        assert_eq!(rx.recv().unwrap().rgba_data[0], 2);

        drop(rx);
        let (tx, rx) = crossbeam_channel::bounded(1);
        drop(rx);
        assert!(FrameHandoff::blocking(tx).push(raw(3)).is_err());
    }

    #[test]
    fn test_missing_file_fails_to_open() {
        let codec = FfmpegCodec::new(Duration::from_millis(500));
        let source = StreamSource::Path("/nonexistent/cctv-grid-test.mp4".into());
        assert!(codec.open(&source).is_err());
    }
}

/// 显示输出接口 (Display sinks)
///
/// 宫格控制器只通过这两个接口输出画面, 具体窗口实现见 `bin/cctv`。
use super::types::Frame;

/// 宫格画面输出
pub trait DisplaySink: Send {
    /// 在槽位中显示一帧
    fn render(&mut self, slot_index: usize, frame: &Frame);

    /// 在槽位中显示占位文字 (离线时的摄像头编号 + 时钟)
    fn render_placeholder(&mut self, slot_index: usize, text: &str);

    /// 槽位离线, 清空画面 (`blank` 为离线事件携带的黑帧)
    fn clear(&mut self, slot_index: usize, blank: &Frame) {
        self.render(slot_index, blank)
    }
}

/// 放大 (详情) 画面输出
pub trait DetailSink: Send {
    fn render_detail(&mut self, frame: &Frame);

    fn render_detail_placeholder(&mut self, text: &str);

    fn clear_detail(&mut self, blank: &Frame) {
        self.render_detail(blank)
    }
}

impl<T: DisplaySink + ?Sized> DisplaySink for Box<T> {
    fn render(&mut self, slot_index: usize, frame: &Frame) {
        (**self).render(slot_index, frame)
    }

    fn render_placeholder(&mut self, slot_index: usize, text: &str) {
        (**self).render_placeholder(slot_index, text)
    }

    fn clear(&mut self, slot_index: usize, blank: &Frame) {
        (**self).clear(slot_index, blank)
    }
}

impl<T: DetailSink + ?Sized> DetailSink for Box<T> {
    fn render_detail(&mut self, frame: &Frame) {
        (**self).render_detail(frame)
    }

    fn render_detail_placeholder(&mut self, text: &str) {
        (**self).render_detail_placeholder(text)
    }

    fn clear_detail(&mut self, blank: &Frame) {
        (**self).clear_detail(blank)
    }
}

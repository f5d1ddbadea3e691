/// 宫格显示系统 (Grid System)
///
/// - types: 数据结构 (视频源, 帧, 帧事件, 槽位状态)
/// - topology: 槽位分配与行列布局
/// - controller: 唯一消费者, 槽位状态的唯一写入者
/// - clock: 离线槽位的时钟占位
/// - sink: 显示输出接口
pub mod clock;
pub mod controller;
pub mod sink;
pub mod topology;
pub mod types;

pub use clock::{inactive_detail_text, placeholder_text, LivenessClock, DEFAULT_CLOCK_INTERVAL};
pub use controller::{Command, GridController};
pub use sink::{DetailSink, DisplaySink};
pub use topology::{placement, GridTopology, DEFAULT_COLUMNS, DEFAULT_MAX_SLOTS};
pub use types::{FocusSelection, Frame, FrameEvent, SlotState, StreamSource, StreamSpec};

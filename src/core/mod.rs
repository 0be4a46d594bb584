// 核心数据结构和类型定义

pub mod clock;
pub mod error;
pub mod logging;
pub mod queue;
pub mod types;

// 重新导出常用类型
pub use clock::{now_us, PlaybackClock};
pub use error::{ErrorCode, PlayerError, Result};
pub use logging::PipelineLogger;
pub use queue::BoundedQueue;
pub use types::*;

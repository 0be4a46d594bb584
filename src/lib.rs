//! 媒体播放器核心
//!
//! 解封装 → 音/视频解码 → 音/视频渲染的四级流水线，级间用有界队列
//! 衔接，音频作主时钟驱动同步，由单一状态机统一编排。
//! 平台渲染器通过 [`player::AudioSink`] / [`player::VideoSink`] 接入。

pub mod core;
pub mod player;

pub use crate::core::{
    ErrorCode, MediaInfo, MediaSource, MediaType, PipelineLogger, PixelFormat, PlayerError,
    PlayerState, Result,
};
pub use crate::player::{
    AudioSink, CpalAudioOutput, Player, PlayerCallback, PlayerConfig, VideoSink,
};

/// 初始化底层媒体框架，进程内调用一次
pub fn init() -> Result<()> {
    ffmpeg_next::init()?;
    Ok(())
}

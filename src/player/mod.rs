// 播放器核心模块

pub mod audio_output;
pub mod decoder;
pub mod demuxer;
pub mod manager;
pub mod renderer;

pub use audio_output::CpalAudioOutput;
pub use decoder::{AudioDecoder, VideoDecoder};
pub use demuxer::{Demuxer, DemuxerCallback, StreamPacket};
pub use manager::{Player, PlayerCallback, PlayerConfig};
pub use renderer::{AudioSink, RenderedFrameNotifier, RendererHandle, VideoSink};

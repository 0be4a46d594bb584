use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 音频输出目标格式（核心内不可协商）：48kHz / 双声道 / 有符号 16 位交织
pub const AUDIO_TARGET_SAMPLE_RATE: u32 = 48000;
pub const AUDIO_TARGET_CHANNELS: u16 = 2;
pub const AUDIO_TARGET_BIT_DEPTH: u16 = 16;

/// MediaInfo.duration_ms 的直播流哨兵值
pub const DURATION_LIVE: i64 = -1;

/// 媒体源：本地文件走普通打开路径，网络流在打开时附加网络选项
#[derive(Debug, Clone)]
pub enum MediaSource {
    LocalFile(PathBuf),
    NetworkStream {
        url: String,
        protocol: StreamProtocol,
    },
}

impl MediaSource {
    /// 按 URL 归类媒体源：能识别出流协议的是网络流，其余一律当本地路径
    pub fn from_url(url: &str) -> Self {
        match StreamProtocol::detect(url) {
            Some(protocol) => MediaSource::NetworkStream {
                url: url.to_string(),
                protocol,
            },
            None => MediaSource::LocalFile(PathBuf::from(url)),
        }
    }

    pub fn is_network_stream(&self) -> bool {
        matches!(self, MediaSource::NetworkStream { .. })
    }
}

/// 网络流协议
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProtocol {
    Rtsp,
    Rtmp,
    /// HTTP Live Streaming（.m3u8 播放列表）
    Hls,
    /// 普通 HTTP(S) 渐进式流
    Http,
}

impl StreamProtocol {
    /// 从 URL 识别流协议，本地路径返回 None
    ///
    /// scheme 不区分大小写；HLS 按播放列表后缀和路径特征判断，
    /// 要排在普通 HTTP 之前。
    pub fn detect(url: &str) -> Option<Self> {
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("rtsp://") {
            return Some(StreamProtocol::Rtsp);
        }
        if lower.starts_with("rtmp://") {
            return Some(StreamProtocol::Rtmp);
        }
        if lower.ends_with(".m3u8") || lower.contains("/hls/") {
            return Some(StreamProtocol::Hls);
        }
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Some(StreamProtocol::Http);
        }
        None
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamProtocol::Rtsp => "RTSP",
            StreamProtocol::Rtmp => "RTMP",
            StreamProtocol::Hls => "HLS",
            StreamProtocol::Http => "HTTP",
        }
    }
}

/// 媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Unknown,
    Audio,
    Video,
    AudioVideo,
}

impl MediaType {
    /// 根据探测到的流组合推导媒体类型
    pub fn from_streams(has_audio: bool, has_video: bool) -> Self {
        match (has_audio, has_video) {
            (true, true) => MediaType::AudioVideo,
            (true, false) => MediaType::Audio,
            (false, true) => MediaType::Video,
            (false, false) => MediaType::Unknown,
        }
    }

    pub fn has_audio(&self) -> bool {
        matches!(self, MediaType::Audio | MediaType::AudioVideo)
    }

    pub fn has_video(&self) -> bool {
        matches!(self, MediaType::Video | MediaType::AudioVideo)
    }
}

/// 基本流类别（解封装输出的包归属）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Audio,
    Video,
}

/// 像素格式 - 视频渲染器接受的三种布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 三平面 Y/U/V
    Yuv420p,
    /// Y 平面 + UV 交织平面
    Nv12,
    /// 单平面行主序 RGB
    Rgb24,
}

impl PixelFormat {
    /// 各平面缓冲区字节数
    pub fn plane_sizes(&self, width: u32, height: u32) -> [usize; 3] {
        let w = width as usize;
        let h = height as usize;
        match self {
            PixelFormat::Yuv420p => [w * h, w * h / 4, w * h / 4],
            PixelFormat::Nv12 => [w * h, w * h / 2, 0],
            PixelFormat::Rgb24 => [w * h * 3, 0, 0],
        }
    }
}

/// 音频帧数据 - 重采样后固定为目标输出格式的 PCM
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub pts_us: i64,      // 显示时间戳（微秒）
    pub duration_us: i64, // 帧持续时间（微秒）
    pub data: Vec<u8>,    // S16LE 交织采样
    pub size: usize,      // 字节数，与 samples * channels * 2 一致
    pub samples: usize,   // 每声道采样数
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_depth: u16,
}

/// 视频帧数据 - 最多三个平面，行距与平面一一对应
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub pts_us: i64,
    pub duration_us: i64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub planes: [Vec<u8>; 3],
    pub linesize: [usize; 3],
}

/// 媒体信息 - open 时探测出的快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub media_type: MediaType,
    pub duration_ms: i64, // 总时长（毫秒），DURATION_LIVE 表示直播流
    pub video_width: u32,
    pub video_height: u32,
    pub fps: f64,
    pub video_codec: String,
    pub audio_codec: String,
    pub audio_channels: u16,
    pub audio_sample_rate: u32,
}

impl MediaInfo {
    pub fn is_live(&self) -> bool {
        self.duration_ms == DURATION_LIVE
    }

    pub fn has_audio(&self) -> bool {
        self.media_type.has_audio()
    }

    pub fn has_video(&self) -> bool {
        self.media_type.has_video()
    }

    /// 总时长（微秒），直播流返回哨兵
    pub fn duration_us(&self) -> i64 {
        if self.is_live() {
            DURATION_LIVE
        } else {
            self.duration_ms * 1000
        }
    }
}

impl Default for MediaInfo {
    fn default() -> Self {
        Self {
            media_type: MediaType::Unknown,
            duration_ms: 0,
            video_width: 0,
            video_height: 0,
            fps: 0.0,
            video_codec: String::new(),
            audio_codec: String::new(),
            audio_channels: 0,
            audio_sample_rate: 0,
        }
    }
}

/// 播放器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    Idle,
    Initialized,
    Prepared,
    Started,
    Paused,
    Stopped,
    Completed,
    Error,
}

/// 解封装器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxerState {
    Idle,
    Initialized,
    Running,
    Seeking,
    Stopped,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_recognizes_stream_protocols() {
        assert_eq!(
            StreamProtocol::detect("rtsp://cam.local/stream"),
            Some(StreamProtocol::Rtsp)
        );
        assert_eq!(
            StreamProtocol::detect("rtmp://live.example.com/app"),
            Some(StreamProtocol::Rtmp)
        );
        // HLS 优先于普通 HTTP
        assert_eq!(
            StreamProtocol::detect("https://cdn.example.com/index.m3u8"),
            Some(StreamProtocol::Hls)
        );
        assert_eq!(
            StreamProtocol::detect("http://example.com/video.mp4"),
            Some(StreamProtocol::Http)
        );
        // scheme 不区分大小写
        assert_eq!(
            StreamProtocol::detect("RTSP://cam.local/stream"),
            Some(StreamProtocol::Rtsp)
        );
        assert_eq!(StreamProtocol::detect("/tmp/movie.mkv"), None);
    }

    #[test]
    fn from_url_splits_local_and_network() {
        assert!(MediaSource::from_url("rtsp://cam.local/stream").is_network_stream());
        assert!(MediaSource::from_url("https://cdn.example.com/a.m3u8").is_network_stream());
        assert!(matches!(
            MediaSource::from_url("/tmp/movie.mkv"),
            MediaSource::LocalFile(_)
        ));
        assert!(!MediaSource::from_url("movie.mp4").is_network_stream());
    }

    #[test]
    fn media_type_from_streams() {
        assert_eq!(MediaType::from_streams(true, true), MediaType::AudioVideo);
        assert_eq!(MediaType::from_streams(true, false), MediaType::Audio);
        assert_eq!(MediaType::from_streams(false, true), MediaType::Video);
        assert_eq!(MediaType::from_streams(false, false), MediaType::Unknown);
        assert!(MediaType::AudioVideo.has_audio());
        assert!(!MediaType::Video.has_audio());
    }

    #[test]
    fn plane_sizes_match_layout() {
        assert_eq!(
            PixelFormat::Yuv420p.plane_sizes(1280, 720),
            [1280 * 720, 1280 * 720 / 4, 1280 * 720 / 4]
        );
        assert_eq!(
            PixelFormat::Nv12.plane_sizes(1280, 720),
            [1280 * 720, 1280 * 720 / 2, 0]
        );
        assert_eq!(
            PixelFormat::Rgb24.plane_sizes(640, 480),
            [640 * 480 * 3, 0, 0]
        );
    }

    #[test]
    fn live_sentinel() {
        let mut info = MediaInfo::default();
        assert!(!info.is_live());
        info.duration_ms = DURATION_LIVE;
        assert!(info.is_live());
        assert_eq!(info.duration_us(), DURATION_LIVE);

        info.duration_ms = 10_000;
        assert_eq!(info.duration_us(), 10_000_000);
    }
}

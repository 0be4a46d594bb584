use crate::core::types::PlayerState;
use thiserror::Error;

/// 对外回调使用的数字错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    Success = 0,
    Unknown = -1,
    FileNotFound = -100,
    OpenFileFailed = -101,
    StreamNotFound = -102,
    CodecNotFound = -103,
    DecoderInitFailed = -104,
    DemuxerOpenFailed = -105,
    DemuxerFindStreamFailed = -106,
    DemuxerReadFailed = -107,
    DemuxerException = -108,
    NetworkError = -200,
}

impl ErrorCode {
    pub fn value(&self) -> i32 {
        *self as i32
    }
}

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("无法打开媒体: {0}")]
    OpenError(String),

    #[error("无法找到音视频流: {0}")]
    StreamNotFound(String),

    #[error("找不到解码器: {0}")]
    CodecNotFound(String),

    #[error("解码器初始化失败: {0}")]
    DecoderInitFailed(String),

    #[error("解封装器读取失败: {0}")]
    DemuxerReadFailed(String),

    #[error("状态错误: {operation} 不允许在 {state:?} 状态下执行")]
    InvalidState {
        operation: &'static str,
        state: PlayerState,
    },

    #[error("音频输出错误: {0}")]
    AudioError(String),

    #[error("渲染错误: {0}")]
    RenderError(String),

    #[error("网络错误: {0}")]
    NetworkError(String),

    #[error("其他错误: {0}")]
    Other(String),
}

impl PlayerError {
    /// 映射为回调错误码
    pub fn code(&self) -> ErrorCode {
        match self {
            PlayerError::FFmpegError(_) => ErrorCode::Unknown,
            PlayerError::IoError(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ErrorCode::FileNotFound
            }
            PlayerError::IoError(_) => ErrorCode::OpenFileFailed,
            PlayerError::OpenError(_) => ErrorCode::DemuxerOpenFailed,
            PlayerError::StreamNotFound(_) => ErrorCode::DemuxerFindStreamFailed,
            PlayerError::CodecNotFound(_) => ErrorCode::CodecNotFound,
            PlayerError::DecoderInitFailed(_) => ErrorCode::DecoderInitFailed,
            PlayerError::DemuxerReadFailed(_) => ErrorCode::DemuxerReadFailed,
            PlayerError::InvalidState { .. } => ErrorCode::Unknown,
            PlayerError::AudioError(_) => ErrorCode::DecoderInitFailed,
            PlayerError::RenderError(_) => ErrorCode::Unknown,
            PlayerError::NetworkError(_) => ErrorCode::NetworkError,
            PlayerError::Other(_) => ErrorCode::Unknown,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_values_are_stable() {
        assert_eq!(ErrorCode::Success.value(), 0);
        assert_eq!(ErrorCode::Unknown.value(), -1);
        assert_eq!(ErrorCode::FileNotFound.value(), -100);
        assert_eq!(ErrorCode::OpenFileFailed.value(), -101);
        assert_eq!(ErrorCode::StreamNotFound.value(), -102);
        assert_eq!(ErrorCode::CodecNotFound.value(), -103);
        assert_eq!(ErrorCode::DecoderInitFailed.value(), -104);
        assert_eq!(ErrorCode::DemuxerOpenFailed.value(), -105);
        assert_eq!(ErrorCode::DemuxerFindStreamFailed.value(), -106);
        assert_eq!(ErrorCode::DemuxerReadFailed.value(), -107);
        assert_eq!(ErrorCode::DemuxerException.value(), -108);
        assert_eq!(ErrorCode::NetworkError.value(), -200);
    }

    #[test]
    fn errors_map_to_codes() {
        assert_eq!(
            PlayerError::OpenError("x".into()).code(),
            ErrorCode::DemuxerOpenFailed
        );
        assert_eq!(
            PlayerError::StreamNotFound("x".into()).code(),
            ErrorCode::DemuxerFindStreamFailed
        );
        assert_eq!(
            PlayerError::DemuxerReadFailed("x".into()).code(),
            ErrorCode::DemuxerReadFailed
        );
        assert_eq!(
            PlayerError::NetworkError("x".into()).code(),
            ErrorCode::NetworkError
        );

        let not_found =
            PlayerError::IoError(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        assert_eq!(not_found.code(), ErrorCode::FileNotFound);
    }
}

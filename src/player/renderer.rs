use crate::core::{AudioFrame, PixelFormat, Result, VideoFrame};
use std::sync::Weak;

/// 渲染完成回调 - 渲染器消费完一帧后向播放器汇报
///
/// 播放器实现此接口用于推进时钟、提交下一帧音频。
pub trait RenderedFrameNotifier: Send + Sync {
    /// 音频帧已被设备消费，推进音频主时钟
    fn on_audio_frame_rendered(&self, frame: &AudioFrame);

    /// 视频帧已呈现，推进视频时钟
    fn on_video_frame_rendered(&self, frame: &VideoFrame);

    /// 音频设备取不到待播帧（欠载），播放器可借此补帧
    fn on_audio_sink_starved(&self) {}
}

/// 渲染器持有的回调句柄
///
/// 内部是弱引用：渲染器 → 播放器只存关系不存所有权，
/// 播放器销毁后 upgrade 失败，事件静默丢弃，不形成引用环。
#[derive(Clone)]
pub struct RendererHandle {
    notifier: Weak<dyn RenderedFrameNotifier>,
}

impl RendererHandle {
    pub fn new(notifier: Weak<dyn RenderedFrameNotifier>) -> Self {
        Self { notifier }
    }

    pub fn notify_audio_rendered(&self, frame: &AudioFrame) {
        if let Some(notifier) = self.notifier.upgrade() {
            notifier.on_audio_frame_rendered(frame);
        }
    }

    pub fn notify_video_rendered(&self, frame: &VideoFrame) {
        if let Some(notifier) = self.notifier.upgrade() {
            notifier.on_video_frame_rendered(frame);
        }
    }

    pub fn notify_audio_starved(&self) {
        if let Some(notifier) = self.notifier.upgrade() {
            notifier.on_audio_sink_starved();
        }
    }
}

/// 音频渲染器接口 - 平台拉模式输出设备的薄封装
pub trait AudioSink: Send {
    /// 初始化设备输出流，callback 用于逐帧消费通知
    fn init(
        &mut self,
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
        callback: RendererHandle,
    ) -> Result<()>;

    /// 提交一帧待播 PCM；设备未就绪时返回 false
    fn play(&mut self, frame: AudioFrame) -> bool;

    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);

    fn set_volume(&mut self, volume: f32);
    fn volume(&self) -> f32;
    fn set_mute(&mut self, mute: bool);
    fn is_muted(&self) -> bool;

    /// 释放设备资源
    fn release(&mut self);
}

/// 视频渲染器接口
pub trait VideoSink: Send {
    /// 初始化渲染表面，format 取 YUV420P / NV12 / RGB24 之一
    fn init(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        callback: RendererHandle,
    ) -> Result<()>;

    /// 呈现一帧，呈现后通过 callback 发出 rendered 通知；失败返回 false
    fn render(&mut self, frame: VideoFrame) -> bool;

    /// 释放渲染资源
    fn release(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingNotifier {
        audio: AtomicUsize,
        video: AtomicUsize,
        starved: AtomicUsize,
    }

    impl CountingNotifier {
        fn new() -> Self {
            Self {
                audio: AtomicUsize::new(0),
                video: AtomicUsize::new(0),
                starved: AtomicUsize::new(0),
            }
        }
    }

    impl RenderedFrameNotifier for CountingNotifier {
        fn on_audio_frame_rendered(&self, _frame: &AudioFrame) {
            self.audio.fetch_add(1, Ordering::SeqCst);
        }

        fn on_video_frame_rendered(&self, _frame: &VideoFrame) {
            self.video.fetch_add(1, Ordering::SeqCst);
        }

        fn on_audio_sink_starved(&self) {
            self.starved.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn dummy_audio_frame() -> AudioFrame {
        AudioFrame {
            pts_us: 0,
            duration_us: 20_000,
            data: vec![0; 64],
            size: 64,
            samples: 16,
            channels: 2,
            sample_rate: 48000,
            bit_depth: 16,
        }
    }

    #[test]
    fn handle_forwards_while_notifier_alive() {
        let notifier = Arc::new(CountingNotifier::new());
        let weak: Weak<dyn RenderedFrameNotifier> = Arc::downgrade(&notifier);
        let handle = RendererHandle::new(weak);

        handle.notify_audio_rendered(&dummy_audio_frame());
        handle.notify_audio_starved();
        assert_eq!(notifier.audio.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.starved.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handle_is_silent_after_notifier_dropped() {
        let notifier = Arc::new(CountingNotifier::new());
        let weak: Weak<dyn RenderedFrameNotifier> = Arc::downgrade(&notifier);
        let handle = RendererHandle::new(weak);

        drop(notifier);
        // 升级失败，不触发任何回调也不 panic
        handle.notify_audio_rendered(&dummy_audio_frame());
        handle.notify_audio_starved();
    }
}

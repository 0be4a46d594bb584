use crate::core::{AudioFrame, PlayerError, Result};
use crate::player::renderer::{AudioSink, RendererHandle};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig, SupportedStreamConfigRange};
use crossbeam::queue::SegQueue;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 音频输出 - 基于 cpal 的拉模式设备渲染器
///
/// play() 只是把帧挂入待播队列；设备回调逐采样消费，消费完一帧即
/// 通过 RendererHandle 通知播放器（推进音频时钟、补投下一帧）。
pub struct CpalAudioOutput {
    stream: Option<Stream>,
    pending: Arc<SegQueue<AudioFrame>>,
    volume: Arc<Mutex<f32>>,
    muted: Arc<AtomicBool>,
}

// cpal::Stream 本身不是 Send，但输出器只在创建它的控制线程中被操作，
// 设备回调由 cpal 自己的线程驱动
unsafe impl Send for CpalAudioOutput {}

impl CpalAudioOutput {
    pub fn new() -> Self {
        Self {
            stream: None,
            pending: Arc::new(SegQueue::new()),
            volume: Arc::new(Mutex::new(1.0)),
            muted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 检查设备配置是否支持目标输出格式
    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0;
        let channels_match = config.channels == supported.channels();
        let format_match = supported.sample_format() == SampleFormat::I16;
        rate_in_range && channels_match && format_match
    }
}

impl Default for CpalAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for CpalAudioOutput {
    fn init(
        &mut self,
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
        callback: RendererHandle,
    ) -> Result<()> {
        info!(
            "初始化音频输出: {} Hz, {} 声道, {} 位",
            sample_rate, channels, bits_per_sample
        );
        if bits_per_sample != 16 {
            return Err(PlayerError::AudioError(format!(
                "仅支持 16 位输出，请求了 {} 位",
                bits_per_sample
            )));
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::AudioError("无法找到音频输出设备".to_string()))?;
        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let supported_configs = device
            .supported_output_configs()
            .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?;
        let supported = supported_configs
            .into_iter()
            .any(|range| Self::is_config_compatible(&config, &range));
        if !supported {
            return Err(PlayerError::AudioError(format!(
                "音频设备不支持 {} Hz / {} 声道 / S16 输出",
                sample_rate, channels
            )));
        }

        let pending = self.pending.clone();
        let volume = self.volume.clone();
        let muted = self.muted.clone();
        let channels_per_frame = channels as usize;

        // 当前正在消费的帧与采样游标，只属于设备回调线程
        let mut current: Option<(AudioFrame, usize)> = None;

        let stream = device
            .build_output_stream(
                &config,
                move |out: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let gain = if muted.load(Ordering::Relaxed) {
                        0.0
                    } else {
                        *volume.lock()
                    };
                    let mut starved = false;

                    for slot in out.iter_mut() {
                        let mut value = None;
                        while value.is_none() {
                            if current.is_none() {
                                current = pending.pop().map(|frame| (frame, 0));
                            }
                            let Some((frame, cursor)) = current.as_mut() else {
                                break;
                            };

                            // 以字节数为准，防御 size 与采样数不一致的帧
                            let total =
                                (frame.data.len() / 2).min(frame.samples * channels_per_frame);
                            if *cursor >= total {
                                // 空帧直接上报并换下一帧
                                let (done, _) = current.take().expect("当前帧存在");
                                callback.notify_audio_rendered(&done);
                                continue;
                            }

                            let byte = *cursor * 2;
                            value = Some(i16::from_le_bytes([
                                frame.data[byte],
                                frame.data[byte + 1],
                            ]));
                            *cursor += 1;

                            if *cursor >= total {
                                // 整帧消费完毕，上报给播放器
                                let (done, _) = current.take().expect("当前帧存在");
                                callback.notify_audio_rendered(&done);
                            }
                        }

                        match value {
                            Some(sample) => *slot = (sample as f32 * gain) as i16,
                            None => {
                                *slot = 0;
                                starved = true;
                            }
                        }
                    }

                    if starved {
                        callback.notify_audio_starved();
                    }
                },
                move |err| {
                    warn!("音频流错误: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::AudioError(format!("创建音频流失败: {}", e)))?;

        stream
            .play()
            .map_err(|e| PlayerError::AudioError(format!("启动音频流失败: {}", e)))?;

        self.stream = Some(stream);
        info!("音频输出已启动");
        Ok(())
    }

    fn play(&mut self, frame: AudioFrame) -> bool {
        if self.stream.is_none() {
            return false;
        }
        self.pending.push(frame);
        true
    }

    fn pause(&mut self) {
        if let Some(ref stream) = self.stream {
            let _ = stream.pause();
            debug!("音频输出已暂停");
        }
    }

    fn resume(&mut self) {
        if let Some(ref stream) = self.stream {
            let _ = stream.play();
            debug!("音频输出已恢复");
        }
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("音频输出已停止");
        }
        // 丢弃未播帧，缓冲随之释放
        while self.pending.pop().is_some() {}
    }

    fn set_volume(&mut self, volume: f32) {
        *self.volume.lock() = volume.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        *self.volume.lock()
    }

    fn set_mute(&mut self, mute: bool) {
        self.muted.store(mute, Ordering::Relaxed);
    }

    fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    fn release(&mut self) {
        self.stop();
    }
}

impl Drop for CpalAudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

use crate::core::{
    AudioFrame, BoundedQueue, PixelFormat, Result, VideoFrame, AUDIO_TARGET_BIT_DEPTH,
    AUDIO_TARGET_CHANNELS, AUDIO_TARGET_SAMPLE_RATE,
};
use crate::player::demuxer::StreamPacket;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::Type as SampleType;
use ffmpeg_next::util::format::{Pixel, Sample};
use ffmpeg_next::{codec, software, threading, util, Rational};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// 队列空/满时的统一退避时长
const BACKOFF: Duration = Duration::from_millis(10);

/// 按流时间基把时间戳换算为微秒
fn rescale_to_us(timestamp: i64, time_base: Rational) -> i64 {
    let num = time_base.numerator() as i128;
    let den = time_base.denominator() as i128;
    if den == 0 {
        return 0;
    }
    (timestamp as i128 * 1_000_000 * num / den) as i64
}

/// 音频帧时长（微秒）= 采样数 / 采样率
fn audio_duration_us(samples: usize, sample_rate: u32) -> i64 {
    if sample_rate == 0 {
        return 0;
    }
    1_000_000 * samples as i64 / sample_rate as i64
}

/// 视频帧时长推导：先看 sample_aspect_ratio（按帧时比处理），
/// 再看流帧率，都没有则按 25fps 取 40ms
fn video_duration_us(aspect: Rational, frame_rate: Option<Rational>) -> i64 {
    if aspect.numerator() > 0 && aspect.denominator() > 0 {
        return 1_000_000 * aspect.denominator() as i64 / aspect.numerator() as i64;
    }
    if let Some(rate) = frame_rate {
        if rate.numerator() > 0 && rate.denominator() > 0 {
            return 1_000_000 * rate.denominator() as i64 / rate.numerator() as i64;
        }
    }
    40_000
}

/// 源像素格式到输出格式的选择：原生支持的三种直通，其余转 RGB24
fn select_dst_format(src: Pixel) -> (PixelFormat, bool) {
    match src {
        Pixel::YUV420P => (PixelFormat::Yuv420p, true),
        Pixel::NV12 => (PixelFormat::Nv12, true),
        Pixel::RGB24 => (PixelFormat::Rgb24, true),
        _ => (PixelFormat::Rgb24, false),
    }
}

// ============= 音频解码器 =============

/// 音频解码上下文 - 解码器与懒初始化的重采样器
struct AudioDecodeCtx {
    decoder: codec::decoder::Audio,
    resampler: Option<software::resampling::Context>,
    resampler_key: Option<(Sample, ChannelLayout, u32)>,
    time_base: Rational,
}

impl AudioDecodeCtx {
    /// 解码一个包并把产出的帧推入输出队列
    /// 返回 false 表示输出队列满，需要回到外层重查背压
    fn decode_packet(&mut self, packet: &ffmpeg::Packet, frame_queue: &BoundedQueue<AudioFrame>) -> bool {
        match self.decoder.send_packet(packet) {
            Ok(()) => {}
            Err(e) => {
                // 送包失败是瞬态错误，跳过该包继续
                warn!("音频包送入解码器失败: {}", e);
                return true;
            }
        }

        loop {
            let mut decoded = util::frame::Audio::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    if let Some(frame) = self.convert_frame(&decoded) {
                        if frame_queue.try_push(frame).is_err() {
                            // 队列满：丢弃该帧（Drop 释放缓冲），回外层退避
                            return false;
                        }
                    }
                }
                Err(ffmpeg::Error::Other { errno: 11 }) => break, // EAGAIN
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => {
                    warn!("音频解码错误（已跳过）: {}", e);
                    break;
                }
            }
        }
        true
    }

    /// 重采样为目标输出格式并换算时间戳
    fn convert_frame(&mut self, decoded: &util::frame::Audio) -> Option<AudioFrame> {
        let key = (decoded.format(), decoded.channel_layout(), decoded.rate());

        // 懒初始化，输入格式变化时重建
        if self.resampler_key != Some(key) {
            debug!(
                "初始化音频重采样器: {}Hz/{}ch -> {}Hz/{}ch S16",
                decoded.rate(),
                decoded.channels(),
                AUDIO_TARGET_SAMPLE_RATE,
                AUDIO_TARGET_CHANNELS
            );
            match software::resampling::Context::get(
                decoded.format(),
                decoded.channel_layout(),
                decoded.rate(),
                Sample::I16(SampleType::Packed),
                ChannelLayout::STEREO,
                AUDIO_TARGET_SAMPLE_RATE,
            ) {
                Ok(resampler) => {
                    self.resampler = Some(resampler);
                    self.resampler_key = Some(key);
                }
                Err(e) => {
                    error!("音频重采样器创建失败: {}", e);
                    return None;
                }
            }
        }

        let mut resampled = util::frame::Audio::empty();
        if let Err(e) = self.resampler.as_mut()?.run(decoded, &mut resampled) {
            error!("音频重采样失败: {}", e);
            return None;
        }

        let samples = resampled.samples();
        if samples == 0 {
            return None;
        }

        // S16 交织立体声：每采样 2 声道 * 2 字节
        let size = samples * AUDIO_TARGET_CHANNELS as usize * 2;
        let data = resampled.data(0)[..size].to_vec();

        let pts_us = decoded
            .timestamp()
            .map(|ts| rescale_to_us(ts, self.time_base))
            .unwrap_or(0);

        Some(AudioFrame {
            pts_us,
            duration_us: audio_duration_us(decoded.samples(), decoded.rate()),
            data,
            size,
            samples,
            channels: AUDIO_TARGET_CHANNELS,
            sample_rate: AUDIO_TARGET_SAMPLE_RATE,
            bit_depth: AUDIO_TARGET_BIT_DEPTH,
        })
    }
}

/// 音频解码器 - 从包队列取包，产出固定目标格式的 PCM 帧
pub struct AudioDecoder {
    packet_queue: Arc<BoundedQueue<StreamPacket>>,
    frame_queue: Arc<BoundedQueue<AudioFrame>>,
    ctx: Arc<Mutex<Option<AudioDecodeCtx>>>,
    running: Arc<AtomicBool>,
    decode_thread: Option<JoinHandle<()>>,
}

impl AudioDecoder {
    /// 由编解码参数和流时间基构建解码器
    pub fn open(
        params: codec::Parameters,
        time_base: Rational,
        packet_queue: Arc<BoundedQueue<StreamPacket>>,
        frame_queue: Arc<BoundedQueue<AudioFrame>>,
    ) -> Result<Self> {
        let context = codec::context::Context::from_parameters(params)?;
        let decoder = context.decoder().audio()?;

        debug!(
            "音频解码器: {} Hz, {} 声道, 格式: {:?}",
            decoder.rate(),
            decoder.channels(),
            decoder.format()
        );

        Ok(Self {
            packet_queue,
            frame_queue,
            ctx: Arc::new(Mutex::new(Some(AudioDecodeCtx {
                decoder,
                resampler: None,
                resampler_key: None,
                time_base,
            }))),
            running: Arc::new(AtomicBool::new(false)),
            decode_thread: None,
        })
    }

    /// 启动解码线程
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let ctx_slot = self.ctx.clone();
        let packet_queue = self.packet_queue.clone();
        let frame_queue = self.frame_queue.clone();
        let running = self.running.clone();

        self.decode_thread = Some(thread::spawn(move || {
            let Some(mut ctx) = ctx_slot.lock().take() else {
                error!("音频解码上下文缺失，线程退出");
                return;
            };
            info!("音频解码线程已启动");

            while running.load(Ordering::SeqCst) {
                if frame_queue.is_full() {
                    thread::sleep(BACKOFF);
                    continue;
                }
                let Some(packet) = packet_queue.try_pop() else {
                    thread::sleep(BACKOFF);
                    continue;
                };
                ctx.decode_packet(&packet.packet, &frame_queue);
            }

            // 上下文放回，供 stop 后再次 start
            *ctx_slot.lock() = Some(ctx);
            info!("音频解码线程已结束");
        }));
    }

    /// 停止并回收解码线程
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.decode_thread.take() {
            let _ = handle.join();
        }
    }

    /// 释放解码器与重采样上下文
    pub fn close(&mut self) {
        self.stop();
        *self.ctx.lock() = None;
        info!("音频解码器已关闭");
    }
}

impl Drop for AudioDecoder {
    fn drop(&mut self) {
        self.close();
    }
}

// ============= 视频解码器 =============

/// 视频解码上下文 - 解码器与懒初始化的缩放器
struct VideoDecodeCtx {
    decoder: codec::decoder::Video,
    scaler: Option<software::scaling::Context>,
    scaler_key: Option<(Pixel, Pixel, u32, u32)>,
    time_base: Rational,
}

// SwsContext 本身不是 Send，但上下文只在单个解码线程中使用
unsafe impl Send for VideoDecodeCtx {}

impl VideoDecodeCtx {
    fn decode_packet(&mut self, packet: &ffmpeg::Packet, frame_queue: &BoundedQueue<VideoFrame>) -> bool {
        match self.decoder.send_packet(packet) {
            Ok(()) => {}
            Err(e) => {
                warn!("视频包送入解码器失败: {}", e);
                return true;
            }
        }

        loop {
            let mut decoded = util::frame::Video::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    if let Some(frame) = self.convert_frame(&decoded) {
                        if frame_queue.try_push(frame).is_err() {
                            return false;
                        }
                    }
                }
                Err(ffmpeg::Error::Other { errno: 11 }) => break, // EAGAIN
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => {
                    // 网络流中部分解码错误可以容忍
                    warn!("视频解码错误（已跳过）: {}", e);
                    break;
                }
            }
        }
        true
    }

    /// 原生格式直通拷贝，其余经缩放器转 RGB24
    fn convert_frame(&mut self, decoded: &util::frame::Video) -> Option<VideoFrame> {
        let width = decoded.width();
        let height = decoded.height();
        if width == 0 || height == 0 {
            return None;
        }

        let src_format = decoded.format();
        let (dst_format, passthrough) = select_dst_format(src_format);

        let pts_us = decoded
            .timestamp()
            .map(|ts| rescale_to_us(ts, self.time_base))
            .unwrap_or(0);
        let duration_us = video_duration_us(decoded.aspect_ratio(), self.decoder.frame_rate());

        let (planes, linesize) = if passthrough {
            copy_planes(decoded, dst_format, width, height)
        } else {
            self.scale_to_rgb24(decoded, width, height)?
        };

        Some(VideoFrame {
            pts_us,
            duration_us,
            width,
            height,
            format: dst_format,
            planes,
            linesize,
        })
    }

    fn scale_to_rgb24(
        &mut self,
        decoded: &util::frame::Video,
        width: u32,
        height: u32,
    ) -> Option<([Vec<u8>; 3], [usize; 3])> {
        let key = (decoded.format(), Pixel::RGB24, width, height);
        if self.scaler_key != Some(key) {
            debug!(
                "重建视频缩放器: {:?} -> RGB24 ({}x{})",
                decoded.format(),
                width,
                height
            );
            match software::scaling::Context::get(
                decoded.format(),
                width,
                height,
                Pixel::RGB24,
                width,
                height,
                software::scaling::Flags::BILINEAR,
            ) {
                Ok(scaler) => {
                    self.scaler = Some(scaler);
                    self.scaler_key = Some(key);
                }
                Err(e) => {
                    error!("视频缩放器创建失败: {}", e);
                    return None;
                }
            }
        }

        let mut rgb = util::frame::Video::empty();
        if let Err(e) = self.scaler.as_mut()?.run(decoded, &mut rgb) {
            error!("像素格式转换失败: {}", e);
            return None;
        }

        Some(copy_planes(&rgb, PixelFormat::Rgb24, width, height))
    }
}

/// 按输出格式逐行拷贝平面数据，产出紧致缓冲与对应行距
fn copy_planes(
    frame: &util::frame::Video,
    format: PixelFormat,
    width: u32,
    height: u32,
) -> ([Vec<u8>; 3], [usize; 3]) {
    let w = width as usize;
    let h = height as usize;

    // (平面行宽, 平面行数)
    let layout: [(usize, usize); 3] = match format {
        PixelFormat::Yuv420p => [(w, h), (w / 2, h / 2), (w / 2, h / 2)],
        PixelFormat::Nv12 => [(w, h), (w, h / 2), (0, 0)],
        PixelFormat::Rgb24 => [(w * 3, h), (0, 0), (0, 0)],
    };

    let mut planes: [Vec<u8>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    let mut linesize = [0usize; 3];

    for (i, &(row_bytes, rows)) in layout.iter().enumerate() {
        if row_bytes == 0 || rows == 0 {
            continue;
        }
        let stride = frame.stride(i);
        let src = frame.data(i);
        let mut plane = vec![0u8; row_bytes * rows];
        for y in 0..rows {
            let src_offset = y * stride;
            let dst_offset = y * row_bytes;
            plane[dst_offset..dst_offset + row_bytes]
                .copy_from_slice(&src[src_offset..src_offset + row_bytes]);
        }
        planes[i] = plane;
        linesize[i] = row_bytes;
    }

    (planes, linesize)
}

/// 视频解码器 - 从包队列取包，产出渲染器可接受格式的图像帧
pub struct VideoDecoder {
    packet_queue: Arc<BoundedQueue<StreamPacket>>,
    frame_queue: Arc<BoundedQueue<VideoFrame>>,
    ctx: Arc<Mutex<Option<VideoDecodeCtx>>>,
    running: Arc<AtomicBool>,
    decode_thread: Option<JoinHandle<()>>,
}

impl VideoDecoder {
    pub fn open(
        params: codec::Parameters,
        time_base: Rational,
        packet_queue: Arc<BoundedQueue<StreamPacket>>,
        frame_queue: Arc<BoundedQueue<VideoFrame>>,
    ) -> Result<Self> {
        let mut context = codec::context::Context::from_parameters(params)?;
        // 帧级多线程解码
        context.set_threading(threading::Config {
            kind: threading::Type::Frame,
            count: 4,
        });
        let decoder = context.decoder().video()?;

        debug!(
            "视频解码器: {}x{}, 格式: {:?}",
            decoder.width(),
            decoder.height(),
            decoder.format()
        );

        Ok(Self {
            packet_queue,
            frame_queue,
            ctx: Arc::new(Mutex::new(Some(VideoDecodeCtx {
                decoder,
                scaler: None,
                scaler_key: None,
                time_base,
            }))),
            running: Arc::new(AtomicBool::new(false)),
            decode_thread: None,
        })
    }

    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let ctx_slot = self.ctx.clone();
        let packet_queue = self.packet_queue.clone();
        let frame_queue = self.frame_queue.clone();
        let running = self.running.clone();

        self.decode_thread = Some(thread::spawn(move || {
            let Some(mut ctx) = ctx_slot.lock().take() else {
                error!("视频解码上下文缺失，线程退出");
                return;
            };
            info!("视频解码线程已启动");

            while running.load(Ordering::SeqCst) {
                if frame_queue.is_full() {
                    thread::sleep(BACKOFF);
                    continue;
                }
                let Some(packet) = packet_queue.try_pop() else {
                    thread::sleep(BACKOFF);
                    continue;
                };
                ctx.decode_packet(&packet.packet, &frame_queue);
            }

            *ctx_slot.lock() = Some(ctx);
            info!("视频解码线程已结束");
        }));
    }

    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.decode_thread.take() {
            let _ = handle.join();
        }
    }

    pub fn close(&mut self) {
        self.stop();
        *self.ctx.lock() = None;
        info!("视频解码器已关闭");
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_converts_time_base_to_us() {
        // 90kHz 时间基：90000 tick = 1 秒
        assert_eq!(rescale_to_us(90_000, Rational::new(1, 90_000)), 1_000_000);
        assert_eq!(rescale_to_us(45_000, Rational::new(1, 90_000)), 500_000);
        // AAC 常见的 1/44100
        assert_eq!(rescale_to_us(44_100, Rational::new(1, 44_100)), 1_000_000);
        // 非法时间基不崩溃
        assert_eq!(rescale_to_us(100, Rational::new(1, 0)), 0);
    }

    #[test]
    fn audio_duration_from_samples() {
        // 1024 采样 @ 48kHz ≈ 21333 微秒
        assert_eq!(audio_duration_us(1024, 48_000), 21_333);
        assert_eq!(audio_duration_us(48_000, 48_000), 1_000_000);
        assert_eq!(audio_duration_us(1024, 0), 0);
    }

    #[test]
    fn video_duration_prefers_aspect_then_rate() {
        // sample_aspect_ratio 按帧时比处理
        assert_eq!(
            video_duration_us(Rational::new(30, 1), Some(Rational::new(25, 1))),
            1_000_000 / 30
        );
        // 无 aspect 时使用帧率
        assert_eq!(
            video_duration_us(Rational::new(0, 1), Some(Rational::new(25, 1))),
            40_000
        );
        assert_eq!(
            video_duration_us(Rational::new(0, 1), Some(Rational::new(30_000, 1001))),
            1_000_000 * 1001 / 30_000
        );
        // 都没有则默认 25fps
        assert_eq!(video_duration_us(Rational::new(0, 1), None), 40_000);
    }

    #[test]
    fn dst_format_passthrough_rules() {
        assert_eq!(select_dst_format(Pixel::YUV420P), (PixelFormat::Yuv420p, true));
        assert_eq!(select_dst_format(Pixel::NV12), (PixelFormat::Nv12, true));
        assert_eq!(select_dst_format(Pixel::RGB24), (PixelFormat::Rgb24, true));
        // 其余格式统一转 RGB24
        assert_eq!(select_dst_format(Pixel::YUV422P), (PixelFormat::Rgb24, false));
        assert_eq!(select_dst_format(Pixel::RGBA), (PixelFormat::Rgb24, false));
    }
}

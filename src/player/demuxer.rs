use crate::core::{
    BoundedQueue, DemuxerState, ErrorCode, MediaInfo, MediaSource, MediaType, PlayerError, Result,
    StreamKind, DURATION_LIVE,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, media, Rational};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// 解封装器状态与错误的回调接口，由播放器实现
pub trait DemuxerCallback: Send + Sync {
    fn on_demuxer_state_changed(&self, _state: DemuxerState) {}
    fn on_demuxer_error(&self, _code: ErrorCode, _message: &str) {}
    fn on_end_of_file(&self) {}
    fn on_seek_completed(&self, _position_us: i64) {}
}

/// 媒体包 - 压缩数据加所属流类别，入队后由消费方负责释放
pub struct StreamPacket {
    pub packet: ffmpeg::Packet,
    pub kind: StreamKind,
}

/// 解码器构造所需的编解码参数
/// Parameters 内部是 libav 的引用计数结构，这里只在控制线程中读取，
/// 包一层以便随 Demuxer 跨线程移动
pub(crate) struct CodecParams(pub(crate) codec::Parameters);

unsafe impl Send for CodecParams {}

/// 读取线程的控制命令
enum DemuxerCommand {
    Seek(i64), // 微秒
    SetRate(f32),
    Stop,
}

/// 解封装器 - 打开媒体源、分离音视频包、响应 seek 与速率调整
///
/// open() 只做探测并发布 MediaInfo；真正的输入上下文在读取线程内
/// 重新打开，线程退出时随之释放。
pub struct Demuxer {
    url: String,
    media_info: MediaInfo,
    audio_params: Option<CodecParams>,
    video_params: Option<CodecParams>,
    audio_time_base: Option<Rational>,
    video_time_base: Option<Rational>,
    audio_packet_queue: Arc<BoundedQueue<StreamPacket>>,
    video_packet_queue: Arc<BoundedQueue<StreamPacket>>,
    callback: Arc<dyn DemuxerCallback>,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<DemuxerState>>,
    command_tx: Option<Sender<DemuxerCommand>>,
    read_thread: Option<JoinHandle<()>>,
    rate: f32,
    loop_on_eof: bool,
}

impl Demuxer {
    /// 打开媒体源并探测流信息
    pub fn open(
        url: &str,
        audio_packet_queue: Arc<BoundedQueue<StreamPacket>>,
        video_packet_queue: Arc<BoundedQueue<StreamPacket>>,
        callback: Arc<dyn DemuxerCallback>,
        loop_on_eof: bool,
    ) -> Result<Self> {
        info!("正在打开媒体源: {}", url);

        let input_ctx = open_input(url)?;

        // 取第一路音频流和第一路视频流
        let audio_stream = input_ctx.streams().best(media::Type::Audio);
        let video_stream = input_ctx.streams().best(media::Type::Video);

        if audio_stream.is_none() && video_stream.is_none() {
            return Err(PlayerError::StreamNotFound(url.to_string()));
        }

        let mut media_info = MediaInfo {
            media_type: MediaType::from_streams(audio_stream.is_some(), video_stream.is_some()),
            ..MediaInfo::default()
        };

        // duration 未知即视为直播流
        let duration_us = input_ctx.duration();
        media_info.duration_ms = if duration_us < 0 {
            DURATION_LIVE
        } else {
            duration_us / 1000
        };

        let mut audio_params = None;
        let mut audio_time_base = None;
        if let Some(ref stream) = audio_stream {
            let params = stream.parameters();
            media_info.audio_codec = params.id().name().to_string();

            let decoder = codec::context::Context::from_parameters(stream.parameters())?
                .decoder()
                .audio()?;
            media_info.audio_sample_rate = decoder.rate();
            media_info.audio_channels = decoder.channels();

            audio_params = Some(CodecParams(params));
            audio_time_base = Some(stream.time_base());
        }

        let mut video_params = None;
        let mut video_time_base = None;
        if let Some(ref stream) = video_stream {
            let params = stream.parameters();
            media_info.video_codec = params.id().name().to_string();

            let decoder = codec::context::Context::from_parameters(stream.parameters())?
                .decoder()
                .video()?;
            media_info.video_width = decoder.width();
            media_info.video_height = decoder.height();

            let fps = stream.avg_frame_rate();
            if fps.denominator() > 0 {
                media_info.fps = fps.numerator() as f64 / fps.denominator() as f64;
            }

            video_params = Some(CodecParams(params));
            video_time_base = Some(stream.time_base());
        }

        debug!("音频流索引: {:?}", audio_stream.map(|s| s.index()));
        debug!("视频流索引: {:?}", video_stream.map(|s| s.index()));
        info!("媒体信息: {:?}", media_info);

        // 探测完成，探测上下文随作用域释放；读取线程会自行重开
        let demuxer = Self {
            url: url.to_string(),
            media_info,
            audio_params,
            video_params,
            audio_time_base,
            video_time_base,
            audio_packet_queue,
            video_packet_queue,
            callback,
            running: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(DemuxerState::Idle)),
            command_tx: None,
            read_thread: None,
            rate: 1.0,
            loop_on_eof,
        };
        demuxer.update_state(DemuxerState::Initialized);
        Ok(demuxer)
    }

    /// 启动读取线程
    pub fn start(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            return;
        }
        self.running.store(true, Ordering::SeqCst);

        let (command_tx, command_rx) = unbounded::<DemuxerCommand>();
        self.command_tx = Some(command_tx);

        let ctx = ReadLoopCtx {
            url: self.url.clone(),
            audio_packet_queue: self.audio_packet_queue.clone(),
            video_packet_queue: self.video_packet_queue.clone(),
            callback: self.callback.clone(),
            running: self.running.clone(),
            state: self.state.clone(),
            is_live: self.media_info.is_live(),
            loop_on_eof: self.loop_on_eof,
            rate: self.rate,
        };

        self.read_thread = Some(thread::spawn(move || {
            // 读取循环不允许把 panic 抛出线程：捕获后按异常错误码上报
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                read_loop(&ctx, &command_rx);
            }));
            if result.is_err() {
                ctx.notify_error(ErrorCode::DemuxerException, "解封装循环发生未预期的异常");
                ctx.update_state(DemuxerState::Error);
            }
        }));
        info!("解封装线程已启动");
    }

    /// 请求跳转到指定位置（微秒）
    pub fn seek(&self, position_us: i64) {
        self.update_state(DemuxerState::Seeking);
        if let Some(ref tx) = self.command_tx {
            if tx.send(DemuxerCommand::Seek(position_us)).is_err() {
                warn!("Seek 命令发送失败，读取线程可能已退出");
            }
        }
        info!("请求跳转到: {} 微秒", position_us);
    }

    /// 调整读取节奏（粗粒度限速，不参与精确定时）
    pub fn set_rate(&mut self, rate: f32) {
        self.rate = rate;
        if let Some(ref tx) = self.command_tx {
            let _ = tx.send(DemuxerCommand::SetRate(rate));
        }
        info!("播放速率设置为: {}", rate);
    }

    /// 停止并回收读取线程
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(ref tx) = self.command_tx {
            let _ = tx.send(DemuxerCommand::Stop);
        }
        if let Some(handle) = self.read_thread.take() {
            let _ = handle.join();
        }
        self.command_tx = None;
        self.update_state(DemuxerState::Stopped);
        info!("解封装线程已停止");
    }

    pub fn is_live(&self) -> bool {
        self.media_info.is_live()
    }

    pub fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    pub fn state(&self) -> DemuxerState {
        *self.state.lock()
    }

    pub(crate) fn take_audio_params(&mut self) -> Option<(codec::Parameters, Rational)> {
        let params = self.audio_params.take()?;
        Some((params.0, self.audio_time_base?))
    }

    pub(crate) fn take_video_params(&mut self) -> Option<(codec::Parameters, Rational)> {
        let params = self.video_params.take()?;
        Some((params.0, self.video_time_base?))
    }

    fn update_state(&self, state: DemuxerState) {
        *self.state.lock() = state;
        self.callback.on_demuxer_state_changed(state);
    }
}

impl Drop for Demuxer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 读取线程携带的上下文
struct ReadLoopCtx {
    url: String,
    audio_packet_queue: Arc<BoundedQueue<StreamPacket>>,
    video_packet_queue: Arc<BoundedQueue<StreamPacket>>,
    callback: Arc<dyn DemuxerCallback>,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<DemuxerState>>,
    is_live: bool,
    loop_on_eof: bool,
    rate: f32,
}

impl ReadLoopCtx {
    fn update_state(&self, state: DemuxerState) {
        *self.state.lock() = state;
        self.callback.on_demuxer_state_changed(state);
    }

    fn notify_error(&self, code: ErrorCode, message: &str) {
        error!("{}", message);
        self.callback.on_demuxer_error(code, message);
    }
}

/// 按媒体源类型打开输入上下文，网络流附带优化选项
fn open_input(url: &str) -> Result<format::context::Input> {
    let source = MediaSource::from_url(url);
    if source.is_network_stream() {
        info!("检测到网络流，应用网络读取选项");

        let mut options = ffmpeg::Dictionary::new();
        // discardcorrupt: 丢弃损坏帧；genpts: 补生成 PTS；nobuffer: 降低缓冲延迟
        options.set("fflags", "+discardcorrupt+genpts+nobuffer");
        options.set("analyzeduration", "5000000");
        options.set("probesize", "10000000");
        options.set("rw_timeout", "8000000");
        options.set("reconnect", "1");
        options.set("reconnect_streamed", "1");
        options.set("reconnect_delay_max", "4");

        format::input_with_dictionary(&url, options)
            .map_err(|e| PlayerError::NetworkError(format!("无法打开网络流 {}: {}", url, e)))
    } else {
        format::input(&url).map_err(|e| PlayerError::OpenError(format!("{}: {}", url, e)))
    }
}

/// 读取循环（独立线程）
///
/// 每轮：先排空控制命令，再处理挂起的 seek，然后在背压允许时读取
/// 一个包分发到对应队列。所有休眠不超过 10ms，保证停止延迟有界。
fn read_loop(ctx: &ReadLoopCtx, command_rx: &Receiver<DemuxerCommand>) {
    let mut input = match open_input(&ctx.url) {
        Ok(input) => input,
        Err(e) => {
            ctx.notify_error(ErrorCode::DemuxerOpenFailed, &format!("读取线程打开失败: {}", e));
            ctx.update_state(DemuxerState::Error);
            return;
        }
    };

    let audio_index = input
        .streams()
        .best(media::Type::Audio)
        .map(|s| s.index());
    let video_index = input
        .streams()
        .best(media::Type::Video)
        .map(|s| s.index());

    if audio_index.is_none() && video_index.is_none() {
        ctx.notify_error(ErrorCode::DemuxerFindStreamFailed, "读取线程未找到音视频流");
        ctx.update_state(DemuxerState::Error);
        return;
    }

    ctx.update_state(DemuxerState::Running);

    let mut pending_seek: Option<i64> = None;
    let mut rate = ctx.rate;
    let mut packet_count: usize = 0;

    while ctx.running.load(Ordering::SeqCst) {
        // 非阻塞排空命令，多个 seek 只保留最后一个
        loop {
            match command_rx.try_recv() {
                Ok(DemuxerCommand::Seek(target_us)) => {
                    if let Some(old) = pending_seek.replace(target_us) {
                        debug!("合并旧的 seek 命令: {} 微秒", old);
                    }
                }
                Ok(DemuxerCommand::SetRate(new_rate)) => rate = new_rate,
                Ok(DemuxerCommand::Stop) => {
                    ctx.running.store(false, Ordering::SeqCst);
                }
                Err(_) => break,
            }
        }
        if !ctx.running.load(Ordering::SeqCst) {
            break;
        }

        // 处理挂起的 seek：按上界范围回退到目标之前的关键帧
        if let Some(target_us) = pending_seek.take() {
            match input.seek(target_us, ..target_us) {
                Ok(()) => {
                    info!("跳转完成: {} 微秒", target_us);
                    ctx.callback.on_seek_completed(target_us);
                }
                Err(e) => {
                    // seek 失败不致命，清除标志继续播放
                    error!("Seek 失败: {}", e);
                }
            }
            ctx.update_state(DemuxerState::Running);
            continue;
        }

        // 背压：任一包队列满则等待消费
        if ctx.audio_packet_queue.is_full() || ctx.video_packet_queue.is_full() {
            thread::sleep(Duration::from_millis(10));
            continue;
        }

        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut input) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => {
                if !ctx.is_live && ctx.loop_on_eof {
                    // 循环播放：回到文件开头继续读
                    info!("文件结束，跳回开头循环播放");
                    if let Err(e) = input.seek(0, ..0) {
                        error!("回跳开头失败: {}", e);
                        break;
                    }
                    continue;
                }
                info!("文件结束（共读取 {} 个包）", packet_count);
                ctx.callback.on_end_of_file();
                break;
            }
            Err(e) => {
                // 瞬态读取错误：上报后退避重试
                ctx.notify_error(ErrorCode::DemuxerReadFailed, &format!("读取包失败: {}", e));
                thread::sleep(Duration::from_millis(10));
                continue;
            }
        }

        let stream_index = packet.stream();
        let kind = if Some(stream_index) == audio_index {
            Some(StreamKind::Audio)
        } else if Some(stream_index) == video_index {
            Some(StreamKind::Video)
        } else {
            None
        };

        if let Some(kind) = kind {
            packet_count += 1;
            let queue = match kind {
                StreamKind::Audio => &ctx.audio_packet_queue,
                StreamKind::Video => &ctx.video_packet_queue,
            };
            // 背压检查和入队之间可能被填满，失败即丢弃该包
            if queue.try_push(StreamPacket { packet, kind }).is_err() {
                debug!("包队列已满，丢弃一个 {:?} 包", kind);
            }

            // 粗粒度限速：高倍速时不再刻意放慢读取
            if rate < 2.0 && rate > 0.0 {
                thread::sleep(Duration::from_micros((10_000.0 / rate) as u64));
            }
        }
    }

    // 输入上下文随线程退出释放
    info!("解封装线程退出（共读取 {} 个包）", packet_count);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopCallback;
    impl DemuxerCallback for NoopCallback {}

    #[test]
    fn open_missing_file_is_fatal() {
        ffmpeg::init().ok();
        let audio_q = Arc::new(BoundedQueue::new(4));
        let video_q = Arc::new(BoundedQueue::new(4));
        let result = Demuxer::open(
            "/nonexistent/no_such_file.mp4",
            audio_q,
            video_q,
            Arc::new(NoopCallback),
            false,
        );
        assert!(result.is_err());
    }
}

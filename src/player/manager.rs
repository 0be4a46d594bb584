use crate::core::{
    AudioFrame, BoundedQueue, DemuxerState, ErrorCode, MediaInfo, PixelFormat, PlaybackClock,
    PlayerError, PlayerState, Result, VideoFrame, AUDIO_TARGET_BIT_DEPTH, AUDIO_TARGET_CHANNELS,
    AUDIO_TARGET_SAMPLE_RATE,
};
use crate::player::decoder::{AudioDecoder, VideoDecoder};
use crate::player::demuxer::{Demuxer, DemuxerCallback, StreamPacket};
use crate::player::renderer::{AudioSink, RenderedFrameNotifier, RendererHandle, VideoSink};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// 缓冲区容量
const PACKET_QUEUE_CAPACITY: usize = 100;
const FRAME_QUEUE_CAPACITY: usize = 30;

// 音视频同步阈值（微秒）
const SYNC_THRESHOLD_US: i64 = 5_000;
// 视频追赶音频时单帧最长等待
const MAX_CATCHUP_WAIT_US: i64 = 100_000;

// 启动预缓冲：最少音频帧数与等待上限
const PREBUFFER_MIN_FRAMES: usize = 30;
const PREBUFFER_TIMEOUT: Duration = Duration::from_secs(1);

/// 客户端回调接口 - 状态、进度、错误、媒体信息与帧观察
pub trait PlayerCallback: Send + Sync {
    fn on_player_state_changed(&self, state: PlayerState);
    fn on_playback_progress(&self, position_seconds: f64, duration_seconds: f64);
    fn on_error(&self, code: ErrorCode, message: &str);
    fn on_media_info(&self, info: &MediaInfo);

    /// 可选的帧观察回调
    fn on_video_frame(&self, _frame: &VideoFrame) {}
    fn on_audio_frame(&self, _frame: &AudioFrame) {}
}

/// 播放器配置
#[derive(Debug, Clone, Copy)]
pub struct PlayerConfig {
    /// 非直播源读到文件末尾时是否跳回开头循环播放。
    /// 关闭（默认）时解封装器停止读取，播放在最后一帧后进入 Completed。
    pub loop_on_eof: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self { loop_on_eof: false }
    }
}

/// 计算视频帧的同步延迟（微秒）
///
/// 无音频时以墙钟流逝时间为基准；有音频时向音频主时钟对齐，
/// 正向等待最多 100ms，负值原样返回供丢帧判定。
fn sync_delay(video_pts_us: i64, has_audio: bool, audio_clock_us: i64, elapsed_us: i64) -> i64 {
    if !has_audio {
        return video_pts_us - elapsed_us;
    }
    let diff = video_pts_us - audio_clock_us;
    if diff > 0 {
        diff.min(MAX_CATCHUP_WAIT_US)
    } else {
        diff
    }
}

/// 视频落后超过两倍同步阈值时丢帧
fn should_drop_frame(delay_us: i64) -> bool {
    delay_us < -2 * SYNC_THRESHOLD_US
}

/// 末尾判定：帧时间戳越过总时长、队列已空且非直播
fn reached_end(pts_us: i64, duration_us: i64, queue_empty: bool, is_live: bool) -> bool {
    !is_live && duration_us >= 0 && pts_us >= duration_us && queue_empty
}

fn state_from_u8(value: u8) -> PlayerState {
    match value {
        0 => PlayerState::Idle,
        1 => PlayerState::Initialized,
        2 => PlayerState::Prepared,
        3 => PlayerState::Started,
        4 => PlayerState::Paused,
        5 => PlayerState::Stopped,
        6 => PlayerState::Completed,
        _ => PlayerState::Error,
    }
}

fn state_to_u8(state: PlayerState) -> u8 {
    match state {
        PlayerState::Idle => 0,
        PlayerState::Initialized => 1,
        PlayerState::Prepared => 2,
        PlayerState::Started => 3,
        PlayerState::Paused => 4,
        PlayerState::Stopped => 5,
        PlayerState::Completed => 6,
        PlayerState::Error => 7,
    }
}

/// 播放器共享核心 - 渲染线程、解封装线程与控制线程共同引用的部分
///
/// 渲染器经由弱引用回调到这里，Player 销毁后回调自然失效。
struct PlayerCore {
    state: AtomicU8,
    clock: PlaybackClock,
    media_info: Mutex<MediaInfo>,
    callback: Arc<dyn PlayerCallback>,
    audio_sink: Mutex<Option<Box<dyn AudioSink>>>,
    video_sink: Mutex<Option<Box<dyn VideoSink>>>,
    audio_packet_queue: Arc<BoundedQueue<StreamPacket>>,
    video_packet_queue: Arc<BoundedQueue<StreamPacket>>,
    audio_frame_queue: Arc<BoundedQueue<AudioFrame>>,
    video_frame_queue: Arc<BoundedQueue<VideoFrame>>,
    playing: AtomicBool,
}

impl PlayerCore {
    fn state(&self) -> PlayerState {
        state_from_u8(self.state.load(Ordering::SeqCst))
    }

    /// 原子更新状态；发生变化时通知回调并返回 true
    fn update_state(&self, new_state: PlayerState) -> bool {
        let old = self.state.swap(state_to_u8(new_state), Ordering::SeqCst);
        if old != state_to_u8(new_state) {
            debug!("播放器状态变更: {:?} -> {:?}", state_from_u8(old), new_state);
            self.callback.on_player_state_changed(new_state);
            true
        } else {
            false
        }
    }

    fn media_info(&self) -> MediaInfo {
        self.media_info.lock().clone()
    }

    fn emit_progress(&self, position_us: i64) {
        let duration_ms = self.media_info.lock().duration_ms;
        self.callback.on_playback_progress(
            position_us as f64 / 1_000_000.0,
            duration_ms.max(0) as f64 / 1000.0,
        );
    }

    /// 从帧队列取下一帧音频交给渲染器
    ///
    /// 渲染器锁用 try_lock：此函数会在音频设备回调线程里被调用，
    /// 控制线程恰好持锁时放弃本次提交，欠载通知会再次触发。
    fn submit_next_audio_frame(&self) -> bool {
        let Some(mut sink_guard) = self.audio_sink.try_lock() else {
            return false;
        };
        let Some(sink) = sink_guard.as_mut() else {
            return false;
        };
        let Some(frame) = self.audio_frame_queue.try_pop() else {
            return false;
        };
        sink.play(frame)
    }

    fn clear_all_queues(&self) {
        self.audio_packet_queue.clear();
        self.video_packet_queue.clear();
        self.audio_frame_queue.clear();
        self.video_frame_queue.clear();
    }
}

impl RenderedFrameNotifier for PlayerCore {
    fn on_audio_frame_rendered(&self, frame: &AudioFrame) {
        // 音频主时钟推进到帧尾
        self.clock.set_audio_clock(frame.pts_us + frame.duration_us);
        self.callback.on_audio_frame(frame);
        self.emit_progress(self.clock.audio_clock());

        let info = self.media_info();
        if reached_end(
            frame.pts_us,
            info.duration_us(),
            self.audio_frame_queue.is_empty(),
            info.is_live(),
        ) {
            self.playing.store(false, Ordering::SeqCst);
            if self.update_state(PlayerState::Completed) {
                self.callback.on_playback_progress(1.0, 1.0);
                info!("播放完成");
            }
            return;
        }

        self.submit_next_audio_frame();
    }

    fn on_video_frame_rendered(&self, frame: &VideoFrame) {
        self.clock.set_video_clock(frame.pts_us + frame.duration_us);
        self.callback.on_video_frame(frame);

        // 无音频时进度由视频帧驱动
        if !self.media_info().has_audio() {
            self.emit_progress(self.clock.video_clock());
        }
    }

    fn on_audio_sink_starved(&self) {
        // 设备欠载：解码可能刚追上来，补投一帧让消费链恢复
        if self.state() == PlayerState::Started {
            self.submit_next_audio_frame();
        }
    }
}

impl DemuxerCallback for PlayerCore {
    fn on_demuxer_state_changed(&self, state: DemuxerState) {
        debug!("解封装器状态: {:?}", state);
    }

    fn on_demuxer_error(&self, code: ErrorCode, message: &str) {
        self.callback.on_error(code, message);
        // 打开/找流失败与读取线程异常对本次会话是致命的；
        // 普通读取错误由解封装器自行重试
        if matches!(
            code,
            ErrorCode::DemuxerOpenFailed
                | ErrorCode::DemuxerFindStreamFailed
                | ErrorCode::DemuxerException
        ) {
            self.playing.store(false, Ordering::SeqCst);
            self.update_state(PlayerState::Error);
        }
    }

    fn on_end_of_file(&self) {
        info!("解封装到达流末尾");
    }

    fn on_seek_completed(&self, position_us: i64) {
        info!("Seek 完成: {} 微秒", position_us);
    }
}

/// 视频播放线程：按同步延迟呈现或丢弃帧
fn video_play_loop(core: Arc<PlayerCore>) {
    info!("视频播放线程已启动");

    let info = core.media_info();
    let has_audio = info.has_audio();
    let duration_us = info.duration_us();
    let is_live = info.is_live();

    while core.playing.load(Ordering::SeqCst) {
        let Some(frame) = core.video_frame_queue.try_pop() else {
            thread::sleep(Duration::from_millis(10));
            continue;
        };

        let delay = sync_delay(
            frame.pts_us,
            has_audio,
            core.clock.audio_clock(),
            core.clock.elapsed_us(),
        );

        if delay > 0 {
            thread::sleep(Duration::from_micros(delay as u64));
        } else if should_drop_frame(delay) {
            // 落后音频过多，丢帧不渲染（平面缓冲随 Drop 释放）
            debug!("丢弃视频帧: PTS={} 微秒, 延迟={} 微秒", frame.pts_us, delay);
            continue;
        }

        let frame_pts = frame.pts_us;
        let rendered = {
            let mut sink_guard = core.video_sink.lock();
            match sink_guard.as_mut() {
                Some(sink) => sink.render(frame),
                None => false,
            }
        };
        if !rendered {
            error!("渲染视频帧失败");
        }

        // 无音频的非直播源：最后一帧渲染完且队列已空则播放完成
        if !has_audio
            && reached_end(
                frame_pts,
                duration_us,
                core.video_frame_queue.is_empty(),
                is_live,
            )
        {
            core.playing.store(false, Ordering::SeqCst);
            if core.update_state(PlayerState::Completed) {
                core.callback.on_playback_progress(1.0, 1.0);
                info!("播放完成");
            }
        }
    }

    info!("视频播放线程已退出");
}

/// 播放器 - 整条流水线的编排者
///
/// 持有解封装器、解码器、渲染器与四条缓冲队列；
/// 状态为原子快照，复合变更经 state_mutex 串行化。
pub struct Player {
    core: Arc<PlayerCore>,
    config: PlayerConfig,
    state_mutex: Mutex<()>,
    demuxer: Option<Demuxer>,
    audio_decoder: Option<AudioDecoder>,
    video_decoder: Option<VideoDecoder>,
    video_play_thread: Option<JoinHandle<()>>,
}

impl Player {
    pub fn new(
        callback: Arc<dyn PlayerCallback>,
        audio_sink: Option<Box<dyn AudioSink>>,
        video_sink: Option<Box<dyn VideoSink>>,
        config: PlayerConfig,
    ) -> Self {
        let core = Arc::new(PlayerCore {
            state: AtomicU8::new(state_to_u8(PlayerState::Idle)),
            clock: PlaybackClock::new(),
            media_info: Mutex::new(MediaInfo::default()),
            callback,
            audio_sink: Mutex::new(audio_sink),
            video_sink: Mutex::new(video_sink),
            audio_packet_queue: Arc::new(BoundedQueue::new(PACKET_QUEUE_CAPACITY)),
            video_packet_queue: Arc::new(BoundedQueue::new(PACKET_QUEUE_CAPACITY)),
            audio_frame_queue: Arc::new(BoundedQueue::new(FRAME_QUEUE_CAPACITY)),
            video_frame_queue: Arc::new(BoundedQueue::new(FRAME_QUEUE_CAPACITY)),
            playing: AtomicBool::new(false),
        });

        info!("播放器初始化完成");
        Self {
            core,
            config,
            state_mutex: Mutex::new(()),
            demuxer: None,
            audio_decoder: None,
            video_decoder: None,
            video_play_thread: None,
        }
    }

    /// 打开媒体源，探测媒体信息并准备解码器与渲染器
    pub fn open(&mut self, url: &str) -> Result<MediaInfo> {
        let state = self.core.state();
        if !matches!(state, PlayerState::Idle | PlayerState::Stopped) {
            return Err(PlayerError::InvalidState {
                operation: "open",
                state,
            });
        }
        let _guard = self.state_mutex.lock();

        self.core.update_state(PlayerState::Initialized);

        let demuxer_callback: Arc<dyn DemuxerCallback> = self.core.clone();
        let mut demuxer = match Demuxer::open(
            url,
            self.core.audio_packet_queue.clone(),
            self.core.video_packet_queue.clone(),
            demuxer_callback,
            self.config.loop_on_eof,
        ) {
            Ok(demuxer) => demuxer,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        let info = demuxer.media_info().clone();
        *self.core.media_info.lock() = info.clone();
        self.core.callback.on_media_info(&info);

        // 创建解码器
        if info.has_audio() {
            let Some((params, time_base)) = demuxer.take_audio_params() else {
                let e = PlayerError::DecoderInitFailed("缺少音频编解码参数".to_string());
                self.fail(&e);
                return Err(e);
            };
            match AudioDecoder::open(
                params,
                time_base,
                self.core.audio_packet_queue.clone(),
                self.core.audio_frame_queue.clone(),
            ) {
                Ok(decoder) => self.audio_decoder = Some(decoder),
                Err(e) => {
                    self.fail(&e);
                    return Err(e);
                }
            }
        }

        if info.has_video() {
            let Some((params, time_base)) = demuxer.take_video_params() else {
                let e = PlayerError::DecoderInitFailed("缺少视频编解码参数".to_string());
                self.fail(&e);
                return Err(e);
            };
            match VideoDecoder::open(
                params,
                time_base,
                self.core.video_packet_queue.clone(),
                self.core.video_frame_queue.clone(),
            ) {
                Ok(decoder) => self.video_decoder = Some(decoder),
                Err(e) => {
                    self.fail(&e);
                    return Err(e);
                }
            }
        }

        // 初始化渲染器，回调走弱引用句柄
        let notifier: std::sync::Weak<dyn RenderedFrameNotifier> = Arc::downgrade(&self.core);
        let handle = RendererHandle::new(notifier);
        if info.has_audio() {
            if let Some(sink) = self.core.audio_sink.lock().as_mut() {
                if let Err(e) = sink.init(
                    AUDIO_TARGET_SAMPLE_RATE,
                    AUDIO_TARGET_CHANNELS,
                    AUDIO_TARGET_BIT_DEPTH,
                    handle.clone(),
                ) {
                    self.fail(&e);
                    return Err(e);
                }
            }
        }
        if info.has_video() {
            if let Some(sink) = self.core.video_sink.lock().as_mut() {
                if let Err(e) = sink.init(
                    info.video_width,
                    info.video_height,
                    PixelFormat::Yuv420p,
                    handle.clone(),
                ) {
                    self.fail(&e);
                    return Err(e);
                }
            }
        }

        self.demuxer = Some(demuxer);
        self.core.update_state(PlayerState::Prepared);
        info!("媒体准备完成: {}", url);
        Ok(info)
    }

    /// 开始播放
    ///
    /// 有音频时先预缓冲至少 30 帧（上限 1 秒）；超时且无帧可播则
    /// 回滚整条流水线并返回错误，状态保持 Prepared。
    pub fn start(&mut self) -> Result<()> {
        let state = self.core.state();
        if state != PlayerState::Prepared {
            return Err(PlayerError::InvalidState {
                operation: "start",
                state,
            });
        }
        let _guard = self.state_mutex.lock();

        let Some(demuxer) = self.demuxer.as_mut() else {
            return Err(PlayerError::Other("没有打开的媒体源".to_string()));
        };
        demuxer.start();
        if let Some(decoder) = self.audio_decoder.as_mut() {
            decoder.start();
        }
        if let Some(decoder) = self.video_decoder.as_mut() {
            decoder.start();
        }

        // 重置时钟
        self.core.clock.reset_to(0);
        self.core.clock.mark_start(0);
        self.core.playing.store(true, Ordering::SeqCst);

        let info = self.core.media_info();

        // 启动视频播放线程
        if info.has_video() && self.core.video_sink.lock().is_some() {
            let core = self.core.clone();
            self.video_play_thread = Some(thread::spawn(move || video_play_loop(core)));
        }

        // 音频预缓冲后播第一帧，其余由消费回调接力提交
        if info.has_audio() {
            let deadline = Instant::now() + PREBUFFER_TIMEOUT;
            while self.core.audio_frame_queue.len() < PREBUFFER_MIN_FRAMES
                && self.core.playing.load(Ordering::SeqCst)
                && Instant::now() < deadline
            {
                thread::sleep(Duration::from_millis(10));
            }

            if self.core.audio_frame_queue.is_empty() {
                warn!("等待音频帧超时，回滚启动");
                self.halt_pipeline();
                return Err(PlayerError::AudioError("音频预缓冲超时".to_string()));
            }
            self.core.submit_next_audio_frame();
        }

        self.core.update_state(PlayerState::Started);
        info!("开始播放");
        Ok(())
    }

    /// 暂停播放
    pub fn pause(&mut self) -> Result<()> {
        let state = self.core.state();
        if state != PlayerState::Started {
            return Err(PlayerError::InvalidState {
                operation: "pause",
                state,
            });
        }
        let _guard = self.state_mutex.lock();

        if let Some(sink) = self.core.audio_sink.lock().as_mut() {
            sink.pause();
        }
        self.core.playing.store(false, Ordering::SeqCst);
        if let Some(handle) = self.video_play_thread.take() {
            let _ = handle.join();
        }

        self.core.update_state(PlayerState::Paused);
        info!("播放已暂停");
        Ok(())
    }

    /// 恢复播放
    pub fn resume(&mut self) -> Result<()> {
        let state = self.core.state();
        if state != PlayerState::Paused {
            return Err(PlayerError::InvalidState {
                operation: "resume",
                state,
            });
        }
        let _guard = self.state_mutex.lock();

        if let Some(sink) = self.core.audio_sink.lock().as_mut() {
            sink.resume();
        }

        // 重整墙钟基准，暂停期间的流逝不计入位置
        let info = self.core.media_info();
        let position = self.core.clock.position_us(info.media_type);
        self.core.clock.mark_start(position);

        self.core.playing.store(true, Ordering::SeqCst);
        if info.has_video() && self.core.video_sink.lock().is_some() {
            let core = self.core.clone();
            self.video_play_thread = Some(thread::spawn(move || video_play_loop(core)));
        }

        self.core.update_state(PlayerState::Started);
        info!("播放已恢复");
        Ok(())
    }

    /// 跳转到指定位置（微秒）
    ///
    /// 清空全部队列、请求解封装器按关键帧回退跳转、重置时钟；
    /// 跳转前后播放状态保持不变。
    pub fn seek(&mut self, position_us: i64) -> Result<()> {
        let state = self.core.state();
        if !matches!(
            state,
            PlayerState::Started | PlayerState::Paused | PlayerState::Completed
        ) {
            return Err(PlayerError::InvalidState {
                operation: "seek",
                state,
            });
        }
        let _guard = self.state_mutex.lock();

        let was_playing = state == PlayerState::Started;
        if was_playing {
            if let Some(sink) = self.core.audio_sink.lock().as_mut() {
                sink.pause();
            }
            self.core.playing.store(false, Ordering::SeqCst);
            if let Some(handle) = self.video_play_thread.take() {
                let _ = handle.join();
            }
        }

        // 丢弃所有在途的包与帧
        self.core.clear_all_queues();

        if let Some(demuxer) = self.demuxer.as_ref() {
            demuxer.seek(position_us);
        }

        self.core.clock.reset_to(position_us);
        self.core.clock.mark_start(position_us);

        if was_playing {
            if let Some(sink) = self.core.audio_sink.lock().as_mut() {
                sink.resume();
            }
            self.core.playing.store(true, Ordering::SeqCst);
            let info = self.core.media_info();
            if info.has_video() && self.core.video_sink.lock().is_some() {
                let core = self.core.clone();
                self.video_play_thread = Some(thread::spawn(move || video_play_loop(core)));
            }
            self.core.submit_next_audio_frame();
        }

        info!("跳转到: {} 微秒", position_us);
        Ok(())
    }

    /// 停止播放，回收全部流水线线程
    pub fn stop(&mut self) -> Result<()> {
        let state = self.core.state();
        if matches!(state, PlayerState::Idle | PlayerState::Stopped) {
            return Ok(());
        }
        let _guard = self.state_mutex.lock();

        self.halt_pipeline();
        if let Some(sink) = self.core.audio_sink.lock().as_mut() {
            sink.stop();
        }

        self.core.clock.reset_to(0);
        self.core.clock.mark_start(0);
        self.core.update_state(PlayerState::Stopped);
        info!("播放已停止");
        Ok(())
    }

    /// 关闭播放器，释放解码器与渲染器资源，回到 Idle
    pub fn close(&mut self) -> Result<()> {
        self.stop()?;
        let _guard = self.state_mutex.lock();

        if let Some(mut decoder) = self.audio_decoder.take() {
            decoder.close();
        }
        if let Some(mut decoder) = self.video_decoder.take() {
            decoder.close();
        }
        self.demuxer = None;

        if let Some(sink) = self.core.audio_sink.lock().as_mut() {
            sink.release();
        }
        if let Some(sink) = self.core.video_sink.lock().as_mut() {
            sink.release();
        }

        self.core.clear_all_queues();
        self.core.update_state(PlayerState::Idle);
        info!("播放器已关闭");
        Ok(())
    }

    pub fn set_volume(&self, volume: f32) {
        if let Some(sink) = self.core.audio_sink.lock().as_mut() {
            sink.set_volume(volume);
        }
    }

    pub fn volume(&self) -> f32 {
        self.core
            .audio_sink
            .lock()
            .as_ref()
            .map(|sink| sink.volume())
            .unwrap_or(0.0)
    }

    pub fn set_mute(&self, mute: bool) {
        if let Some(sink) = self.core.audio_sink.lock().as_mut() {
            sink.set_mute(mute);
        }
    }

    pub fn is_muted(&self) -> bool {
        self.core
            .audio_sink
            .lock()
            .as_ref()
            .map(|sink| sink.is_muted())
            .unwrap_or(false)
    }

    /// 设置播放速率
    ///
    /// 只调节解封装器的读取节奏（粗粒度限速），渲染侧不变速。
    pub fn set_rate(&mut self, rate: f32) {
        self.core.clock.set_rate(rate);
        if let Some(demuxer) = self.demuxer.as_mut() {
            demuxer.set_rate(rate);
        }
    }

    pub fn rate(&self) -> f32 {
        self.core.clock.rate()
    }

    pub fn state(&self) -> PlayerState {
        self.core.state()
    }

    /// 总时长（微秒），直播源返回负值哨兵
    pub fn duration_us(&self) -> i64 {
        self.core.media_info().duration_us()
    }

    /// 当前播放位置（微秒）
    pub fn position_us(&self) -> i64 {
        let info = self.core.media_info();
        self.core.clock.position_us(info.media_type)
    }

    /// 报告错误并进入 Error 状态
    fn fail(&self, error: &PlayerError) {
        error!("{}", error);
        self.core.callback.on_error(error.code(), &error.to_string());
        self.core.update_state(PlayerState::Error);
    }

    /// 停掉流水线所有线程并清空队列，不触碰状态机
    fn halt_pipeline(&mut self) {
        self.core.playing.store(false, Ordering::SeqCst);
        if let Some(handle) = self.video_play_thread.take() {
            let _ = handle.join();
        }
        if let Some(decoder) = self.audio_decoder.as_mut() {
            decoder.stop();
        }
        if let Some(decoder) = self.video_decoder.as_mut() {
            decoder.stop();
        }
        if let Some(demuxer) = self.demuxer.as_mut() {
            demuxer.stop();
        }
        self.core.clear_all_queues();
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.halt_pipeline();
        if let Some(sink) = self.core.audio_sink.lock().as_mut() {
            sink.release();
        }
        if let Some(sink) = self.core.video_sink.lock().as_mut() {
            sink.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingCallback {
        states: Mutex<Vec<PlayerState>>,
        errors: Mutex<Vec<ErrorCode>>,
        progress: AtomicUsize,
    }

    impl PlayerCallback for RecordingCallback {
        fn on_player_state_changed(&self, state: PlayerState) {
            self.states.lock().push(state);
        }

        fn on_playback_progress(&self, _position_seconds: f64, _duration_seconds: f64) {
            self.progress.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, code: ErrorCode, _message: &str) {
            self.errors.lock().push(code);
        }

        fn on_media_info(&self, _info: &MediaInfo) {}
    }

    fn make_player(callback: Arc<RecordingCallback>) -> Player {
        Player::new(callback, None, None, PlayerConfig::default())
    }

    #[test]
    fn sync_delay_without_audio_uses_wall_clock() {
        // 视频领先墙钟 15ms -> 等 15ms
        assert_eq!(sync_delay(1_015_000, false, 0, 1_000_000), 15_000);
        // 视频落后 -> 负值
        assert_eq!(sync_delay(990_000, false, 0, 1_000_000), -10_000);
    }

    #[test]
    fn sync_delay_with_audio_clamps_catchup() {
        // 正向等待封顶 100ms
        assert_eq!(sync_delay(2_000_000, true, 1_000_000, 0), MAX_CATCHUP_WAIT_US);
        assert_eq!(sync_delay(1_050_000, true, 1_000_000, 0), 50_000);
        // 负向原样返回
        assert_eq!(sync_delay(0, true, 20_000, 0), -20_000);
    }

    #[test]
    fn frame_dropped_beyond_double_threshold() {
        // 落后 20ms（阈值 5ms 的两倍以上）必须丢帧
        assert!(should_drop_frame(-20_000));
        assert!(!should_drop_frame(-10_000));
        assert!(!should_drop_frame(-9_999));
        assert!(!should_drop_frame(0));
    }

    #[test]
    fn reached_end_requires_all_conditions() {
        let duration = 10_000_000;
        assert!(reached_end(10_000_000, duration, true, false));
        assert!(reached_end(10_500_000, duration, true, false));
        // 队列未空
        assert!(!reached_end(10_000_000, duration, false, false));
        // 还没到末尾
        assert!(!reached_end(9_000_000, duration, true, false));
        // 直播源永不完成
        assert!(!reached_end(10_000_000, duration, true, true));
    }

    #[test]
    fn state_u8_roundtrip() {
        for state in [
            PlayerState::Idle,
            PlayerState::Initialized,
            PlayerState::Prepared,
            PlayerState::Started,
            PlayerState::Paused,
            PlayerState::Stopped,
            PlayerState::Completed,
            PlayerState::Error,
        ] {
            assert_eq!(state_from_u8(state_to_u8(state)), state);
        }
    }

    #[test]
    fn control_ops_rejected_in_wrong_state() {
        let callback = Arc::new(RecordingCallback::default());
        let mut player = make_player(callback);

        assert_eq!(player.state(), PlayerState::Idle);
        assert!(matches!(
            player.start(),
            Err(PlayerError::InvalidState { operation: "start", .. })
        ));
        assert!(matches!(
            player.pause(),
            Err(PlayerError::InvalidState { operation: "pause", .. })
        ));
        assert!(matches!(
            player.resume(),
            Err(PlayerError::InvalidState { operation: "resume", .. })
        ));
        assert!(matches!(
            player.seek(1_000_000),
            Err(PlayerError::InvalidState { operation: "seek", .. })
        ));
        // 被拒绝的调用不改变状态
        assert_eq!(player.state(), PlayerState::Idle);
    }

    #[test]
    fn stop_is_idempotent_from_idle() {
        let callback = Arc::new(RecordingCallback::default());
        let mut player = make_player(callback.clone());

        assert!(player.stop().is_ok());
        assert_eq!(player.state(), PlayerState::Idle);
        assert!(callback.states.lock().is_empty());
    }

    #[test]
    fn open_failure_reports_error_and_enters_error_state() {
        ffmpeg_next::init().ok();
        let callback = Arc::new(RecordingCallback::default());
        let mut player = make_player(callback.clone());

        let result = player.open("/nonexistent/missing_media.mp4");
        assert!(result.is_err());
        assert_eq!(player.state(), PlayerState::Error);
        assert!(!callback.errors.lock().is_empty());

        // Error 状态下 stop / close 仍然有效
        assert!(player.stop().is_ok());
        assert_eq!(player.state(), PlayerState::Stopped);
        assert!(player.close().is_ok());
        assert_eq!(player.state(), PlayerState::Idle);
    }

    #[test]
    fn completion_emits_single_full_progress() {
        let callback = Arc::new(RecordingCallback::default());
        let player = make_player(callback.clone());

        // 模拟视频播放线程的完成路径：非直播、帧越过末尾、队列空
        {
            let mut info = player.core.media_info.lock();
            info.duration_ms = 10_000;
        }
        player.core.playing.store(true, Ordering::SeqCst);
        player.core.update_state(PlayerState::Started);

        for _ in 0..2 {
            if reached_end(10_000_000, 10_000_000, true, false) {
                player.core.playing.store(false, Ordering::SeqCst);
                if player.core.update_state(PlayerState::Completed) {
                    player.core.callback.on_playback_progress(1.0, 1.0);
                }
            }
        }

        // Completed 只上报一次
        let states = callback.states.lock();
        let completed = states
            .iter()
            .filter(|s| **s == PlayerState::Completed)
            .count();
        assert_eq!(completed, 1);
        assert_eq!(callback.progress.load(Ordering::SeqCst), 1);
        assert!(!player.core.playing.load(Ordering::SeqCst));
    }
}

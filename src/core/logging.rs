use chrono::{DateTime, Local};
use log::{Level, LevelFilter, Log, Metadata, Record};

/// 流水线日志落地器
///
/// 通过 `log` 门面收集各线程日志，按固定格式输出到 stderr：
/// `YYYY-MM-DDTHH:MM:SS.mmm±HH:MM [LEVEL] 文件:行号 标签: 消息`
pub struct PipelineLogger {
    min_level: LevelFilter,
}

impl PipelineLogger {
    /// 安装为全局 logger，进程内只能调用一次
    pub fn init(min_level: LevelFilter) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(PipelineLogger { min_level }))?;
        log::set_max_level(min_level);
        Ok(())
    }
}

/// 四级日志：Debug/Trace 归入 VERBOSE
fn level_label(level: Level) -> &'static str {
    match level {
        Level::Error => "[ERROR]",
        Level::Warn => "[WARN]",
        Level::Info => "[INFO]",
        Level::Debug | Level::Trace => "[VERBOSE]",
    }
}

/// 本地时间戳，毫秒精度，带 ±HH:MM 时区偏移
fn format_timestamp(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string()
}

/// 去掉路径，只保留源文件名
fn file_basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn format_record(record: &Record) -> String {
    let file = record.file().map(file_basename).unwrap_or("?");
    let line = record.line().unwrap_or(0);
    format!(
        "{} {} {}:{} {}: {}",
        format_timestamp(Local::now()),
        level_label(record.level()),
        file,
        line,
        record.target(),
        record.args()
    )
}

impl Log for PipelineLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.min_level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}", format_record(record));
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_labels_cover_four_levels() {
        assert_eq!(level_label(Level::Error), "[ERROR]");
        assert_eq!(level_label(Level::Warn), "[WARN]");
        assert_eq!(level_label(Level::Info), "[INFO]");
        assert_eq!(level_label(Level::Debug), "[VERBOSE]");
        assert_eq!(level_label(Level::Trace), "[VERBOSE]");
    }

    #[test]
    fn timestamp_shape_is_iso8601_with_zone() {
        let ts = format_timestamp(Local::now());
        // 形如 2026-08-02T09:41:23.123+08:00
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[7..8], "-");
        assert_eq!(&ts[10..11], "T");
        assert_eq!(&ts[13..14], ":");
        assert_eq!(&ts[19..20], ".");
        let zone = &ts[ts.len() - 6..];
        assert!(zone.starts_with('+') || zone.starts_with('-'));
        assert_eq!(&zone[3..4], ":");
    }

    #[test]
    fn basename_strips_directories() {
        assert_eq!(file_basename("src/player/manager.rs"), "manager.rs");
        assert_eq!(file_basename("manager.rs"), "manager.rs");
        assert_eq!(file_basename(r"src\core\queue.rs"), "queue.rs");
    }
}

//! Logging configuration for the launcher
//!
//! Uses log4rs with appenders:
//! 1. ConsoleAppender - stderr output
//! 2. RollingFileAppender - launcher log files with rotation
//!
//! The launcher's own log is separate from `data/node.log`, which only
//! receives the nodes' stderr.

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

/// Rotate the launcher log at this size
const LOG_FILE_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Number of rotated launcher logs kept
const LOG_FILE_COUNT: u32 = 5;

/// Directory for launcher logs under the user data root
pub fn log_dir(user_data_root: &Path) -> PathBuf {
    user_data_root.join("logs")
}

/// Initialize log4rs with console and rolling file appenders
///
/// # Log File Configuration
/// - File: `{log_dir}/launcher.1.log`
/// - Max size: 10 MB per file
/// - Max count: 5 files (rotation)
/// - Pattern: `{timestamp} [{level}] {target} - {message}`
pub fn init_logger(
    log_dir: PathBuf,
    level: LevelFilter,
) -> Result<log4rs::Handle, Box<dyn std::error::Error>> {
    // Console appender on stderr so stdout stays usable for `paths` output
    let console = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(
            "{d(%H:%M:%S)} [{l}] {t} - {m}{n}",
        )))
        .build();

    std::fs::create_dir_all(&log_dir)?;

    let log_file = log_dir.join("launcher.1.log");
    let log_pattern = log_dir.join("launcher.{}.log");

    let roller = FixedWindowRoller::builder()
        .base(1)
        .build(&log_pattern.to_string_lossy(), LOG_FILE_COUNT)?;
    let trigger = SizeTrigger::new(LOG_FILE_MAX_BYTES);
    let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));

    let logfile = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] {t} - {m}{n}",
        )))
        .build(log_file, Box::new(policy))?;

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .build(
            Root::builder()
                .appender("console")
                .appender("logfile")
                .build(level),
        )?;

    Ok(log4rs::init_config(config)?)
}

use std::path::Path;

use anyhow::Context;
use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming};

const LOG_FILE_NAME: &str = "mailprobe.log";
const LOG_ROTATE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const LOG_ROTATE_KEEP_FILES: usize = 5;

/// Start a rotating file logger (debug level) duplicated to stderr at
/// warning level and above.
pub fn init_logging(log_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(log_dir).with_context(|| format!("failed creating log dir {}", log_dir.display()))?;

    Logger::try_with_str("debug")?
        .log_to_file(FileSpec::default().directory(log_dir).basename(LOG_FILE_NAME))
        .rotate(
            Criterion::Size(LOG_ROTATE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(LOG_ROTATE_KEEP_FILES),
        )
        .duplicate_to_stderr(Duplicate::Warn)
        .format(flexi_logger::detailed_format)
        .start()
        .context("failed to start logger")?;

    log::info!("{}", "=".repeat(60));
    log::info!("mailprobe starting");
    log::info!("version: {}", env!("CARGO_PKG_VERSION"));
    log::info!("platform: {}", std::env::consts::OS);
    log::info!("{}", "=".repeat(60));

    Ok(())
}

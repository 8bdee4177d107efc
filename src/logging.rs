//! Timestamped log file mirrored to stderr.

use anyhow::Result;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub type LogFile = Arc<Mutex<BufWriter<File>>>;

/// `logs/<prefix>_YYYYmmdd_HHMMSS.log` を作成
pub fn open_log_file(prefix: &str) -> Result<(LogFile, PathBuf)> {
    open_log_file_in("logs", prefix)
}

pub fn open_log_file_in<P: AsRef<Path>>(dir: P, prefix: &str) -> Result<(LogFile, PathBuf)> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("{}_{}.log", prefix, ts));
    let file = File::create(&path)?;
    eprintln!("Log: {}", path.display());
    Ok((Arc::new(Mutex::new(BufWriter::new(file))), path))
}

/// ログファイルに1行書く（stderr には出さない）
pub fn write_line(logfile: &LogFile, msg: &str) {
    if let Ok(mut f) = logfile.lock() {
        let _ = writeln!(f, "{}", msg);
        let _ = f.flush();
    }
}

/// stderr とログファイルの両方に出力
#[macro_export]
macro_rules! log {
    ($logfile:expr, $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        eprintln!("{}", msg);
        $crate::logging::write_line(&$logfile, &msg);
    }};
}

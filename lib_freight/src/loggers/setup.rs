use std::fs;
use std::path::{Path, PathBuf};

use log::LevelFilter;

/// Maps a configured level name to a filter; unknown names fall back to `info`.
pub fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" | "warning" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Builds the dispatch without installing it: `[date time][target][LEVEL] message`
/// to stdout and to `log_path`.
pub fn build_dispatch(level: LevelFilter, log_path: &Path) -> Result<fern::Dispatch, fern::InitError> {
    Ok(fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        // Dependencies are noisy below info.
        .level_for("hyper_util", LevelFilter::Info)
        .level_for("tungstenite", LevelFilter::Info)
        .chain(std::io::stdout())
        .chain(fern::log_file(log_path)?))
}

/// Installs the global logger for a binary and returns the active log file.
///
/// The directory is created if needed; every other `.log` file in it is
/// removed so only the current run's file remains.
pub fn setup_logging(log_dir: &Path, app_name: &str, level: &str) -> Result<PathBuf, fern::InitError> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    let file_name = format!(
        "{}_{}.log",
        app_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = log_dir.join(file_name);

    build_dispatch(parse_level(level), &log_path)?.apply()?;
    prune_old_logs(log_dir, &log_path)?;
    log::debug!("Logging to {}", log_path.display());

    Ok(log_path)
}

/// Deletes every `.log` file in `log_dir` except `keep`.
pub fn prune_old_logs(log_dir: &Path, keep: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(log_dir)?.filter_map(|res| res.ok()) {
        let path = entry.path();
        let is_log = path.extension().map_or(false, |ext| ext == "log");
        if !is_log || path == keep {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Failed to delete old log file {:?}: {}", path, e),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(parse_level("TRACE"), LevelFilter::Trace);
        assert_eq!(parse_level("warn"), LevelFilter::Warn);
        assert_eq!(parse_level("verbose"), LevelFilter::Info);
    }

    #[test]
    fn only_the_current_log_survives() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["server_freight_old1.log", "server_freight_old2.log", "notes.txt"] {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        let current = dir.path().join("server_freight_now.log");
        let _dispatch = build_dispatch(LevelFilter::Info, &current).unwrap();
        assert!(current.exists());

        assert_eq!(prune_old_logs(dir.path(), &current).unwrap(), 2);
        let mut left: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec!["notes.txt", "server_freight_now.log"]);
    }
}

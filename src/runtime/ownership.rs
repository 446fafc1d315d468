use super::{RuntimeError, StatePaths};
use crate::shared::now_secs;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipState {
    NotRunning,
    Running { pid: u32 },
    Stale,
}

pub fn read_pid(paths: &StatePaths) -> Result<Option<u32>, RuntimeError> {
    let path = paths.pid_path();
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path).map_err(|source| RuntimeError::ReadState {
        path: path.display().to_string(),
        source,
    })?;
    Ok(raw.trim().parse::<u32>().ok())
}

pub fn ownership_state(paths: &StatePaths) -> Result<OwnershipState, RuntimeError> {
    match read_pid(paths)? {
        None => Ok(OwnershipState::NotRunning),
        Some(pid) if is_process_alive(pid) => Ok(OwnershipState::Running { pid }),
        Some(_) => Ok(OwnershipState::Stale),
    }
}

/// Claims the pid file for this process. A stale pid file left by a crashed
/// run is replaced.
pub fn claim_ownership(paths: &StatePaths) -> Result<(), RuntimeError> {
    if let OwnershipState::Running { pid } = ownership_state(paths)? {
        if pid != std::process::id() {
            return Err(RuntimeError::AlreadyRunning { pid });
        }
    }
    let path = paths.pid_path();
    fs::write(&path, std::process::id().to_string()).map_err(|source| {
        RuntimeError::WriteState {
            path: path.display().to_string(),
            source,
        }
    })?;
    clear_stop_signal(paths);
    Ok(())
}

pub fn release_ownership(paths: &StatePaths) {
    let _ = fs::remove_file(paths.pid_path());
    clear_stop_signal(paths);
}

pub fn signal_stop(paths: &StatePaths) -> Result<(), RuntimeError> {
    if ownership_state(paths)? == OwnershipState::NotRunning {
        return Err(RuntimeError::NotRunning);
    }
    let path = paths.stop_signal_path();
    fs::write(&path, now_secs().to_string()).map_err(|source| RuntimeError::WriteState {
        path: path.display().to_string(),
        source,
    })
}

pub fn stop_requested(paths: &StatePaths) -> bool {
    paths.stop_signal_path().exists()
}

fn clear_stop_signal(paths: &StatePaths) {
    let _ = fs::remove_file(paths.stop_signal_path());
}

/// Raises `stop` once the stop file appears. The watcher exits on its own
/// when `stop` is raised by anyone else.
pub fn spawn_stop_watcher(paths: StatePaths, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            if stop_requested(&paths) {
                stop.store(true, Ordering::Relaxed);
                break;
            }
            thread::sleep(STOP_POLL_INTERVAL);
        }
    })
}

pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    #[cfg(unix)]
    {
        std::process::Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::bootstrap_state_root;
    use tempfile::tempdir;

    #[test]
    fn claim_then_release_cycles_pid_file() {
        let temp = tempdir().expect("tempdir");
        let paths = StatePaths::new(temp.path());
        bootstrap_state_root(&paths).expect("bootstrap");

        assert_eq!(ownership_state(&paths).expect("state"), OwnershipState::NotRunning);
        claim_ownership(&paths).expect("claim");
        assert_eq!(read_pid(&paths).expect("pid"), Some(std::process::id()));
        release_ownership(&paths);
        assert_eq!(read_pid(&paths).expect("pid"), None);
    }

    #[test]
    fn signal_stop_requires_running_owner() {
        let temp = tempdir().expect("tempdir");
        let paths = StatePaths::new(temp.path());
        bootstrap_state_root(&paths).expect("bootstrap");
        assert!(matches!(signal_stop(&paths), Err(RuntimeError::NotRunning)));
    }

    #[test]
    fn stop_watcher_raises_flag_when_stop_file_appears() {
        let temp = tempdir().expect("tempdir");
        let paths = StatePaths::new(temp.path());
        bootstrap_state_root(&paths).expect("bootstrap");
        claim_ownership(&paths).expect("claim");

        let stop = Arc::new(AtomicBool::new(false));
        let watcher = spawn_stop_watcher(paths.clone(), Arc::clone(&stop));
        signal_stop(&paths).expect("signal");
        watcher.join().expect("join watcher");
        assert!(stop.load(Ordering::Relaxed));
        release_ownership(&paths);
        assert!(!stop_requested(&paths));
    }
}

//! Native Linux integration: find the coordination server through `/proc`

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use hp_config::Environment;

use crate::adapter::{Integration, IntegrationError, Result};

/// Substring that identifies the coordination server in a process command line
pub const PROCESS_NEEDLE: &str = "headscale";

/// Scans a procfs tree for processes whose command line contains a needle.
#[derive(Debug, Clone)]
pub struct ProcScanner {
    root: PathBuf,
    needle: String,
}

impl Default for ProcScanner {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            needle: PROCESS_NEEDLE.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All matching PIDs, sorted. The scanning process itself is excluded.
    ///
    /// Unreadable `cmdline` entries (processes that exited mid-scan, or
    /// belong to another user) are skipped.
    pub async fn find_pids(&self) -> Result<Vec<i32>> {
        let io_err = |source| IntegrationError::Io {
            path: self.root.clone(),
            source,
        };

        let own_pid = std::process::id() as i32;
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(io_err)?;
        let mut pids = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let pid = match entry.file_name().to_str().and_then(|s| s.parse::<i32>().ok()) {
                Some(pid) if pid != own_pid => pid,
                _ => continue,
            };

            let path = entry.path().join("cmdline");
            match tokio::fs::read(&path).await {
                Ok(data) => {
                    if String::from_utf8_lossy(&data).contains(&self.needle) {
                        pids.push(pid);
                    }
                }
                Err(e) => tracing::debug!("Failed to read {}: {}", path.display(), e),
            }
        }

        pids.sort_unstable();
        Ok(pids)
    }

    /// The single matching PID, or `None` when zero or several match.
    pub async fn find_unique_pid(&self) -> Option<i32> {
        let pids = match self.find_pids().await {
            Ok(pids) => pids,
            Err(e) => {
                tracing::error!("Failed to read {}: {}", self.root.display(), e);
                return None;
            }
        };

        tracing::debug!("Found Headscale processes: {:?}", pids);
        match pids.as_slice() {
            [pid] => Some(*pid),
            [] => {
                tracing::error!("Could not find Headscale process");
                None
            }
            many => {
                tracing::error!(
                    "Found {} Headscale processes: {:?}",
                    many.len(),
                    many
                );
                None
            }
        }
    }
}

/// Send SIGTERM to `pid` so a supervisor restarts it with the new config.
#[cfg(unix)]
pub fn send_sigterm(pid: i32) -> Result<()> {
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(IntegrationError::Signal {
            pid,
            source: std::io::Error::last_os_error(),
        })
    }
}

#[cfg(not(unix))]
pub fn send_sigterm(_pid: i32) -> Result<()> {
    Err(IntegrationError::Unsupported)
}

/// Signal the recorded PID, if any.
pub(crate) fn signal_recorded(name: &str, pid: &Mutex<Option<i32>>) -> Result<()> {
    let pid = match pid.lock() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    };
    match pid {
        Some(pid) => {
            tracing::info!("{}: sending SIGTERM to Headscale (pid {})", name, pid);
            send_sigterm(pid)
        }
        None => Ok(()),
    }
}

pub(crate) fn record_pid(slot: &Mutex<Option<i32>>, pid: i32) {
    match slot.lock() {
        Ok(mut guard) => *guard = Some(pid),
        Err(poisoned) => *poisoned.into_inner() = Some(pid),
    }
}

/// Integration for a coordination server running as a sibling process.
#[derive(Debug, Default)]
pub struct ProcIntegration {
    scanner: ProcScanner,
    pid: Mutex<Option<i32>>,
}

impl ProcIntegration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a different procfs root (tests mount a fake tree).
    pub fn with_proc_root(root: impl Into<PathBuf>) -> Self {
        Self {
            scanner: ProcScanner::new(root),
            pid: Mutex::new(None),
        }
    }

    pub fn pid(&self) -> Option<i32> {
        self.pid.lock().map(|g| *g).unwrap_or_else(|p| *p.into_inner())
    }
}

#[async_trait]
impl Integration for ProcIntegration {
    fn name(&self) -> &str {
        "Native Linux (/proc)"
    }

    async fn is_available(&self, _env: &Environment) -> bool {
        if !cfg!(target_os = "linux") {
            tracing::error!("/proc is only available on Linux");
            return false;
        }

        tracing::debug!("Checking {} for Headscale process", self.scanner.root().display());
        match self.scanner.find_unique_pid().await {
            Some(pid) => {
                record_pid(&self.pid, pid);
                tracing::info!("Found Headscale process with PID: {}", pid);
                true
            }
            None => false,
        }
    }

    fn on_config_change(&self) -> Result<()> {
        signal_recorded(self.name(), &self.pid)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    /// Lay out `<root>/<pid>/cmdline` entries. argv is NUL-separated.
    pub(crate) fn fake_proc(root: &Path, procs: &[(&str, &str)]) {
        for (pid, cmdline) in procs {
            let dir = root.join(pid);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("cmdline"), cmdline).unwrap();
        }
    }

    #[tokio::test]
    async fn finds_single_headscale_process() {
        let root = tempdir().unwrap();
        fake_proc(
            root.path(),
            &[
                ("3999001", "/sbin/init"),
                ("3999042", "/usr/bin/headscale\0serve"),
                ("self", "ignored"),
            ],
        );

        let scanner = ProcScanner::new(root.path());
        assert_eq!(scanner.find_pids().await.unwrap(), vec![3999042]);
        assert_eq!(scanner.find_unique_pid().await, Some(3999042));
    }

    #[tokio::test]
    async fn ambiguous_or_missing_process_is_none() {
        let root = tempdir().unwrap();
        fake_proc(root.path(), &[("3999001", "/sbin/init")]);
        assert_eq!(ProcScanner::new(root.path()).find_unique_pid().await, None);

        fake_proc(
            root.path(),
            &[
                ("3999010", "headscale\0serve"),
                ("3999011", "headscale\0serve"),
            ],
        );
        assert_eq!(ProcScanner::new(root.path()).find_unique_pid().await, None);
    }

    #[tokio::test]
    async fn missing_proc_root_is_unavailable() {
        let root = tempdir().unwrap();
        let integration = ProcIntegration::with_proc_root(root.path().join("missing"));
        assert!(!integration.is_available(&Environment::default()).await);
        assert_eq!(integration.pid(), None);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn probe_records_pid() {
        let root = tempdir().unwrap();
        fake_proc(root.path(), &[("3999077", "/usr/bin/headscale\0serve")]);

        let integration = ProcIntegration::with_proc_root(root.path());
        assert!(integration.is_available(&Environment::default()).await);
        assert_eq!(integration.pid(), Some(3999077));
    }

    #[test]
    fn config_change_without_pid_is_a_no_op() {
        let integration = ProcIntegration::new();
        assert!(integration.on_config_change().is_ok());
    }
}

use anyhow::{Context, bail};
use std::fs::OpenOptions;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const LOCK_FILE: &str = ".port_lock";

fn marker(lock_dir: &Path, port: u16) -> PathBuf {
    lock_dir.join(format!(".port_{port}"))
}

/// A port is free when no process on this host claimed it through a marker
/// file and nothing is currently bound to it.
pub fn is_port_available(lock_dir: &Path, port: u16) -> bool {
    !marker(lock_dir, port).exists() && TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// Claims the first free port at or above `start` for `owner`.
///
/// Concurrent callers sharing `lock_dir` are serialized through an exclusive
/// lock on `.port_lock`, and each claim leaves a `.port_<n>` marker naming the
/// owner until [`release_port`] removes it.
pub fn allocate_port(lock_dir: &Path, start: u16, owner: &str) -> anyhow::Result<u16> {
    std::fs::create_dir_all(lock_dir)
        .with_context(|| format!("Failed to create {}", lock_dir.display()))?;
    let lock_path = lock_dir.join(LOCK_FILE);
    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to open {}", lock_path.display()))?;
    lock.lock()
        .with_context(|| format!("Failed to lock {}", lock_path.display()))?;

    let claimed = claim(lock_dir, start, owner);
    lock.unlock()?;
    claimed
}

fn claim(lock_dir: &Path, start: u16, owner: &str) -> anyhow::Result<u16> {
    for port in start..=u16::MAX {
        if !is_port_available(lock_dir, port) {
            debug!(port, "Port taken, trying the next one");
            continue;
        }
        std::fs::write(marker(lock_dir, port), owner)
            .with_context(|| format!("Failed to mark port {port}"))?;
        debug!(port, owner, "Port allocated");
        return Ok(port);
    }
    bail!("no free port at or above {start}")
}

pub fn release_port(lock_dir: &Path, port: u16) -> anyhow::Result<()> {
    match std::fs::remove_file(marker(lock_dir, port)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to release port {port}")),
    }
}

/// A claimed port that gives its marker back when dropped, so early returns
/// cannot strand it.
#[derive(Debug)]
pub struct PortLease {
    lock_dir: PathBuf,
    port: u16,
    released: bool,
}

impl PortLease {
    pub fn acquire(lock_dir: &Path, start: u16, owner: &str) -> anyhow::Result<Self> {
        let port = allocate_port(lock_dir, start, owner)?;
        Ok(Self {
            lock_dir: lock_dir.to_path_buf(),
            port,
            released: false,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn release(mut self) -> anyhow::Result<()> {
        self.released = true;
        release_port(&self.lock_dir, self.port)
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = release_port(&self.lock_dir, self.port) {
            warn!(port = self.port, "{e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::{Arc, Barrier};
    use tempfile::TempDir;

    #[test]
    fn skips_marked_and_bound_ports() {
        let tmp = TempDir::new().unwrap();
        let bound = TcpListener::bind("127.0.0.1:0").unwrap();
        let start = bound.local_addr().unwrap().port();

        let port = allocate_port(tmp.path(), start, "first").unwrap();
        assert!(port > start);
        assert_eq!(std::fs::read_to_string(marker(tmp.path(), port)).unwrap(), "first");

        let next = allocate_port(tmp.path(), port, "second").unwrap();
        assert!(next > port);

        release_port(tmp.path(), port).unwrap();
        assert!(!marker(tmp.path(), port).exists());
        release_port(tmp.path(), port).unwrap();
    }

    #[test]
    fn concurrent_contenders_get_distinct_ports() {
        let tmp = TempDir::new().unwrap();
        let contenders = 8;
        let barrier = Arc::new(Barrier::new(contenders));

        let handles: Vec<_> = (0..contenders)
            .map(|i| {
                let dir = tmp.path().to_path_buf();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    allocate_port(&dir, 42_000, &format!("contender-{i}")).unwrap()
                })
            })
            .collect();

        let ports: BTreeSet<u16> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ports.len(), contenders);
        for port in ports {
            assert!(marker(tmp.path(), port).exists());
        }
    }

    #[test]
    fn lease_gives_the_port_back_on_early_return() {
        let tmp = TempDir::new().unwrap();
        let start = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();

        let failing = || -> anyhow::Result<u16> {
            let lease = PortLease::acquire(tmp.path(), start, "doomed")?;
            assert!(marker(tmp.path(), lease.port()).exists());
            bail!("setup failed after claiming {}", lease.port())
        };
        assert!(failing().is_err());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);

        let lease = PortLease::acquire(tmp.path(), start, "second").unwrap();
        let port = lease.port();
        lease.release().unwrap();
        assert!(!marker(tmp.path(), port).exists());
    }
}

//! Single-instance guard.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::{Error, Result};

/// Exclusive ownership of the pid file.
///
/// The file holds this process's pid. It is removed by [`PidFile::release`]
/// or on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    released: bool,
}

impl PidFile {
    /// Create `path` holding the current pid.
    ///
    /// The pid is written to a sibling file first and hard-linked into place,
    /// so `path` never exists without its contents.
    ///
    /// Fails with [`Error::AlreadyRunning`] when the file names a live
    /// process. A file naming a dead process is replaced, as is a file that
    /// holds garbage and is older than [`CLAIM_GRACE`].
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::io(format!("creating {}: {e}", parent.display()), e))?;
        }
        let staged = sibling(path, &format!("{}.tmp", std::process::id()));
        std::fs::write(&staged, format!("{}\n", std::process::id()))
            .map_err(|e| Error::io(format!("writing {}: {e}", staged.display()), e))?;
        let claimed = claim(path, &staged);
        if let Err(err) = remove(&staged) {
            tracing::warn!(path = %staged.display(), error = %err, "staged pid file not removed");
        }
        claimed.map(|()| Self {
            path: path.to_path_buf(),
            released: false,
        })
    }

    /// Where the pid file lives.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the pid file.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        remove(&self.path)
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if !self.released {
            if let Err(err) = remove(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %err, "pid file not removed");
            }
        }
    }
}

/// How long an unreadable pid file is presumed to belong to a starter that
/// has not finished writing it.
pub const CLAIM_GRACE: Duration = Duration::from_secs(5);

fn claim(path: &Path, staged: &Path) -> Result<()> {
    // One retry: the first attempt may lose to a stale file.
    for _ in 0..2 {
        match std::fs::hard_link(staged, path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                match read_pid(path) {
                    Some(pid) if is_process_alive(pid) => return Err(Error::already_running(pid)),
                    Some(_) => {}
                    None if is_fresh(path) => {
                        return Err(Error::invalid_state(format!(
                            "{} is being claimed by another process",
                            path.display()
                        )));
                    }
                    None => {}
                }
                set_aside(path)?;
            }
            Err(e) => {
                return Err(Error::io(format!("creating {}: {e}", path.display()), e));
            }
        }
    }
    Err(Error::invalid_state(format!(
        "could not claim {}",
        path.display()
    )))
}

// Moves a stale file out of the way. The rename takes whatever is at `path`
// now, so a file another starter claimed in the meantime is put back.
fn set_aside(path: &Path) -> Result<()> {
    let aside = sibling(path, &format!("{}.stale", std::process::id()));
    match std::fs::rename(path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::io(format!("moving {}: {e}", path.display()), e)),
    }
    let moved = read_pid(&aside);
    if let Some(pid) = moved.filter(|pid| is_process_alive(*pid)) {
        match std::fs::hard_link(&aside, path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(Error::io(format!("restoring {}: {e}", path.display()), e)),
        }
        remove(&aside)?;
        return Err(Error::already_running(pid));
    }
    tracing::info!(path = %path.display(), "removing stale pid file");
    remove(&aside)
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn is_fresh(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(|modified| match SystemTime::now().duration_since(modified) {
            Ok(age) => age < CLAIM_GRACE,
            // Modified in the future.
            Err(_) => true,
        })
        .unwrap_or(false)
}

fn remove(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(format!("removing {}: {e}", path.display()), e)),
    }
}

/// The pid recorded at `path`, if the file exists and parses.
pub fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|contents| contents.trim().parse().ok())
}

/// Whether a process with `pid` exists.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs error checking only.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Whether a process with `pid` exists.
#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    false
}

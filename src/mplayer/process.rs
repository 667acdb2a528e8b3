//! MPlayer process detection, spawning and termination.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::{Child, Command};

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("MPlayer executable not found")]
  NotFound,
  #[error("Failed to spawn MPlayer: {0}")]
  SpawnFailed(#[from] std::io::Error),
}

/// How the engine process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitReport {
  /// Exit code, when the process exited normally.
  pub code: Option<i32>,
  /// Terminating signal number (unix only).
  pub signal: Option<i32>,
}

impl ExitReport {
  /// Whether the process was terminated by the interrupt sent on exit.
  pub fn interrupted(&self) -> bool {
    #[cfg(unix)]
    {
      self.signal == Some(libc::SIGINT)
    }
    #[cfg(not(unix))]
    {
      false
    }
  }
}

impl From<ExitStatus> for ExitReport {
  fn from(status: ExitStatus) -> Self {
    #[cfg(unix)]
    let signal = {
      use std::os::unix::process::ExitStatusExt;
      status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    Self {
      code: status.code(),
      signal,
    }
  }
}

/// Find MPlayer executable in common locations.
pub fn find_mplayer() -> Option<PathBuf> {
  // Check PATH first
  if let Ok(path) = which::which("mplayer") {
    return Some(path);
  }

  #[cfg(windows)]
  {
    let common_paths = [
      r"C:\Program Files\MPlayer\mplayer.exe",
      r"C:\Program Files (x86)\MPlayer\mplayer.exe",
      r"C:\mplayer\mplayer.exe",
    ];
    for path in common_paths {
      let p = PathBuf::from(path);
      if p.exists() {
        return Some(p);
      }
    }
  }

  #[cfg(target_os = "macos")]
  {
    let common_paths = ["/usr/local/bin/mplayer", "/opt/homebrew/bin/mplayer"];
    for path in common_paths {
      let p = PathBuf::from(path);
      if p.exists() {
        return Some(p);
      }
    }
  }

  #[cfg(target_os = "linux")]
  {
    let common_paths = ["/usr/bin/mplayer", "/usr/local/bin/mplayer"];
    for path in common_paths {
      let p = PathBuf::from(path);
      if p.exists() {
        return Some(p);
      }
    }
  }

  None
}

/// Spawn the engine with all three standard streams piped.
pub fn spawn_mplayer(executable: Option<&str>, args: &[String]) -> Result<Child, ProcessError> {
  let exe = match executable {
    Some(exe) => PathBuf::from(exe),
    None => find_mplayer().ok_or(ProcessError::NotFound)?,
  };

  log::info!("Spawning MPlayer: {:?} {:?}", exe, args);

  let child = Command::new(&exe)
    .args(args)
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true)
    .spawn()?;

  log::info!("MPlayer started (pid: {:?})", child.id());
  Ok(child)
}

/// Ask the engine to exit. On unix this is SIGINT so it can shut down
/// cleanly; elsewhere there is no interrupt, so the process is killed.
pub fn send_interrupt(child: &mut Child) -> std::io::Result<()> {
  #[cfg(unix)]
  {
    let Some(pid) = child.id() else {
      // Already reaped.
      return Ok(());
    };
    log::info!("Sending SIGINT to MPlayer (pid: {})", pid);
    // SAFETY: plain kill(2) on a pid we own and have not reaped yet.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    if rc == 0 {
      Ok(())
    } else {
      Err(std::io::Error::last_os_error())
    }
  }
  #[cfg(not(unix))]
  {
    child.start_kill()
  }
}

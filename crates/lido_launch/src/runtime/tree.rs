//! Process tree isolation and termination
//!
//! Every service runs as the leader of its own process group so that helper
//! processes spawned by `yarn` and friends die with it.

use tokio::process::Command;

/// Make the spawned child the leader of a new process group
pub fn configure_process_group(cmd: &mut Command) {
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    #[cfg(windows)]
    {
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }
}

/// Forcefully kill the process group led by `pid`.
///
/// A group that has already exited is not an error.
#[cfg(unix)]
pub fn terminate_tree(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        log::warn!("Invalid process id {}", pid);
        return;
    };

    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => log::debug!("killpg({}) failed: {}", pid, e),
    }
}

#[cfg(windows)]
pub fn terminate_tree(pid: u32) {
    use std::process::Stdio;

    let status = std::process::Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    if let Err(e) = status {
        log::debug!("taskkill /PID {} failed: {}", pid, e);
    }
}

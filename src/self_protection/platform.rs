use std::fs;

/// A scoped handle onto an OS process. Unix has no separate handle object
/// the way Windows does — `kill(pid, 0)` plays the role of both "open" and
/// "validate". The handle carries the pid so later operations don't need
/// one passed in separately, and closing it is a no-op (there's nothing to
/// release), matching the "null/invalid treated as success" rule.
#[derive(Debug, Clone, Copy)]
pub struct ProcessHandle {
    pid: libc::pid_t,
}

impl ProcessHandle {
    pub fn pid(&self) -> libc::pid_t {
        self.pid
    }
}

/// Opens a handle to `pid`, equivalent to Windows' `OpenProcess`. Succeeds
/// only if the process currently exists.
pub fn open_process(pid: u32) -> Option<ProcessHandle> {
    let pid = pid as libc::pid_t;
    if process_exists(pid) {
        Some(ProcessHandle { pid })
    } else {
        None
    }
}

/// Queries whether the handle still resolves to a live process. Unlike
/// `process_is_alive`, a handle that resolves to a zombie still validates —
/// the check is "is the handle usable", not "is the process running".
pub fn validate_handle(handle: &ProcessHandle) -> bool {
    unsafe { libc::kill(handle.pid, 0) == 0 || errno_is_eperm() }
}

/// Releasing a pid-backed handle is a no-op on Unix.
pub fn close_handle(_handle: ProcessHandle) -> bool {
    true
}

pub fn process_exists(pid: libc::pid_t) -> bool {
    unsafe { libc::kill(pid, 0) == 0 || errno_is_eperm() }
}

/// True iff `/proc/<pid>` reports a running (non-zombie) process.
pub fn process_is_alive(pid: u32) -> bool {
    let status_path = format!("/proc/{}/stat", pid);
    match fs::read_to_string(&status_path) {
        Ok(contents) => {
            // The state character follows the `(comm)` field in parentheses.
            contents
                .rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().chars().next())
                .flatten()
                .map(|state| state != 'Z')
                .unwrap_or(false)
        }
        Err(_) => process_exists(pid as libc::pid_t),
    }
}

pub fn terminate(pid: libc::pid_t) -> bool {
    unsafe { libc::kill(pid, libc::SIGTERM) == 0 }
}

/// Resolves the executable's base name via `/proc/<pid>/comm`. Returns
/// `None` if the process has already exited or the name can't be read.
pub fn process_name(pid: u32) -> Option<String> {
    fs::read_to_string(format!("/proc/{}/comm", pid))
        .ok()
        .map(|s| s.trim().to_string())
}

fn errno_is_eperm() -> bool {
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Verifies the running binary's own code signature. No signing facility
/// exists on this platform hook yet; succeeds unconditionally.
pub fn verify_own_signature() -> bool {
    true
}

/// Registry integrity is a Windows-only concept; placeholder per the open
/// self-protection question — always true until real semantics are given.
pub fn check_registry_integrity() -> bool {
    true
}

/// Service-manager integrity placeholder, same status as
/// `check_registry_integrity`.
pub fn check_service_integrity() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        let pid = std::process::id();
        assert!(process_is_alive(pid));
        assert!(process_exists(pid as libc::pid_t));
    }

    #[test]
    fn bogus_pid_does_not_exist() {
        assert!(!process_exists(i32::MAX));
    }

    #[test]
    fn placeholders_succeed_unconditionally() {
        assert!(verify_own_signature());
        assert!(check_registry_integrity());
        assert!(check_service_integrity());
    }
}

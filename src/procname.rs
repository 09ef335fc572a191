//! Tags this process's name in process listings, so `ps`/`top` show what
//! role it's playing instead of the generic binary name.

#[cfg(target_os = "linux")]
use std::ffi::CString;

/// Sets the kernel-visible process name to `"<prefix><role>"`, truncated to
/// whatever `PR_SET_NAME` accepts (15 bytes plus the NUL terminator on
/// Linux). Best-effort: a failure here has no effect on attach behavior, so
/// it is logged at debug level and otherwise ignored rather than routed
/// through the Exit Reporter.
#[cfg(target_os = "linux")]
pub fn set_argv0(prefix: &str, role: char) {
    let name = format!("{prefix}{role}");
    let Ok(cname) = CString::new(name) else { return };
    let rc = unsafe { libc::prctl(libc::PR_SET_NAME, cname.as_ptr(), 0, 0, 0) };
    if rc != 0 {
        tracing::debug!(errno = ?std::io::Error::last_os_error(), "failed to set process name");
    }
}

/// `PR_SET_NAME` is Linux-specific; elsewhere this is a no-op.
#[cfg(not(target_os = "linux"))]
pub fn set_argv0(_prefix: &str, _role: char) {}

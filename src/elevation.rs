//! Elevation-aware self relaunch.
//!
//! Writes under `HKLM` need administrator rights, and Windows only grants
//! them at process-launch granularity. When the current process lacks them,
//! the pending configuration is serialized to the command line and the same
//! executable is started again through the UAC consent path ("runas"), the
//! caller blocking until the child exits. The privilege probe and the
//! process start are behind traits so the relaunch logic is testable with
//! fakes.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// How starting the child process failed.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The interactive user refused the elevation consent prompt
    /// (Win32 error 1223, `ERROR_CANCELLED`).
    #[error("elevation was declined by the user")]
    ElevationDenied,
    /// The path of the running executable could not be resolved.
    #[error("could not resolve the current executable: {0}")]
    CurrentExe(#[from] std::io::Error),
    /// Any other start failure: missing executable, resource exhaustion.
    #[error("failed to start the child process: {0}")]
    Failed(String),
    /// Elevated relaunch is only available on Windows.
    #[error("elevated relaunch is not supported on this platform")]
    Unsupported,
}

/// Point-in-time probe for administrator-equivalent privilege.
/// Never cached; callers re-evaluate on every check.
pub trait PrivilegeProbe {
    fn is_elevated(&self) -> bool;
}

/// A request to start exactly one child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub exe: PathBuf,
    pub arguments: String,
    /// Route the start through the shell's elevation path ("runas"),
    /// which prompts the interactive user for consent.
    pub elevated: bool,
}

/// Starts a child process and blocks until it has exited.
///
/// The child's exit code is not inspected: success means the child was
/// launched and subsequently terminated.
pub trait ProcessLauncher {
    fn run_to_exit(&self, request: &LaunchRequest) -> Result<(), LaunchError>;
}

/// Relaunches the current executable, elevating only when necessary.
pub struct Relauncher<P, L> {
    probe: P,
    launcher: L,
}

impl<P: PrivilegeProbe, L: ProcessLauncher> Relauncher<P, L> {
    pub fn new(probe: P, launcher: L) -> Self {
        Self { probe, launcher }
    }

    /// True if a registry write from this process would need elevation.
    pub fn elevation_required(&self) -> bool {
        !self.probe.is_elevated()
    }

    /// Start the currently-running executable with the given arguments.
    pub fn start_self(&self, arguments: &str) -> Result<(), LaunchError> {
        let exe = std::env::current_exe()?;
        self.start(&exe, arguments)
    }

    /// Start `exe` with `arguments`, through the consent prompt only when
    /// the probe says the current process is not already elevated, and wait
    /// for the child to exit.
    pub fn start(&self, exe: &Path, arguments: &str) -> Result<(), LaunchError> {
        let request = LaunchRequest {
            exe: exe.to_path_buf(),
            arguments: arguments.to_string(),
            elevated: self.elevation_required(),
        };
        log::debug!(
            "starting {} (elevated: {}) with arguments: {}",
            request.exe.display(),
            request.elevated,
            request.arguments
        );
        self.launcher.run_to_exit(&request)
    }
}

/// Probe backed by the process token's elevation flag.
pub struct TokenPrivilegeProbe;

impl PrivilegeProbe for TokenPrivilegeProbe {
    fn is_elevated(&self) -> bool {
        #[cfg(windows)]
        {
            use windows::Win32::Foundation::{CloseHandle, HANDLE};
            use windows::Win32::Security::{
                GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY,
            };
            use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

            unsafe {
                let mut token = HANDLE::default();
                if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token).is_err() {
                    return false;
                }

                let mut elevation = TOKEN_ELEVATION::default();
                let mut return_length = 0u32;
                let queried = GetTokenInformation(
                    token,
                    TokenElevation,
                    Some(&mut elevation as *mut _ as *mut _),
                    std::mem::size_of::<TOKEN_ELEVATION>() as u32,
                    &mut return_length,
                );
                let _ = CloseHandle(token);

                queried.is_ok() && elevation.TokenIsElevated != 0
            }
        }

        #[cfg(not(windows))]
        {
            false
        }
    }
}

/// Launcher backed by `ShellExecuteExW`.
///
/// The "runas" verb routes the start through UAC; `SEE_MASK_NOCLOSEPROCESS`
/// hands back a process handle so the call can wait for the child.
pub struct ShellLauncher;

impl ProcessLauncher for ShellLauncher {
    fn run_to_exit(&self, request: &LaunchRequest) -> Result<(), LaunchError> {
        #[cfg(windows)]
        {
            use windows::core::{HSTRING, PCWSTR};
            use windows::Win32::Foundation::{CloseHandle, ERROR_CANCELLED};
            use windows::Win32::System::Threading::{WaitForSingleObject, INFINITE};
            use windows::Win32::UI::Shell::{
                ShellExecuteExW, SEE_MASK_NOCLOSEPROCESS, SHELLEXECUTEINFOW,
            };
            use windows::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;

            let verb = HSTRING::from(if request.elevated { "runas" } else { "open" });
            let exe = HSTRING::from(request.exe.as_os_str());
            let parameters = HSTRING::from(request.arguments.as_str());

            let mut info = SHELLEXECUTEINFOW {
                cbSize: std::mem::size_of::<SHELLEXECUTEINFOW>() as u32,
                fMask: SEE_MASK_NOCLOSEPROCESS,
                lpVerb: PCWSTR(verb.as_ptr()),
                lpFile: PCWSTR(exe.as_ptr()),
                lpParameters: PCWSTR(parameters.as_ptr()),
                nShow: SW_SHOWNORMAL.0,
                ..Default::default()
            };

            unsafe {
                ShellExecuteExW(&mut info).map_err(|e| {
                    if e.code() == ERROR_CANCELLED.to_hresult() {
                        LaunchError::ElevationDenied
                    } else {
                        LaunchError::Failed(e.message().to_string())
                    }
                })?;

                if !info.hProcess.is_invalid() {
                    let _ = WaitForSingleObject(info.hProcess, INFINITE);
                    let _ = CloseHandle(info.hProcess);
                }
            }
            Ok(())
        }

        #[cfg(not(windows))]
        {
            let _ = request;
            Err(LaunchError::Unsupported)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::time::{Duration, Instant};

    struct FixedProbe(bool);

    impl PrivilegeProbe for FixedProbe {
        fn is_elevated(&self) -> bool {
            self.0
        }
    }

    /// Records the request it was asked to run and reports success.
    #[derive(Default)]
    struct RecordingLauncher {
        seen: RefCell<Option<LaunchRequest>>,
    }

    impl ProcessLauncher for RecordingLauncher {
        fn run_to_exit(&self, request: &LaunchRequest) -> Result<(), LaunchError> {
            *self.seen.borrow_mut() = Some(request.clone());
            Ok(())
        }
    }

    /// Stands in for a child that takes a while to exit.
    struct SleepyLauncher(Duration);

    impl ProcessLauncher for SleepyLauncher {
        fn run_to_exit(&self, _request: &LaunchRequest) -> Result<(), LaunchError> {
            std::thread::sleep(self.0);
            Ok(())
        }
    }

    struct DenyingLauncher;

    impl ProcessLauncher for DenyingLauncher {
        fn run_to_exit(&self, _request: &LaunchRequest) -> Result<(), LaunchError> {
            Err(LaunchError::ElevationDenied)
        }
    }

    #[test]
    fn unprivileged_process_requests_elevation() {
        let relauncher = Relauncher::new(FixedProbe(false), RecordingLauncher::default());
        assert!(relauncher.elevation_required());
        relauncher
            .start(Path::new("fuslogcfg.exe"), "/force+")
            .unwrap();
        let seen = relauncher.launcher.seen.borrow().clone().unwrap();
        assert!(seen.elevated);
        assert_eq!(seen.exe, PathBuf::from("fuslogcfg.exe"));
        assert_eq!(seen.arguments, "/force+");
    }

    #[test]
    fn elevated_process_short_circuits_the_consent_path() {
        let relauncher = Relauncher::new(FixedProbe(true), RecordingLauncher::default());
        assert!(!relauncher.elevation_required());
        relauncher
            .start(Path::new("fuslogcfg.exe"), "/failures-")
            .unwrap();
        let seen = relauncher.launcher.seen.borrow().clone().unwrap();
        assert!(!seen.elevated, "must not route through the consent prompt");
    }

    #[test]
    fn declined_consent_maps_to_a_distinct_error() {
        let relauncher = Relauncher::new(FixedProbe(false), DenyingLauncher);
        let err = relauncher
            .start(Path::new("fuslogcfg.exe"), "/force+")
            .unwrap_err();
        assert!(matches!(err, LaunchError::ElevationDenied));
    }

    #[test]
    fn start_blocks_until_the_child_has_exited() {
        let wait = Duration::from_millis(50);
        let relauncher = Relauncher::new(FixedProbe(true), SleepyLauncher(wait));
        let begun = Instant::now();
        relauncher.start(Path::new("fuslogcfg.exe"), "").unwrap();
        assert!(begun.elapsed() >= wait);
    }

    #[test]
    fn start_self_resolves_the_running_executable() {
        let relauncher = Relauncher::new(FixedProbe(true), RecordingLauncher::default());
        relauncher.start_self("/resources+").unwrap();
        let seen = relauncher.launcher.seen.borrow().clone().unwrap();
        assert_eq!(seen.exe, std::env::current_exe().unwrap());
    }
}

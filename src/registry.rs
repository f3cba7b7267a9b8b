//! The Fusion registry key.
//!
//! The assembly loader reads its logging settings from
//! `HKLM\SOFTWARE\Microsoft\Fusion`: three DWORD flags where `1` means on
//! and anything else (absence included) means off, plus the `LogPath`
//! string. The key is opened per call and closed immediately; there is no
//! cross-process locking around the read-edit-write cycle.

use anyhow::Result;

use crate::config::LogConfiguration;

pub const FUSION_KEY_PATH: &str = r"SOFTWARE\Microsoft\Fusion";

#[cfg(windows)]
const FORCE_LOG: &str = "ForceLog";
#[cfg(windows)]
const LOG_FAILURES: &str = "LogFailures";
#[cfg(windows)]
const LOG_RESOURCE_BINDS: &str = "LogResourceBinds";
#[cfg(windows)]
const LOG_PATH: &str = "LogPath";

/// Read and write access to the persisted logging configuration.
pub trait ConfigStore {
    fn read(&self) -> Result<LogConfiguration>;
    fn write(&self, config: &LogConfiguration) -> Result<()>;
}

/// The real store under `HKLM\SOFTWARE\Microsoft\Fusion`. Reading works for
/// any user; writing needs administrator rights.
pub struct FusionRegistry;

impl ConfigStore for FusionRegistry {
    fn read(&self) -> Result<LogConfiguration> {
        #[cfg(windows)]
        {
            use windows::Win32::System::Registry::{RegCloseKey, KEY_READ};

            unsafe {
                let hkey = open_fusion_key(KEY_READ)?;
                let config = LogConfiguration {
                    force_log: read_bool(hkey, FORCE_LOG),
                    log_failures: read_bool(hkey, LOG_FAILURES),
                    log_resource_binds: read_bool(hkey, LOG_RESOURCE_BINDS),
                    log_directory: read_string(hkey, LOG_PATH).filter(|s| !s.is_empty()),
                };
                let _ = RegCloseKey(hkey);
                log::debug!("read configuration from HKLM\\{FUSION_KEY_PATH}: {config:?}");
                Ok(config)
            }
        }

        #[cfg(not(windows))]
        {
            anyhow::bail!("the Fusion registry is only available on Windows")
        }
    }

    fn write(&self, config: &LogConfiguration) -> Result<()> {
        #[cfg(windows)]
        {
            use windows::Win32::System::Registry::{RegCloseKey, KEY_WRITE};

            unsafe {
                let hkey = open_fusion_key(KEY_WRITE)?;
                let written: Result<()> = (|| {
                    set_dword(hkey, LOG_FAILURES, config.log_failures as u32)?;
                    set_dword(hkey, FORCE_LOG, config.force_log as u32)?;
                    set_string(hkey, LOG_PATH, config.log_directory_str())?;
                    set_dword(hkey, LOG_RESOURCE_BINDS, config.log_resource_binds as u32)
                })();
                let _ = RegCloseKey(hkey);
                written?;
            }
            log::info!("configuration written to HKLM\\{FUSION_KEY_PATH}");
            Ok(())
        }

        #[cfg(not(windows))]
        {
            let _ = config;
            anyhow::bail!("the Fusion registry is only available on Windows")
        }
    }
}

#[cfg(windows)]
unsafe fn open_fusion_key(
    sam: windows::Win32::System::Registry::REG_SAM_FLAGS,
) -> Result<windows::Win32::System::Registry::HKEY> {
    use windows::core::HSTRING;
    use windows::Win32::Foundation::ERROR_SUCCESS;
    use windows::Win32::System::Registry::{RegOpenKeyExW, HKEY, HKEY_LOCAL_MACHINE};

    let path = HSTRING::from(FUSION_KEY_PATH);
    let mut hkey = HKEY::default();
    let result = RegOpenKeyExW(HKEY_LOCAL_MACHINE, &path, 0, sam, &mut hkey);
    if result != ERROR_SUCCESS {
        anyhow::bail!(
            "failed to open HKLM\\{FUSION_KEY_PATH}: error code {}",
            result.0
        );
    }
    Ok(hkey)
}

/// A flag is on only when it is stored as DWORD 1.
#[cfg(windows)]
unsafe fn read_bool(hkey: windows::Win32::System::Registry::HKEY, name: &str) -> bool {
    use windows::core::{HSTRING, PCWSTR};
    use windows::Win32::Foundation::ERROR_SUCCESS;
    use windows::Win32::System::Registry::{RegQueryValueExW, REG_DWORD, REG_VALUE_TYPE};

    let name = HSTRING::from(name);
    let mut data = [0u8; 4];
    let mut size = data.len() as u32;
    let mut type_code = REG_VALUE_TYPE(0);

    let result = RegQueryValueExW(
        hkey,
        PCWSTR(name.as_ptr()),
        None,
        Some(&mut type_code),
        Some(data.as_mut_ptr()),
        Some(&mut size),
    );

    result == ERROR_SUCCESS && type_code == REG_DWORD && u32::from_le_bytes(data) == 1
}

#[cfg(windows)]
unsafe fn read_string(hkey: windows::Win32::System::Registry::HKEY, name: &str) -> Option<String> {
    use windows::core::{HSTRING, PCWSTR};
    use windows::Win32::Foundation::ERROR_SUCCESS;
    use windows::Win32::System::Registry::{RegQueryValueExW, REG_VALUE_TYPE};

    let name = HSTRING::from(name);
    let mut size = 0u32;
    let mut type_code = REG_VALUE_TYPE(0);

    // Get size
    let result = RegQueryValueExW(
        hkey,
        PCWSTR(name.as_ptr()),
        None,
        Some(&mut type_code),
        None,
        Some(&mut size),
    );

    if result != ERROR_SUCCESS || size == 0 {
        return None;
    }

    // Read value
    let mut buffer = vec![0u16; (size / 2) as usize];
    let result = RegQueryValueExW(
        hkey,
        PCWSTR(name.as_ptr()),
        None,
        Some(&mut type_code),
        Some(buffer.as_mut_ptr() as *mut u8),
        Some(&mut size),
    );

    if result != ERROR_SUCCESS {
        return None;
    }

    // Remove null terminator and convert
    let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    Some(String::from_utf16_lossy(&buffer[..len]))
}

#[cfg(windows)]
unsafe fn set_dword(
    hkey: windows::Win32::System::Registry::HKEY,
    name: &str,
    value: u32,
) -> Result<()> {
    use windows::core::{HSTRING, PCWSTR};
    use windows::Win32::Foundation::ERROR_SUCCESS;
    use windows::Win32::System::Registry::{RegSetValueExW, REG_DWORD};

    let wide = HSTRING::from(name);
    let result = RegSetValueExW(
        hkey,
        PCWSTR(wide.as_ptr()),
        0,
        REG_DWORD,
        Some(&value.to_le_bytes()),
    );
    if result != ERROR_SUCCESS {
        anyhow::bail!("failed to write {name}: error code {}", result.0);
    }
    Ok(())
}

#[cfg(windows)]
unsafe fn set_string(
    hkey: windows::Win32::System::Registry::HKEY,
    name: &str,
    value: &str,
) -> Result<()> {
    use windows::core::{HSTRING, PCWSTR};
    use windows::Win32::Foundation::ERROR_SUCCESS;
    use windows::Win32::System::Registry::{RegSetValueExW, REG_SZ};

    let wide = HSTRING::from(name);
    // REG_SZ takes UTF-16 with a terminating NUL
    let data: Vec<u8> = value
        .encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect();
    let result = RegSetValueExW(hkey, PCWSTR(wide.as_ptr()), 0, REG_SZ, Some(&data));
    if result != ERROR_SUCCESS {
        anyhow::bail!("failed to write {name}: error code {}", result.0);
    }
    Ok(())
}

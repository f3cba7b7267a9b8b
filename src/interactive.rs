//! Console surface shown when the program starts without arguments.
//!
//! Shows the current settings, takes edits as `ConfigEdit` messages applied
//! to a single owned configuration, and on apply validates the log
//! directory before handing the serialized change to the relauncher. The
//! actual registry write happens in the relaunched child (batch mode).

use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;

use crate::cmdline;
use crate::config::{ConfigEdit, LogConfiguration};
use crate::elevation::{LaunchError, PrivilegeProbe, ProcessLauncher, Relauncher};
use crate::registry::ConfigStore;

enum Command {
    Edit(ConfigEdit),
    Show,
    Apply,
    ApplyAndExit,
    Cancel,
    Help,
}

pub fn run<P, L>(store: &dyn ConfigStore, relauncher: &Relauncher<P, L>) -> Result<()>
where
    P: PrivilegeProbe,
    L: ProcessLauncher,
{
    let mut config = store.read()?;

    println!("Fusion assembly-bind logging configuration");
    if relauncher.elevation_required() {
        println!("Applying changes will ask for administrator consent (UAC).");
    }
    println!();
    print_config(&config);
    print_help();

    loop {
        let Some(line) = prompt("> ")? else {
            // stdin closed
            break;
        };
        match parse_command(line.trim(), &config) {
            Some(Command::Edit(edit)) => {
                config.apply(edit);
                print_config(&config);
            }
            Some(Command::Show) => print_config(&config),
            Some(Command::Help) => print_help(),
            Some(Command::Apply) => {
                apply(&config, relauncher)?;
            }
            Some(Command::ApplyAndExit) => {
                apply(&config, relauncher)?;
                break;
            }
            Some(Command::Cancel) => break,
            None => {
                if !line.trim().is_empty() {
                    println!("Unknown command '{}'. Type 'help' for the list.", line.trim());
                }
            }
        }
    }
    Ok(())
}

/// Validate the directory and hand the change to the relauncher.
/// Returns true when the child ran to completion.
fn apply<P, L>(config: &LogConfiguration, relauncher: &Relauncher<P, L>) -> Result<bool>
where
    P: PrivilegeProbe,
    L: ProcessLauncher,
{
    if !confirm_log_directory(config)? {
        return Ok(false);
    }

    let arguments = cmdline::format(config);
    match relauncher.start_self(&arguments) {
        Ok(()) => {
            println!("Configuration applied.");
            Ok(true)
        }
        Err(LaunchError::ElevationDenied) => {
            log::warn!("elevation consent was declined");
            println!("Elevation was declined; nothing was written.");
            Ok(false)
        }
        Err(err) => {
            log::error!("relaunch failed: {err}");
            println!("Could not apply the configuration: {err}");
            Ok(false)
        }
    }
}

/// Interactive-only directory checks: the batch path writes whatever it is
/// given, but here a bad directory aborts the apply before anything runs.
fn confirm_log_directory(config: &LogConfiguration) -> Result<bool> {
    let dir = config.log_directory_str();

    if !directory_name_is_valid(dir) {
        println!("The directory name '{dir}' is not valid.");
        return Ok(false);
    }

    match probe_directory(Path::new(dir)) {
        DirectoryStatus::Exists => Ok(true),
        DirectoryStatus::IsFile => {
            println!(
                "Cannot use {dir} as the log path because it points to an existing file. \
                 Delete the file or pick a different directory."
            );
            Ok(false)
        }
        DirectoryStatus::Missing => loop {
            let Some(answer) =
                prompt(&format!("The log directory {dir} does not exist. Create it? [y/n/c] "))?
            else {
                return Ok(false);
            };
            match answer.trim() {
                "y" | "Y" => return Ok(try_create_directory(Path::new(dir))),
                "n" | "N" => return Ok(true),
                "c" | "C" => return Ok(false),
                _ => continue,
            }
        },
    }
}

/// Characters the platform rejects in paths, separators excluded.
const INVALID_PATH_CHARS: [char; 4] = ['"', '<', '>', '|'];

fn directory_name_is_valid(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_control() || INVALID_PATH_CHARS.contains(&c))
}

enum DirectoryStatus {
    Exists,
    IsFile,
    Missing,
}

fn probe_directory(path: &Path) -> DirectoryStatus {
    if path.is_dir() {
        DirectoryStatus::Exists
    } else if path.is_file() {
        DirectoryStatus::IsFile
    } else {
        DirectoryStatus::Missing
    }
}

fn try_create_directory(path: &Path) -> bool {
    match std::fs::create_dir_all(path) {
        Ok(()) => path.is_dir(),
        Err(err) => {
            // Another process may have created it in the meantime.
            if path.is_dir() {
                return true;
            }
            println!("Directory {} could not be created: {err}", path.display());
            false
        }
    }
}

fn parse_command(line: &str, current: &LogConfiguration) -> Option<Command> {
    if let Some(rest) = line.strip_prefix("path ") {
        return Some(Command::Edit(ConfigEdit::LogDirectory(
            rest.trim().to_string(),
        )));
    }
    match line {
        "1" | "force" => Some(Command::Edit(ConfigEdit::ForceLog(!current.force_log))),
        "2" | "failures" => Some(Command::Edit(ConfigEdit::LogFailures(
            !current.log_failures,
        ))),
        "3" | "resources" => Some(Command::Edit(ConfigEdit::LogResourceBinds(
            !current.log_resource_binds,
        ))),
        "clear" => Some(Command::Edit(ConfigEdit::LogDirectory(String::new()))),
        "show" => Some(Command::Show),
        "apply" => Some(Command::Apply),
        "ok" => Some(Command::ApplyAndExit),
        "cancel" | "quit" | "exit" => Some(Command::Cancel),
        "help" | "?" => Some(Command::Help),
        _ => None,
    }
}

fn print_config(config: &LogConfiguration) {
    let on_off = |on: bool| if on { "on" } else { "off" };
    println!("  1  Log all binds (ForceLog)                {}", on_off(config.force_log));
    println!("  2  Log failed binds (LogFailures)          {}", on_off(config.log_failures));
    println!("  3  Log resource binds (LogResourceBinds)   {}", on_off(config.log_resource_binds));
    let dir = config.log_directory_str();
    println!(
        "     Log directory (LogPath)                 {}",
        if dir.is_empty() { "<not set>" } else { dir }
    );
    println!();
}

fn print_help() {
    println!("Commands:");
    println!("  1 | 2 | 3     toggle the numbered setting");
    println!("  path <dir>    set the log directory");
    println!("  clear         clear the log directory");
    println!("  show          show the current settings");
    println!("  apply         write the settings and stay");
    println!("  ok            write the settings and exit");
    println!("  cancel        exit without writing");
    println!();
}

/// Print `message` and read one line; None when stdin is closed.
fn prompt(message: &str) -> Result<Option<String>> {
    print!("{message}");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_directory_names() {
        assert!(directory_name_is_valid(r"c:\fusion\logs"));
        assert!(directory_name_is_valid(r"c:\fusion logs"));
        assert!(directory_name_is_valid("/var/log/fusion"));
    }

    #[test]
    fn invalid_directory_names() {
        assert!(!directory_name_is_valid(""));
        assert!(!directory_name_is_valid("c:\\logs\"quoted"));
        assert!(!directory_name_is_valid("c:\\a<b"));
        assert!(!directory_name_is_valid("c:\\a|b"));
        assert!(!directory_name_is_valid("c:\\a\tb"));
    }

    #[test]
    fn probes_existing_directory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(probe_directory(dir.path()), DirectoryStatus::Exists));

        let file = dir.path().join("fusion.log");
        std::fs::write(&file, b"").unwrap();
        assert!(matches!(probe_directory(&file), DirectoryStatus::IsFile));

        let missing = dir.path().join("does-not-exist");
        assert!(matches!(probe_directory(&missing), DirectoryStatus::Missing));
    }

    #[test]
    fn create_directory_reports_success() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("new").join("nested");
        assert!(try_create_directory(&target));
        assert!(target.is_dir());
        // Already existing is fine too
        assert!(try_create_directory(&target));
    }

    #[test]
    fn toggle_commands_negate_the_current_value() {
        let mut config = LogConfiguration::default();
        match parse_command("1", &config) {
            Some(Command::Edit(ConfigEdit::ForceLog(true))) => {}
            other => panic!("unexpected: {:?}", other.is_some()),
        }
        config.force_log = true;
        match parse_command("force", &config) {
            Some(Command::Edit(ConfigEdit::ForceLog(false))) => {}
            other => panic!("unexpected: {:?}", other.is_some()),
        }
    }

    #[test]
    fn path_command_takes_the_rest_of_the_line() {
        let config = LogConfiguration::default();
        match parse_command(r"path c:\fusion logs", &config) {
            Some(Command::Edit(ConfigEdit::LogDirectory(dir))) => {
                assert_eq!(dir, r"c:\fusion logs");
            }
            other => panic!("unexpected: {:?}", other.is_some()),
        }
    }

    #[test]
    fn unknown_input_is_not_a_command() {
        let config = LogConfiguration::default();
        assert!(parse_command("bogus", &config).is_none());
        assert!(parse_command("", &config).is_none());
    }
}

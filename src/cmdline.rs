//! Command-line serialization of the configuration.
//!
//! This is the wire contract between the unprivileged process and its
//! elevated relaunch: `format` emits exactly four tokens in fixed order and
//! `parse` recognizes exactly those four shapes. Parsing is total and
//! permissive; an unrecognized token is a no-op because batch mode has no
//! interactive user to report a parse error to.

use crate::config::{ConfigEdit, LogConfiguration};

/// Serialize a configuration as a single argument string.
///
/// Token order is fixed: force, failures, resources, path. The path token is
/// double-quoted as a whole because the directory may contain spaces; the
/// shell-level tokenizer on the receiving side strips the quotes again.
pub fn format(config: &LogConfiguration) -> String {
    let sign = |on: bool| if on { '+' } else { '-' };
    [
        format!("/force{}", sign(config.force_log)),
        format!("/failures{}", sign(config.log_failures)),
        format!("/resources{}", sign(config.log_resource_binds)),
        format!("\"/path:{}\"", config.log_directory_str()),
    ]
    .join(" ")
}

/// Parse argument tokens into a configuration delta.
///
/// Starts from the defaults and applies tokens in order, so a later
/// occurrence of the same flag overrides an earlier one.
pub fn parse<I, S>(args: I) -> LogConfiguration
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut delta = LogConfiguration::default();
    for arg in args {
        if let Some(edit) = parse_token(arg.as_ref()) {
            delta.apply(edit);
        }
    }
    delta
}

/// Match one token against the four recognized patterns, first match wins.
fn parse_token(arg: &str) -> Option<ConfigEdit> {
    if let Some(on) = flag_suffix(arg, "/force") {
        return Some(ConfigEdit::ForceLog(on));
    }
    if let Some(on) = flag_suffix(arg, "/failures") {
        return Some(ConfigEdit::LogFailures(on));
    }
    if let Some(on) = flag_suffix(arg, "/resources") {
        return Some(ConfigEdit::LogResourceBinds(on));
    }
    if let Some(rest) = arg.strip_prefix("/path:") {
        // Captures everything after the colon, embedded separators included.
        return Some(ConfigEdit::LogDirectory(rest.to_string()));
    }
    None
}

/// `/name+` -> true, `/name-` -> false, anything else is not this flag.
fn flag_suffix(arg: &str, name: &str) -> Option<bool> {
    match arg.strip_prefix(name)? {
        "+" => Some(true),
        "-" => Some(false),
        _ => None,
    }
}

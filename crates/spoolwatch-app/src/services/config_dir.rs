// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-aware configuration directory resolution.

use std::path::PathBuf;

/// File name of the JSON configuration inside the config directory.
pub const CONFIG_FILE: &str = "config.json";

/// Return the spoolwatch configuration directory.
///
/// Not created here: a missing directory just means default settings.
pub fn config_dir() -> PathBuf {
    config_base(|name| std::env::var(name).ok()).join("spoolwatch")
}

/// Path of the configuration file used when none is given on the command line.
pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

fn config_base(var: impl Fn(&str) -> Option<String>) -> PathBuf {
    // Try XDG config dir, then fallback to home
    if let Some(xdg) = var("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg);
    }
    if let Some(home) = var("HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(home).join(".config");
    }
    // Last resort
    PathBuf::from("/tmp")
}

//! Helpers shared by the integration tests that drive external tools.

#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

static TOOL_LOCK: Mutex<()> = Mutex::new(());

/// Serialise tests that write and then execute scripts.
///
/// A script still open for writing in one thread cannot be executed by a
/// child forked from another thread (`ETXTBSY`).
pub fn tool_lock() -> MutexGuard<'static, ()> {
    TOOL_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Write an executable `/bin/sh` script named `name` into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

/// Create a placeholder file standing in for a video.
pub fn placeholder_video(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"placeholder video bytes").expect("write placeholder video");
    path
}

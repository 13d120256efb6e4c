use std::fmt;

use crate::error::{ContextError, ContextResult};

/// Severity threshold of the shared logging configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    Fatal = 4,
}

impl LogLevel {
    pub(crate) fn to_raw(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warn,
            3 => LogLevel::Error,
            _ => LogLevel::Fatal,
        }
    }
}

/// Crash-dump collection policy shared across hooked processes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CrashDumpsType {
    None = 0,
    Mini = 1,
    Full = 2,
}

impl CrashDumpsType {
    pub(crate) fn to_raw(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            1 => CrashDumpsType::Mini,
            2 => CrashDumpsType::Full,
            _ => CrashDumpsType::None,
        }
    }
}

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_DUMP_PATH_LEN: usize = 260;

/// Flat parameter block handed to a child process about to be hooked.
///
/// Plain data with fixed-size NUL-padded fields so the block can cross a
/// process boundary as raw bytes.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Parameters {
    instance_name: [u8; MAX_NAME_LEN + 1],
    current_shm_name: [u8; MAX_NAME_LEN + 1],
    current_inverse_shm_name: [u8; MAX_NAME_LEN + 1],
    crash_dumps_path: [u8; MAX_DUMP_PATH_LEN + 4],
    pub debug_mode: bool,
    pub log_level: LogLevel,
    pub crash_dumps_type: CrashDumpsType,
}

fn copy_into(dest: &mut [u8], value: &str, context: &'static str) -> ContextResult<()> {
    if value.len() >= dest.len() {
        return Err(ContextError::InvalidParameter { context });
    }
    dest.fill(0);
    dest[..value.len()].copy_from_slice(value.as_bytes());
    Ok(())
}

fn read_from(src: &[u8]) -> &str {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    std::str::from_utf8(&src[..end]).unwrap_or("")
}

impl Parameters {
    /// Parameters for a fresh instance. Tree segment names follow the
    /// `<instance>_shm` / `<instance>_inverse_shm` convention; the
    /// authoritative names live in the shared configuration afterwards.
    pub fn new(instance_name: &str) -> ContextResult<Self> {
        let mut params = Parameters {
            instance_name: [0; MAX_NAME_LEN + 1],
            current_shm_name: [0; MAX_NAME_LEN + 1],
            current_inverse_shm_name: [0; MAX_NAME_LEN + 1],
            crash_dumps_path: [0; MAX_DUMP_PATH_LEN + 4],
            debug_mode: false,
            log_level: LogLevel::Info,
            crash_dumps_type: CrashDumpsType::None,
        };
        params.set_instance_name(instance_name)?;
        params.set_current_shm_name(&format!("{instance_name}_shm"))?;
        params.set_current_inverse_shm_name(&format!("{instance_name}_inverse_shm"))?;
        Ok(params)
    }

    pub fn instance_name(&self) -> &str {
        read_from(&self.instance_name)
    }

    pub fn current_shm_name(&self) -> &str {
        read_from(&self.current_shm_name)
    }

    pub fn current_inverse_shm_name(&self) -> &str {
        read_from(&self.current_inverse_shm_name)
    }

    pub fn crash_dumps_path(&self) -> &str {
        read_from(&self.crash_dumps_path)
    }

    pub fn set_instance_name(&mut self, value: &str) -> ContextResult<()> {
        copy_into(&mut self.instance_name, value, "parameters.instance_name")
    }

    pub fn set_current_shm_name(&mut self, value: &str) -> ContextResult<()> {
        copy_into(&mut self.current_shm_name, value, "parameters.shm_name")
    }

    pub fn set_current_inverse_shm_name(&mut self, value: &str) -> ContextResult<()> {
        copy_into(
            &mut self.current_inverse_shm_name,
            value,
            "parameters.inverse_shm_name",
        )
    }

    pub fn set_crash_dumps_path(&mut self, value: &str) -> ContextResult<()> {
        copy_into(&mut self.crash_dumps_path, value, "parameters.dumps_path")
    }
}

impl fmt::Debug for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameters")
            .field("instance_name", &self.instance_name())
            .field("current_shm_name", &self.current_shm_name())
            .field(
                "current_inverse_shm_name",
                &self.current_inverse_shm_name(),
            )
            .field("crash_dumps_path", &self.crash_dumps_path())
            .field("debug_mode", &self.debug_mode)
            .field("log_level", &self.log_level)
            .field("crash_dumps_type", &self.crash_dumps_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_convention() {
        let params = Parameters::new("vfs_test").unwrap();
        assert_eq!(params.instance_name(), "vfs_test");
        assert_eq!(params.current_shm_name(), "vfs_test_shm");
        assert_eq!(params.current_inverse_shm_name(), "vfs_test_inverse_shm");
        assert_eq!(params.crash_dumps_path(), "");
    }

    #[test]
    fn oversized_name_is_rejected() {
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            Parameters::new(&long),
            Err(ContextError::InvalidParameter { .. })
        ));
    }
}

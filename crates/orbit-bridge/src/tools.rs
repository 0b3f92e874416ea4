//! Tool resolution and availability checking
//!
//! Resolves the `adb`, `scrcpy` and `arp` binaries once at startup. An
//! explicitly configured path wins; otherwise `PATH` is searched, and for adb
//! the Android SDK locations from `ANDROID_HOME` / `ANDROID_SDK_ROOT`.

use std::path::{Path, PathBuf};

use crate::executor::Tool;

/// Programs used for each [`Tool`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub adb: PathBuf,
    pub scrcpy: PathBuf,
    pub arp: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            adb: PathBuf::from(Tool::Bridge.program_name()),
            scrcpy: PathBuf::from(Tool::Mirror.program_name()),
            arp: PathBuf::from(Tool::Arp.program_name()),
        }
    }
}

impl ToolPaths {
    /// Program to execute for `tool`
    pub fn program(&self, tool: Tool) -> &Path {
        match tool {
            Tool::Bridge => &self.adb,
            Tool::Mirror => &self.scrcpy,
            Tool::Arp => &self.arp,
        }
    }

    /// Replace the program for `tool`
    pub fn with_program(mut self, tool: Tool, program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        match tool {
            Tool::Bridge => self.adb = program,
            Tool::Mirror => self.scrcpy = program,
            Tool::Arp => self.arp = program,
        }
        self
    }
}

/// Which external tools could be located
#[derive(Debug, Clone, Default)]
pub struct ToolAvailability {
    /// Resolved adb binary
    pub adb: Option<PathBuf>,

    /// Resolved scrcpy binary
    pub scrcpy: Option<PathBuf>,

    /// Resolved arp binary
    pub arp: Option<PathBuf>,
}

impl ToolAvailability {
    /// Check tool availability (run once at startup)
    pub fn check(configured: &ToolPaths) -> Self {
        let availability = Self {
            adb: Self::resolve_first(&Self::adb_candidates(&configured.adb)),
            scrcpy: Self::resolve_first(&[configured.scrcpy.clone()]),
            arp: Self::resolve_first(&[configured.arp.clone()]),
        };

        tracing::debug!("Tool availability: {:?}", availability);
        availability
    }

    /// Candidate adb locations, most specific first
    fn adb_candidates(configured: &Path) -> Vec<PathBuf> {
        let mut paths = vec![configured.to_path_buf()];
        let binary = if cfg!(windows) { "adb.exe" } else { "adb" };

        if let Ok(android_home) = std::env::var("ANDROID_HOME") {
            paths.push(PathBuf::from(android_home).join("platform-tools").join(binary));
        }

        if let Ok(sdk_root) = std::env::var("ANDROID_SDK_ROOT") {
            paths.push(PathBuf::from(sdk_root).join("platform-tools").join(binary));
        }

        paths
    }

    fn resolve_first(candidates: &[PathBuf]) -> Option<PathBuf> {
        candidates.iter().find_map(|candidate| {
            which::which(candidate)
                .inspect_err(|e| {
                    tracing::debug!("{} not resolvable: {}", candidate.display(), e)
                })
                .ok()
        })
    }

    /// Paths to hand the executor: resolved where found, configured otherwise
    ///
    /// Unresolved tools keep their configured name so invoking them reports
    /// `ExecError::NotFound` at the call site.
    pub fn paths(&self, configured: &ToolPaths) -> ToolPaths {
        ToolPaths {
            adb: self.adb.clone().unwrap_or_else(|| configured.adb.clone()),
            scrcpy: self
                .scrcpy
                .clone()
                .unwrap_or_else(|| configured.scrcpy.clone()),
            arp: self.arp.clone().unwrap_or_else(|| configured.arp.clone()),
        }
    }

    /// Get user-friendly message for a missing adb
    pub fn bridge_unavailable_message(&self) -> Option<&'static str> {
        if self.adb.is_some() {
            None
        } else {
            Some("adb not found. Install Android platform-tools or set ANDROID_HOME.")
        }
    }

    /// Get user-friendly message for a missing scrcpy
    pub fn mirror_unavailable_message(&self) -> Option<&'static str> {
        if self.scrcpy.is_some() {
            None
        } else {
            Some("scrcpy not found. Install scrcpy to mirror device screens.")
        }
    }
}

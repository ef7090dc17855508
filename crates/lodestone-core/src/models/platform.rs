//! Target platform description.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating system / architecture pair a build targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetOs {
    #[serde(rename = "windows")]
    Windows,
    #[serde(rename = "macos")]
    MacOS,
    #[serde(rename = "linux-x64")]
    LinuxX64,
    #[serde(rename = "linux-arm64")]
    LinuxArm64,
    #[serde(rename = "linux-flatpak")]
    LinuxFlatpak,
}

impl TargetOs {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetOs::Windows => "windows",
            TargetOs::MacOS => "macos",
            TargetOs::LinuxX64 => "linux-x64",
            TargetOs::LinuxArm64 => "linux-arm64",
            TargetOs::LinuxFlatpak => "linux-flatpak",
        }
    }

    /// True for every Linux flavour.
    pub fn is_linux(&self) -> bool {
        matches!(
            self,
            TargetOs::LinuxX64 | TargetOs::LinuxArm64 | TargetOs::LinuxFlatpak
        )
    }
}

impl fmt::Display for TargetOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetOs {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "windows" | "win" | "win64" => Ok(TargetOs::Windows),
            "macos" | "mac" | "osx" | "darwin" => Ok(TargetOs::MacOS),
            "linux" | "linux-x64" | "linux-x86_64" | "linux64" => Ok(TargetOs::LinuxX64),
            "linux-arm64" | "linux-aarch64" => Ok(TargetOs::LinuxArm64),
            "linux-flatpak" | "flatpak" => Ok(TargetOs::LinuxFlatpak),
            other => Err(format!("Unknown platform: {}", other)),
        }
    }
}

/// Where a [`PlatformDescriptor`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformSource {
    Auto,
    Override,
}

/// The platform an operation targets, derived once per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDescriptor {
    pub os: TargetOs,
    pub source: PlatformSource,
}

impl PlatformDescriptor {
    /// Describe the host this process runs on.
    pub fn detect() -> Self {
        Self {
            os: crate::platform::host_target_os(),
            source: PlatformSource::Auto,
        }
    }

    /// Use an explicitly configured platform.
    pub fn with_override(os: TargetOs) -> Self {
        Self {
            os,
            source: PlatformSource::Override,
        }
    }

    /// Use the override when one is configured, otherwise detect the host.
    pub fn resolve(platform_override: Option<TargetOs>) -> Self {
        platform_override
            .map(Self::with_override)
            .unwrap_or_else(Self::detect)
    }
}

//! Facts about the machine kiln runs on.
//!
//! Recipes never read the process environment themselves. Everything they
//! may branch on (Linux distribution, whether `sudo` is usable, the system
//! requirements mode) is probed once into a [`HostEnvironment`] and passed
//! in. Tests construct the value directly.

use std::io::IsTerminal;
use std::str::FromStr;

use kiln_schema::Os;

/// How system prerequisites are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SysrequiresMode {
    /// Run the install commands.
    #[default]
    Enabled,
    /// Fail, listing the commands that would have run.
    Verify,
    /// Skip with a warning.
    Disabled,
}

impl FromStr for SysrequiresMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "enabled" => Ok(Self::Enabled),
            "verify" => Ok(Self::Verify),
            "disabled" => Ok(Self::Disabled),
            _ => Err(format!(
                "invalid system requirements mode '{s}' (expected enabled, verify or disabled)"
            )),
        }
    }
}

impl std::fmt::Display for SysrequiresMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Enabled => "enabled",
            Self::Verify => "verify",
            Self::Disabled => "disabled",
        };
        write!(f, "{s}")
    }
}

/// Probed host facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEnvironment {
    pub os: Os,
    /// `ID=` from `/etc/os-release`, lowercased (e.g. `alpine`, `ubuntu`).
    pub distro: Option<String>,
    pub is_root: bool,
    pub sudo_on_path: bool,
    pub stdout_is_tty: bool,
    /// Value of `KILN_SYSREQUIRES_SUDO`, when set.
    pub sudo_override: Option<bool>,
    pub sysrequires_mode: SysrequiresMode,
}

impl HostEnvironment {
    /// A host with nothing special about it: not root, no sudo, no distro.
    pub fn new(os: Os) -> Self {
        Self {
            os,
            distro: None,
            is_root: false,
            sudo_on_path: false,
            stdout_is_tty: false,
            sudo_override: None,
            sysrequires_mode: SysrequiresMode::Enabled,
        }
    }

    pub fn with_distro(mut self, distro: &str) -> Self {
        self.distro = Some(distro.to_lowercase());
        self
    }

    /// Probe the running machine.
    pub fn detect() -> Self {
        let os = Os::current();
        let distro = if os == Os::Linux {
            std::fs::read_to_string("/etc/os-release")
                .ok()
                .and_then(|content| parse_os_release_id(&content))
        } else {
            None
        };

        let sudo_override = std::env::var("KILN_SYSREQUIRES_SUDO")
            .ok()
            .and_then(|v| parse_env_bool(&v));

        let sysrequires_mode = match std::env::var("KILN_SYSREQUIRES_MODE") {
            Ok(raw) => raw.parse().unwrap_or_else(|e: String| {
                tracing::warn!("{e}; using 'enabled'");
                SysrequiresMode::Enabled
            }),
            Err(_) => SysrequiresMode::Enabled,
        };

        let host = Self {
            os,
            distro,
            is_root: effective_uid_is_root(),
            sudo_on_path: which::which("sudo").is_ok(),
            stdout_is_tty: std::io::stdout().is_terminal(),
            sudo_override,
            sysrequires_mode,
        };
        tracing::debug!(?host, "Detected host environment");
        host
    }

    pub fn is_linux(&self) -> bool {
        self.os == Os::Linux
    }

    /// Alpine Linux (musl).
    pub fn is_alpine(&self) -> bool {
        self.is_linux() && self.distro.as_deref() == Some("alpine")
    }

    /// Whether privileged commands should be prefixed with `sudo`.
    pub fn sudo_enabled(&self) -> bool {
        if let Some(forced) = self.sudo_override {
            return forced;
        }
        !(self.os == Os::Windows || !self.sudo_on_path || self.is_root)
    }

    /// `"sudo "`, `"sudo -A "` (no terminal to prompt on) or `""`.
    pub fn sudo_prefix(&self) -> &'static str {
        match (self.sudo_enabled(), self.stdout_is_tty) {
            (false, _) => "",
            (true, true) => "sudo ",
            (true, false) => "sudo -A ",
        }
    }
}

/// Extract the `ID=` field from os-release content.
fn parse_os_release_id(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let value = line.trim().strip_prefix("ID=")?;
        let value = value.trim_matches(|c| c == '"' || c == '\'');
        (!value.is_empty()).then(|| value.to_lowercase())
    })
}

fn parse_env_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn effective_uid_is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn effective_uid_is_root() -> bool {
    false
}

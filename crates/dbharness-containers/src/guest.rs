//! Guest operating-system probe
//!
//! Nearly every Linux image ships `/etc/os-release`, which tells us the
//! distro and, from that, which package manager is available inside the
//! container. Combined with the server's own version report this gives a
//! complete picture of what a test actually ran against.

use std::collections::HashMap;

use dbharness_core::ServerInfo;

/// Package format of the guest OS, guessed from `ID` / `ID_LIKE`.
///
/// A best-effort classification; oddball formats are reported as `Unknown`
/// and package management is skipped for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packaging {
    Debian,
    Redhat,
    Alpine,
    Unknown,
}

/// Parsed `/etc/os-release` plus the server's self-reported metadata.
#[derive(Debug, Clone, Default)]
pub struct GuestOsDetails {
    /// Key/value pairs from the guest's `/etc/os-release`
    pub os_release: HashMap<String, String>,
    /// Server product and client driver versions
    pub server: ServerInfo,
}

impl GuestOsDetails {
    pub fn new(os_release: HashMap<String, String>, server: ServerInfo) -> Self {
        Self { os_release, server }
    }

    /// Distro ID, e.g. `debian`, `alpine`, `ol`
    pub fn os_id(&self) -> Option<&str> {
        self.os_release.get("ID").map(String::as_str)
    }

    pub fn os_version_id(&self) -> Option<&str> {
        self.os_release.get("VERSION_ID").map(String::as_str)
    }

    pub fn os_pretty_name(&self) -> Option<&str> {
        self.os_release.get("PRETTY_NAME").map(String::as_str)
    }

    /// Guess the guest's package format.
    pub fn packaging(&self) -> Packaging {
        match self.os_id().unwrap_or_default() {
            "debian" | "ubuntu" => Packaging::Debian,
            "almalinux" | "centos" | "fedora" | "rhel" | "rocky" => Packaging::Redhat,
            "alpine" => Packaging::Alpine,
            _ => {
                let id_like = self.os_release.get("ID_LIKE").map(String::as_str).unwrap_or("");
                if id_like.contains("debian") {
                    Packaging::Debian
                } else if id_like.contains("rhel") {
                    Packaging::Redhat
                } else {
                    Packaging::Unknown
                }
            }
        }
    }
}

/// Parse the `KEY=value` lines of an `os-release` file.
///
/// Values may be quoted; blank lines and `#` comments are skipped, which
/// matches the freedesktop.org file format.
pub fn parse_os_release(text: &str) -> HashMap<String, String> {
    let mut entries = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            entries.insert(key.trim().to_string(), value.to_string());
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DEBIAN_OS_RELEASE: &str = r#"
PRETTY_NAME="Debian GNU/Linux 12 (bookworm)"
NAME="Debian GNU/Linux"
VERSION_ID="12"
VERSION="12 (bookworm)"
VERSION_CODENAME=bookworm
ID=debian
HOME_URL="https://www.debian.org/"
"#;

    #[test]
    fn parses_quoted_and_bare_values() {
        let entries = parse_os_release(DEBIAN_OS_RELEASE);
        assert_eq!(entries.get("ID").map(String::as_str), Some("debian"));
        assert_eq!(entries.get("VERSION_ID").map(String::as_str), Some("12"));
        assert_eq!(
            entries.get("PRETTY_NAME").map(String::as_str),
            Some("Debian GNU/Linux 12 (bookworm)")
        );
        assert_eq!(entries.get("VERSION_CODENAME").map(String::as_str), Some("bookworm"));
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let entries = parse_os_release("# a comment\n\nID=alpine\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.get("ID").map(String::as_str), Some("alpine"));
    }

    #[test]
    fn packaging_from_id() {
        for (id, expected) in [
            ("debian", Packaging::Debian),
            ("ubuntu", Packaging::Debian),
            ("alpine", Packaging::Alpine),
            ("fedora", Packaging::Redhat),
            ("rocky", Packaging::Redhat),
        ] {
            let details =
                GuestOsDetails::new(parse_os_release(&format!("ID={}", id)), ServerInfo::default());
            assert_eq!(details.packaging(), expected, "ID={}", id);
        }
    }

    #[test]
    fn packaging_falls_back_to_id_like() {
        let details = GuestOsDetails::new(
            parse_os_release("ID=ol\nID_LIKE=\"fedora rhel\""),
            ServerInfo::default(),
        );
        assert_eq!(details.packaging(), Packaging::Redhat);

        let details = GuestOsDetails::new(
            parse_os_release("ID=linuxmint\nID_LIKE=\"ubuntu debian\""),
            ServerInfo::default(),
        );
        assert_eq!(details.packaging(), Packaging::Debian);
    }

    #[test]
    fn unknown_distro_reports_unknown_packaging() {
        let details = GuestOsDetails::new(parse_os_release("ID=qnap"), ServerInfo::default());
        assert_eq!(details.packaging(), Packaging::Unknown);

        let empty = GuestOsDetails::default();
        assert_eq!(empty.packaging(), Packaging::Unknown);
    }
}

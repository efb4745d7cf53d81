use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use ts_rs::TS;

/// Windows reserved device names
const WINDOWS_RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const WINDOWS_FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const WINDOWS_MAX_COMPONENT: usize = 255;
const WINDOWS_MAX_PATH: usize = 260;
const POSIX_MAX_COMPONENT: usize = 255;
const MACOS_MAX_PATH: usize = 1024;
const LINUX_MAX_PATH: usize = 4096;

/// Naming rules a batch is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Platform {
    Windows,
    #[serde(rename = "macos")]
    MacOs,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    pub fn max_path_len(self) -> usize {
        match self {
            Self::Windows => WINDOWS_MAX_PATH,
            Self::MacOs => MACOS_MAX_PATH,
            Self::Linux => LINUX_MAX_PATH,
        }
    }

    pub fn max_component_len(self) -> usize {
        match self {
            Self::Windows => WINDOWS_MAX_COMPONENT,
            Self::MacOs | Self::Linux => POSIX_MAX_COMPONENT,
        }
    }

    /// Windows counts UTF-16 units, the others count bytes.
    fn measure(self, s: &str) -> usize {
        match self {
            Self::Windows => s.encode_utf16().count(),
            Self::MacOs | Self::Linux => s.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IllegalName {
    #[error("name is empty")]
    Empty,
    #[error("`.` and `..` cannot be used as names")]
    DotName,
    #[error("contains forbidden character {0:?}")]
    ForbiddenChar(char),
    #[error("`{0}` is a reserved device name on Windows")]
    Reserved(String),
    #[error("names cannot end with a space or a dot on Windows")]
    TrailingSpaceOrDot,
    #[error("name is {len} long, the limit is {max}")]
    NameTooLong { len: usize, max: usize },
    #[error("path is {len} long, the limit is {max}")]
    PathTooLong { len: usize, max: usize },
}

/// Check if a filename is a Windows reserved name
pub fn is_windows_reserved(name: &str) -> bool {
    let base = name.split('.').next().unwrap_or(name).to_uppercase();
    WINDOWS_RESERVED.contains(&base.as_str())
}

/// Validate a single path component against `platform`.
pub fn validate_name(name: &str, platform: Platform) -> Result<(), IllegalName> {
    if name.is_empty() {
        return Err(IllegalName::Empty);
    }
    if name == "." || name == ".." {
        return Err(IllegalName::DotName);
    }

    match platform {
        Platform::Windows => {
            if let Some(c) = name
                .chars()
                .find(|c| (*c as u32) < 0x20 || WINDOWS_FORBIDDEN.contains(c))
            {
                return Err(IllegalName::ForbiddenChar(c));
            }
            if name.ends_with(' ') || name.ends_with('.') {
                return Err(IllegalName::TrailingSpaceOrDot);
            }
            if is_windows_reserved(name) {
                let base = name.split('.').next().unwrap_or(name);
                return Err(IllegalName::Reserved(base.to_string()));
            }
        },
        Platform::MacOs | Platform::Linux => {
            if let Some(c) = name.chars().find(|&c| c == '\0' || c == '/') {
                return Err(IllegalName::ForbiddenChar(c));
            }
        },
    }

    let len = platform.measure(name);
    let max = platform.max_component_len();
    if len > max {
        return Err(IllegalName::NameTooLong { len, max });
    }
    Ok(())
}

/// Validate the length of a full target path.
pub fn validate_path_length(path: &Path, platform: Platform) -> Result<(), IllegalName> {
    let len = platform.measure(&path.to_string_lossy());
    let max = platform.max_path_len();
    if len > max {
        return Err(IllegalName::PathTooLong { len, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_windows_reserved_detection() {
        assert!(is_windows_reserved("CON"));
        assert!(is_windows_reserved("con.txt"));
        assert!(is_windows_reserved("Lpt3.tar.gz"));
        assert!(!is_windows_reserved("CONSOLE"));
        assert!(!is_windows_reserved("COM10"));
    }

    #[test]
    fn test_empty_and_dot_names_rejected_everywhere() {
        for platform in [Platform::Windows, Platform::MacOs, Platform::Linux] {
            assert_eq!(validate_name("", platform), Err(IllegalName::Empty));
            assert_eq!(validate_name(".", platform), Err(IllegalName::DotName));
            assert_eq!(validate_name("..", platform), Err(IllegalName::DotName));
        }
    }

    #[test]
    fn test_windows_forbidden_characters() {
        for c in ['<', '>', ':', '"', '/', '\\', '|', '?', '*', '\u{1}', '\u{1f}'] {
            let name = format!("a{c}b");
            assert_eq!(
                validate_name(&name, Platform::Windows),
                Err(IllegalName::ForbiddenChar(c))
            );
        }
        assert_eq!(validate_name("a:b", Platform::Linux), Ok(()));
    }

    #[test]
    fn test_windows_trailing_space_or_dot() {
        assert_eq!(
            validate_name("report ", Platform::Windows),
            Err(IllegalName::TrailingSpaceOrDot)
        );
        assert_eq!(
            validate_name("report.", Platform::Windows),
            Err(IllegalName::TrailingSpaceOrDot)
        );
        assert_eq!(validate_name("report.", Platform::MacOs), Ok(()));
    }

    #[test]
    fn test_windows_reserved_rejected() {
        assert_eq!(
            validate_name("nul.txt", Platform::Windows),
            Err(IllegalName::Reserved("nul".to_string()))
        );
        assert_eq!(validate_name("nul.txt", Platform::Linux), Ok(()));
    }

    #[test]
    fn test_posix_rejects_slash_and_nul() {
        assert_eq!(
            validate_name("a/b", Platform::Linux),
            Err(IllegalName::ForbiddenChar('/'))
        );
        assert_eq!(
            validate_name("a\0b", Platform::MacOs),
            Err(IllegalName::ForbiddenChar('\0'))
        );
    }

    #[test]
    fn test_component_length_units() {
        // 128 two-byte characters: 256 bytes but only 128 UTF-16 units
        let name = "é".repeat(128);
        assert_eq!(validate_name(&name, Platform::Windows), Ok(()));
        assert_eq!(
            validate_name(&name, Platform::Linux),
            Err(IllegalName::NameTooLong { len: 256, max: 255 })
        );
    }

    #[test]
    fn test_path_length_limits() {
        let long = PathBuf::from(format!("C:\\{}", "d\\".repeat(200)));
        assert!(matches!(
            validate_path_length(&long, Platform::Windows),
            Err(IllegalName::PathTooLong { max: 260, .. })
        ));
        assert_eq!(validate_path_length(&long, Platform::Linux), Ok(()));
    }
}

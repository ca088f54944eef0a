//! Destination strings for `xcodebuild -destination`.
//!
//! xcodebuild parses these literally, so the exact key order and spelling
//! below matter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DestinationError {
    /// A simulator platform was requested without naming a simulator
    #[error("invalid target: {platform} requires either a simulator id or a simulator name")]
    InvalidTarget { platform: Platform },

    #[error("unknown platform: {0}")]
    UnknownPlatform(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "macOS")]
    MacOs,
    #[serde(rename = "iOS")]
    Ios,
    #[serde(rename = "iOS Simulator")]
    IosSimulator,
    #[serde(rename = "watchOS")]
    WatchOs,
    #[serde(rename = "watchOS Simulator")]
    WatchOsSimulator,
    #[serde(rename = "tvOS")]
    TvOs,
    #[serde(rename = "tvOS Simulator")]
    TvOsSimulator,
    #[serde(rename = "visionOS")]
    VisionOs,
    #[serde(rename = "visionOS Simulator")]
    VisionOsSimulator,
}

impl Platform {
    pub const ALL: [Platform; 9] = [
        Platform::MacOs,
        Platform::Ios,
        Platform::IosSimulator,
        Platform::WatchOs,
        Platform::WatchOsSimulator,
        Platform::TvOs,
        Platform::TvOsSimulator,
        Platform::VisionOs,
        Platform::VisionOsSimulator,
    ];

    /// Name as xcodebuild spells it after `platform=`
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::MacOs => "macOS",
            Platform::Ios => "iOS",
            Platform::IosSimulator => "iOS Simulator",
            Platform::WatchOs => "watchOS",
            Platform::WatchOsSimulator => "watchOS Simulator",
            Platform::TvOs => "tvOS",
            Platform::TvOsSimulator => "tvOS Simulator",
            Platform::VisionOs => "visionOS",
            Platform::VisionOsSimulator => "visionOS Simulator",
        }
    }

    pub fn is_simulator(&self) -> bool {
        matches!(
            self,
            Platform::IosSimulator
                | Platform::WatchOsSimulator
                | Platform::TvOsSimulator
                | Platform::VisionOsSimulator
        )
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = DestinationError;

    /// Accepts "iOS Simulator", "ios simulator" and "iOSSimulator".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();

        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().replace(' ', "").to_lowercase() == wanted)
            .ok_or_else(|| DestinationError::UnknownPlatform(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Destination(String);

impl Destination {
    /// Both Mac architectures, for universal-binary destination selection.
    pub fn macos_universal() -> Self {
        Destination("platform=macOS,arch=arm64,arch=x86_64".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Destination {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub fn resolve_destination(
    platform: Platform,
    simulator_name: Option<&str>,
    simulator_id: Option<&str>,
    use_latest_os: bool,
    arch: Option<&str>,
) -> Result<Destination, DestinationError> {
    let destination = if platform.is_simulator() {
        match (present(simulator_id), present(simulator_name)) {
            (Some(id), _) => format!("platform={},id={}", platform, id),
            (None, Some(name)) if use_latest_os => {
                format!("platform={},name={},OS=latest", platform, name)
            }
            (None, Some(name)) => format!("platform={},name={}", platform, name),
            (None, None) => return Err(DestinationError::InvalidTarget { platform }),
        }
    } else if platform == Platform::MacOs {
        match present(arch) {
            Some(arch) => format!("platform=macOS,arch={}", arch),
            None => "platform=macOS".to_string(),
        }
    } else {
        format!("generic/platform={}", platform)
    };

    Ok(Destination(destination))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parsing() {
        assert_eq!("iOS Simulator".parse::<Platform>(), Ok(Platform::IosSimulator));
        assert_eq!("iOSSimulator".parse::<Platform>(), Ok(Platform::IosSimulator));
        assert_eq!("visionos".parse::<Platform>(), Ok(Platform::VisionOs));
        assert!("android".parse::<Platform>().is_err());
    }

    #[test]
    fn test_platform_serde_names() {
        let json = serde_json::to_string(&Platform::TvOsSimulator).unwrap();
        assert_eq!(json, "\"tvOS Simulator\"");
        let parsed: Platform = serde_json::from_str("\"macOS\"").unwrap();
        assert_eq!(parsed, Platform::MacOs);
    }

    #[test]
    fn test_blank_identity_counts_as_missing() {
        let err = resolve_destination(Platform::IosSimulator, Some("  "), Some(""), true, None);
        assert_eq!(
            err,
            Err(DestinationError::InvalidTarget {
                platform: Platform::IosSimulator
            })
        );
    }

    #[test]
    fn test_blank_id_falls_through_to_name() {
        let dest =
            resolve_destination(Platform::IosSimulator, Some("iPhone 16"), Some(""), false, None)
                .unwrap();
        assert_eq!(dest.as_str(), "platform=iOS Simulator,name=iPhone 16");
    }

    #[test]
    fn test_universal_macos() {
        assert_eq!(
            Destination::macos_universal().as_str(),
            "platform=macOS,arch=arm64,arch=x86_64"
        );
    }
}

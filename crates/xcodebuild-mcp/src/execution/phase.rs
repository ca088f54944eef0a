//! Best-effort build phase detection from xcodebuild output.
//!
//! Nothing here decides success or failure. The marker list tracks what
//! current Xcode releases print and will drift as the tool changes.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseMark {
    pub index: usize,
    pub name: &'static str,
    /// Progress estimate the tracker resets to when this phase starts
    pub floor: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSignal {
    Phase(PhaseMark),
    Files { completed: u32, total: u32 },
}

pub trait PhaseClassifier: Send + Sync {
    fn classify(&self, line: &str) -> Option<LineSignal>;
}

struct PhaseMarkers {
    name: &'static str,
    prefixes: &'static [&'static str],
}

const XCODEBUILD_PHASES: &[PhaseMarkers] = &[
    PhaseMarkers {
        name: "Resolving packages",
        prefixes: &["Resolve Package Graph", "Resolving Package", "Fetching from", "Resolved source packages"],
    },
    PhaseMarkers {
        name: "Computing dependencies",
        prefixes: &["ComputeTargetDependencyGraph", "Computing target dependency graph", "Prepare packages"],
    },
    PhaseMarkers {
        name: "Compiling",
        prefixes: &[
            "CompileSwiftSources",
            "CompileSwift",
            "SwiftCompile",
            "CompileC",
            "CompileAssetCatalog",
            "CompileStoryboard",
            "CompileXIB",
            "Compiling",
        ],
    },
    PhaseMarkers {
        name: "Linking",
        prefixes: &["Ld ", "Linking"],
    },
    PhaseMarkers {
        name: "Copying resources",
        prefixes: &["CpResource", "CopySwiftLibs", "CopyStringsFile", "Copying"],
    },
    PhaseMarkers {
        name: "Processing",
        prefixes: &["ProcessInfoPlistFile", "ProcessProductPackaging", "Processing"],
    },
    PhaseMarkers {
        name: "Code signing",
        prefixes: &["CodeSign", "Signing"],
    },
    PhaseMarkers {
        name: "Validating",
        prefixes: &["Validate", "Touch", "RegisterWithLaunchServices", "RegisterExecutionPolicyException"],
    },
];

static FILE_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d+)\s+of\s+(\d+)\s+files?\b").expect("valid regex"));

/// Ordered phase markers for raw and xcpretty-formatted xcodebuild output.
#[derive(Debug, Default, Clone, Copy)]
pub struct XcodebuildPhases;

impl XcodebuildPhases {
    pub fn new() -> Self {
        Self
    }

    pub fn phase_names() -> impl Iterator<Item = &'static str> {
        XCODEBUILD_PHASES.iter().map(|p| p.name)
    }

    fn mark(index: usize) -> PhaseMark {
        PhaseMark {
            index,
            name: XCODEBUILD_PHASES[index].name,
            floor: (index * 90 / XCODEBUILD_PHASES.len()) as u8,
        }
    }
}

impl PhaseClassifier for XcodebuildPhases {
    fn classify(&self, line: &str) -> Option<LineSignal> {
        // xcpretty prefixes its lines with a marker glyph
        let text = line.trim_start().trim_start_matches('▸').trim_start();

        if let Some(index) = XCODEBUILD_PHASES
            .iter()
            .position(|p| p.prefixes.iter().any(|prefix| text.starts_with(prefix)))
        {
            return Some(LineSignal::Phase(Self::mark(index)));
        }

        let caps = FILE_COUNT.captures(text)?;
        let completed = caps[1].parse().ok()?;
        let total: u32 = caps[2].parse().ok()?;
        if total == 0 {
            return None;
        }
        Some(LineSignal::Files { completed, total })
    }
}

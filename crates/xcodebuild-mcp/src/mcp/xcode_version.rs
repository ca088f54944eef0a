use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct XcodeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl XcodeVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses the "Xcode X.Y[.Z]" line of `xcodebuild -version`.
    pub fn parse(output: &str) -> Option<Self> {
        let version_line = output.lines().find(|line| line.starts_with("Xcode"))?;
        let number = version_line.split_whitespace().nth(1)?;
        let mut parts = number.split('.').map(|s| s.parse::<u32>().ok());

        let major = parts.next().flatten()?;
        let minor = parts.next().flatten().unwrap_or(0);
        let patch = parts.next().flatten().unwrap_or(0);
        Some(Self::new(major, minor, patch))
    }

    /// The "Build version 16A242d" line, if present.
    pub fn parse_build(output: &str) -> Option<String> {
        output
            .lines()
            .find_map(|line| line.trim().strip_prefix("Build version "))
            .map(|build| build.trim().to_string())
    }

    /// `-skipMacroValidation` first shipped with Xcode 15
    pub fn supports_skip_macro_validation(&self) -> bool {
        self.major >= 15
    }

    /// visionOS destinations need Xcode 15.2 or later
    pub fn supports_visionos(&self) -> bool {
        self.major > 15 || (self.major == 15 && self.minor >= 2)
    }
}

impl fmt::Display for XcodeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

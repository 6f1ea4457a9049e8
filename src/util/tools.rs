//! External tool detection
//!
//! The service shells out to yt-dlp for extraction. yt-dlp in turn needs
//! ffmpeg to merge separate video and audio streams, and a JavaScript
//! runtime (deno or node) to solve YouTube's player challenges.

use std::path::{Path, PathBuf};

/// External tools the service depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// yt-dlp extractor - REQUIRED for every download
    YtDlp,
    /// ffmpeg - needed to merge video and audio formats
    Ffmpeg,
    /// Deno JavaScript runtime (preferred by yt-dlp)
    Deno,
    /// Node.js JavaScript runtime
    Node,
}

impl Tool {
    /// Get the binary name for this tool
    pub fn binary_name(&self) -> &'static str {
        match self {
            Tool::YtDlp => "yt-dlp",
            Tool::Ffmpeg => "ffmpeg",
            Tool::Deno => "deno",
            Tool::Node => "node",
        }
    }

    /// Get the display name for this tool
    pub fn display_name(&self) -> &'static str {
        match self {
            Tool::YtDlp => "yt-dlp",
            Tool::Ffmpeg => "FFmpeg",
            Tool::Deno => "Deno",
            Tool::Node => "Node.js",
        }
    }

    /// Check if this tool is required (downloads cannot work without it)
    pub fn is_required(&self) -> bool {
        matches!(self, Tool::YtDlp | Tool::Ffmpeg)
    }

    /// Check if this tool is a JavaScript runtime
    pub fn is_js_runtime(&self) -> bool {
        matches!(self, Tool::Deno | Tool::Node)
    }

    /// Get all tools
    pub fn all() -> &'static [Tool] {
        &[Tool::YtDlp, Tool::Ffmpeg, Tool::Deno, Tool::Node]
    }
}

/// Status of a tool's availability
#[derive(Debug, Clone, Default)]
pub enum ToolStatus {
    /// Tool is available at the given path
    Available(PathBuf),
    /// Tool was not found in PATH
    #[default]
    NotFound,
    /// A path was configured (YTDLP_PATH) but it's invalid
    ConfiguredPathInvalid(PathBuf),
}

impl ToolStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, ToolStatus::Available(_))
    }

    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ToolStatus::Available(p) => Some(p),
            _ => None,
        }
    }
}

/// Tracks the availability of all tools
#[derive(Debug, Clone, Default)]
pub struct ToolAvailability {
    ytdlp: ToolStatus,
    ffmpeg: ToolStatus,
    deno: ToolStatus,
    node: ToolStatus,
}

impl ToolAvailability {
    /// Detect availability of all tools.
    ///
    /// `ytdlp_path` overrides the PATH lookup for yt-dlp.
    pub fn detect(ytdlp_path: Option<&PathBuf>) -> Self {
        Self {
            ytdlp: Self::detect_tool(Tool::YtDlp, ytdlp_path),
            ffmpeg: Self::detect_tool(Tool::Ffmpeg, None),
            deno: Self::detect_tool(Tool::Deno, None),
            node: Self::detect_tool(Tool::Node, None),
        }
    }

    fn detect_tool(tool: Tool, configured_path: Option<&PathBuf>) -> ToolStatus {
        if let Some(path) = configured_path {
            if Self::is_valid_executable(path) {
                return ToolStatus::Available(path.clone());
            } else {
                return ToolStatus::ConfiguredPathInvalid(path.clone());
            }
        }

        match which::which(tool.binary_name()) {
            Ok(path) => ToolStatus::Available(path),
            Err(_) => ToolStatus::NotFound,
        }
    }

    /// Check if a path points to a valid executable
    fn is_valid_executable(path: &Path) -> bool {
        if !path.exists() {
            return false;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = path.metadata() {
                return metadata.is_file() && metadata.permissions().mode() & 0o111 != 0;
            }
            false
        }

        #[cfg(not(unix))]
        {
            path.is_file()
        }
    }

    pub fn status(&self, tool: Tool) -> &ToolStatus {
        match tool {
            Tool::YtDlp => &self.ytdlp,
            Tool::Ffmpeg => &self.ffmpeg,
            Tool::Deno => &self.deno,
            Tool::Node => &self.node,
        }
    }

    pub fn is_available(&self, tool: Tool) -> bool {
        self.status(tool).is_available()
    }

    pub fn get_path(&self, tool: Tool) -> Option<&PathBuf> {
        self.status(tool).path()
    }

    /// Get list of missing required tools
    pub fn missing_required_tools(&self) -> Vec<Tool> {
        Tool::all()
            .iter()
            .filter(|&&tool| tool.is_required() && !self.is_available(tool))
            .copied()
            .collect()
    }

    /// First available JavaScript runtime, Deno preferred
    pub fn js_runtime(&self) -> Option<Tool> {
        Tool::all()
            .iter()
            .copied()
            .find(|&tool| tool.is_js_runtime() && self.is_available(tool))
    }

    /// Log what was found at startup.
    pub fn log_summary(&self) {
        for &tool in Tool::all() {
            match self.status(tool) {
                ToolStatus::Available(path) => {
                    tracing::info!(tool = tool.display_name(), path = %path.display(), "Tool available");
                }
                ToolStatus::NotFound if tool.is_required() => {
                    tracing::error!(tool = tool.display_name(), "Required tool not found in PATH");
                }
                ToolStatus::NotFound => {
                    tracing::debug!(tool = tool.display_name(), "Optional tool not found");
                }
                ToolStatus::ConfiguredPathInvalid(path) => {
                    tracing::error!(
                        tool = tool.display_name(),
                        path = %path.display(),
                        "Configured tool path is not an executable"
                    );
                }
            }
        }
        if self.js_runtime().is_none() {
            tracing::warn!("No JavaScript runtime found; some YouTube formats may be unavailable");
        }
    }

    /// Availability with explicit statuses, for tests.
    #[cfg(test)]
    pub(crate) fn with_statuses(
        ytdlp: ToolStatus,
        ffmpeg: ToolStatus,
        deno: ToolStatus,
        node: ToolStatus,
    ) -> Self {
        Self {
            ytdlp,
            ffmpeg,
            deno,
            node,
        }
    }
}

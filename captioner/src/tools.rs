//! External tool discovery and invocation.
//!
//! The [`Toolchain`] is resolved and validated once at startup and then passed
//! to every stage that shells out; nothing reads tool paths from global state.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Longest stderr excerpt carried into an error message.
const MAX_STDERR_CHARS: usize = 1000;

/// Resolved ffmpeg/ffprobe executables.
#[derive(Debug, Clone, PartialEq)]
pub struct Toolchain {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

/// Availability report for one tool, used by the CLI's `--check-tools`.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: &'static str,
    pub path: PathBuf,
    /// First line of `-version` output.
    pub version: Option<String>,
}

impl Toolchain {
    /// Use explicit executable paths without searching `PATH`.
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Locate ffmpeg and ffprobe. An override that exists wins; otherwise
    /// the tool is looked up on `PATH`.
    pub fn discover(ffmpeg: Option<&Path>, ffprobe: Option<&Path>) -> Result<Self> {
        Ok(Self {
            ffmpeg: locate("ffmpeg", ffmpeg)?,
            ffprobe: locate("ffprobe", ffprobe)?,
        })
    }

    /// Check that ffmpeg can actually burn in text. Run once, before any job.
    pub fn validate(&self) -> Result<()> {
        let output = ToolCommand::new(&self.ffmpeg)
            .args(["-hide_banner", "-filters"])
            .run()?;
        let listing = String::from_utf8_lossy(&output.stdout);
        if !has_filter(&listing, "drawtext") {
            return Err(Error::MissingCapability {
                tool: tool_name(&self.ffmpeg),
                capability: "drawtext".into(),
            });
        }
        debug!(ffmpeg = %self.ffmpeg.display(), "drawtext filter available");
        Ok(())
    }

    /// Version lines for both tools.
    pub fn describe(&self) -> Vec<ToolInfo> {
        [("ffmpeg", &self.ffmpeg), ("ffprobe", &self.ffprobe)]
            .into_iter()
            .map(|(name, path)| ToolInfo {
                name,
                path: path.clone(),
                version: ToolCommand::new(path)
                    .arg("-version")
                    .run()
                    .ok()
                    .and_then(|o| {
                        String::from_utf8_lossy(&o.stdout)
                            .lines()
                            .next()
                            .map(str::to_string)
                    }),
            })
            .collect()
    }
}

fn locate(name: &str, custom: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = custom {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        info!(tool = name, path = %path.display(), "configured path missing, searching PATH");
    }
    which::which(name).map_err(|_| Error::ToolNotFound {
        tool: name.to_string(),
    })
}

/// Does `ffmpeg -filters` output list the named filter?
///
/// Lines look like ` T.C drawtext          V->V       Draw text on top of video frames ...`.
fn has_filter(listing: &str, filter: &str) -> bool {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|name| name == filter)
}

fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string_lossy().into_owned())
}

/// A blocking external tool invocation with captured output.
///
/// Arguments go straight to the process; there is no shell in between.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Run to completion. Only a failure to start the process is an error
    /// here; callers decide what a non-zero exit means for their stage.
    pub fn run(&self) -> Result<Output> {
        debug!(program = %self.program.display(), args = self.args.len(), "running tool");
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ToolNotFound {
                        tool: tool_name(&self.program),
                    }
                } else {
                    Error::Io(e)
                }
            })
    }
}

/// The tail end of a tool's stderr, which is where ffmpeg puts the cause.
pub fn stderr_excerpt(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= MAX_STDERR_CHARS {
        trimmed.to_string()
    } else {
        trimmed.chars().skip(count - MAX_STDERR_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_filter_matches_name_column() {
        let listing = "Filters:\n  T.. = Timeline support\n ---\n T.C drawtext          V->V       Draw text on top of video frames using libfreetype library.\n ... overlay           VV->V      Overlay a video source on top of the input.\n";
        assert!(has_filter(listing, "drawtext"));
        assert!(has_filter(listing, "overlay"));
        assert!(!has_filter(listing, "subtitles"));
        assert!(!has_filter(listing, "Draw"));
    }

    #[test]
    fn test_run_missing_program_is_tool_not_found() {
        let result = ToolCommand::new("nonexistent_tool_xyz_12345").run();
        match result {
            Err(Error::ToolNotFound { tool }) => assert_eq!(tool, "nonexistent_tool_xyz_12345"),
            other => panic!("expected ToolNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_discover_falls_back_when_override_missing() {
        let result = Toolchain::discover(
            Some(Path::new("/nonexistent/ffmpeg")),
            Some(Path::new("/nonexistent/ffprobe")),
        );
        // Either PATH has the tools or the error names the first missing one.
        if let Err(e) = result {
            assert!(matches!(e, Error::ToolNotFound { .. }));
        }
    }

    #[test]
    fn test_validate_reports_missing_tool() {
        let tools = Toolchain::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        assert!(matches!(
            tools.validate(),
            Err(Error::ToolNotFound { .. })
        ));
    }

    #[test]
    fn test_args_are_kept_verbatim() {
        let cmd = ToolCommand::new("ffmpeg")
            .arg("-i")
            .arg("my file; rm -rf.mp4")
            .args(["-c:v", "libx264"]);
        let args: Vec<_> = cmd.args.iter().map(|a| a.to_string_lossy()).collect();
        assert_eq!(args, ["-i", "my file; rm -rf.mp4", "-c:v", "libx264"]);
    }
}

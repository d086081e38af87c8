use std::io;
use std::process::Command;

use crate::error::{ProbeError, Result};

/// External tool invocation, injectable so GPU detection and sampling can be
/// tested without `nvidia-smi`, `rocm-smi`, or `lspci` on the machine.
pub trait ToolRunner: Send + Sync {
    /// Whether the tool can be found on PATH at all.
    fn invocable(&self, tool: &str) -> bool;

    /// Run the tool and return its stdout. Non-zero exit and unspawnable
    /// binaries both collapse to `ToolUnavailable` for this call only.
    fn run(&self, tool: &str, args: &[&str]) -> Result<String>;
}

/// Real process invocation via PATH lookup.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTool;

impl ToolRunner for SystemTool {
    fn invocable(&self, tool: &str) -> bool {
        which::which(tool).is_ok()
    }

    fn run(&self, tool: &str, args: &[&str]) -> Result<String> {
        let output = Command::new(tool).args(args).output().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ProbeError::tool_unavailable(tool),
            io::ErrorKind::PermissionDenied => ProbeError::permission_denied(tool),
            _ => ProbeError::Io(e),
        })?;

        if !output.status.success() {
            return Err(ProbeError::tool_unavailable(format!(
                "{tool} exited with {}",
                output.status
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| ProbeError::parse_failure(format!("{tool} produced non-UTF8 output")))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;

    /// Canned tool outputs for tests. A tool not in the map is "not
    /// installed".
    #[derive(Default)]
    pub struct FakeTool {
        outputs: HashMap<String, String>,
    }

    impl FakeTool {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, tool: &str, stdout: &str) -> Self {
            self.outputs.insert(tool.to_string(), stdout.to_string());
            self
        }
    }

    impl ToolRunner for FakeTool {
        fn invocable(&self, tool: &str) -> bool {
            self.outputs.contains_key(tool)
        }

        fn run(&self, tool: &str, _args: &[&str]) -> Result<String> {
            self.outputs
                .get(tool)
                .cloned()
                .ok_or_else(|| ProbeError::tool_unavailable(tool))
        }
    }
}

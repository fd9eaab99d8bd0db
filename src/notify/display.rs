//! Screen power control.

use std::process::{Command, Stdio};

/// Turns the attached display on or off.
pub trait DisplayPower: Send + Sync {
    fn set_display_power(&self, on: bool) -> std::io::Result<()>;
}

/// Uses `vcgencmd display_power 0|1`.
#[derive(Debug, Clone)]
pub struct VcgencmdDisplay {
    program: String,
}

impl VcgencmdDisplay {
    pub fn new() -> Self {
        Self {
            program: "vcgencmd".to_string(),
        }
    }

    /// Uses a different binary with the same arguments.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub(crate) fn args(on: bool) -> [&'static str; 2] {
        ["display_power", if on { "1" } else { "0" }]
    }
}

impl Default for VcgencmdDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayPower for VcgencmdDisplay {
    fn set_display_power(&self, on: bool) -> std::io::Result<()> {
        let status = Command::new(&self.program)
            .args(Self::args(on))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if !status.success() {
            return Err(std::io::Error::other(format!(
                "{} exited with {}",
                self.program, status
            )));
        }
        tracing::info!(on, "Display power changed");
        Ok(())
    }
}

use anyhow::{Context, Result};
use colored::Colorize;
use std::process::{Command, Output};
use std::time::Instant;

/// One `cargo` invocation run by a task.
pub struct Step {
    pub label: &'static str,
    pub args: &'static [&'static str],
    /// A failing advisory step is reported but does not fail the task.
    pub advisory: bool,
}

impl Step {
    pub const fn required(label: &'static str, args: &'static [&'static str]) -> Self {
        Self {
            label,
            args,
            advisory: false,
        }
    }

    pub const fn advisory(label: &'static str, args: &'static [&'static str]) -> Self {
        Self {
            label,
            args,
            advisory: true,
        }
    }
}

/// Run `step`, print its outcome and return cargo's output on success.
///
/// `Ok(None)` means an advisory step failed.
pub fn run(step: &Step) -> Result<Option<Output>> {
    println!("{}", format!("  {}...", step.label).cyan());
    let start = Instant::now();

    let output = Command::new("cargo")
        .args(step.args)
        .output()
        .with_context(|| format!("Failed to spawn cargo {}", step.args.join(" ")))?;

    if output.status.success() {
        println!(
            "{}",
            format!("  ✓ {} in {:.2}s", step.label, start.elapsed().as_secs_f64()).green()
        );
        return Ok(Some(output));
    }

    // cargo prints diagnostics on stderr and libtest failures on stdout
    let mut report = String::from_utf8_lossy(&output.stderr).into_owned();
    report.push_str(&String::from_utf8_lossy(&output.stdout));
    if step.advisory {
        eprintln!("{}", format!("  ⚠ {} reported problems", step.label).yellow().bold());
        eprintln!("{report}");
        return Ok(None);
    }
    eprintln!("{}", format!("  ✗ {} failed", step.label).red().bold());
    eprintln!("{report}");
    anyhow::bail!("{} failed", step.label)
}

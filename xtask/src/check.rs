use anyhow::Result;
use colored::Colorize;
use std::time::Instant;

use crate::cargo::{self, Step};

/// Builds the driver must keep passing: bare-metal with defmt, host with
/// tracing, and the platform traits without the mocks.
const STEPS: &[Step] = &[
    Step::required(
        "bmv31t001 for thumbv7em-none-eabihf (defmt)",
        &[
            "check",
            "-p",
            "bmv31t001",
            "--target",
            "thumbv7em-none-eabihf",
            "--features",
            "defmt",
        ],
    ),
    Step::required(
        "platform for thumbv7em-none-eabihf (no mocks)",
        &[
            "check",
            "-p",
            "platform",
            "--target",
            "thumbv7em-none-eabihf",
            "--no-default-features",
        ],
    ),
    Step::required(
        "bmv31t001 on the host (tracing)",
        &["check", "-p", "bmv31t001", "--features", "tracing"],
    ),
    Step::required(
        "clippy",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
    ),
    Step::advisory("rustfmt", &["fmt", "--all", "--check"]),
];

pub fn run() -> Result<()> {
    println!();
    println!("{}", "🔍 Checking the updater workspace...".cyan().bold());
    println!();

    let start = Instant::now();
    let mut advisories = 0usize;
    for step in STEPS {
        if cargo::run(step)?.is_none() {
            advisories = advisories.saturating_add(1);
        }
    }

    println!();
    let summary = format!("✓ Checks completed in {:.2}s", start.elapsed().as_secs_f64());
    if advisories == 0 {
        println!("{}", summary.green().bold());
    } else {
        println!(
            "{}",
            format!("{summary} ({advisories} advisory step(s) need attention)")
                .yellow()
                .bold()
        );
    }
    println!();
    Ok(())
}

use anyhow::Result;
use colored::Colorize;
use std::time::Instant;

use crate::cargo::{self, Step};

const UNIT: Step = Step::required(
    "Unit tests",
    &["test", "--workspace", "--lib", "--bins"],
);

/// Integration suites live under `crates/bmv31t001/tests`.
const INTEGRATION: Step = Step::required(
    "Integration tests",
    &[
        "test",
        "-p",
        "bmv31t001",
        "--test",
        "update_session",
        "--test",
        "protocol_proptest",
    ],
);

const DOC: Step = Step::required("Doc tests", &["test", "--workspace", "--doc"]);

pub fn run(unit_only: bool, integration_only: bool) -> Result<()> {
    println!();
    println!("{}", "🧪 Running tests...".cyan().bold());
    println!();

    let mut steps = Vec::new();
    if !integration_only {
        steps.push(&UNIT);
    }
    if !unit_only {
        steps.push(&INTEGRATION);
    }
    if !unit_only && !integration_only {
        steps.push(&DOC);
    }

    let start = Instant::now();
    let mut totals = Totals::default();
    for step in steps {
        if let Some(output) = cargo::run(step)? {
            totals.add(&String::from_utf8_lossy(&output.stdout));
        }
    }

    println!();
    println!(
        "{}",
        format!(
            "✓ {} passed, {} ignored in {:.2}s",
            totals.passed,
            totals.ignored,
            start.elapsed().as_secs_f64()
        )
        .green()
        .bold()
    );
    println!();
    Ok(())
}

/// Counts summed over every libtest binary a step ran.
#[derive(Debug, Default, PartialEq, Eq)]
struct Totals {
    passed: u32,
    ignored: u32,
}

impl Totals {
    /// Fold in every `test result:` line of one cargo run.
    fn add(&mut self, output: &str) {
        for line in output.lines() {
            let Some(result) = line.split("test result:").nth(1) else {
                continue;
            };
            self.passed = self.passed.saturating_add(count(result, "passed"));
            self.ignored = self.ignored.saturating_add(count(result, "ignored"));
        }
    }
}

/// Number in front of `label` in `ok. 5 passed; 0 failed; ...`.
fn count(result: &str, label: &str) -> u32 {
    result
        .split(';')
        .filter_map(|field| field.trim().trim_start_matches("ok.").trim().split_once(' '))
        .find(|(_, name)| name.trim() == label)
        .and_then(|(n, _)| n.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_sum_every_test_binary() {
        let output = "\
running 3 tests
test result: ok. 3 passed; 0 failed; 1 ignored; 0 measured; 0 filtered out; finished in 0.01s

running 20 tests
test result: ok. 20 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out; finished in 0.40s
";
        let mut totals = Totals::default();
        totals.add(output);
        assert_eq!(
            totals,
            Totals {
                passed: 23,
                ignored: 1
            }
        );
    }

    #[test]
    fn output_without_results_counts_nothing() {
        let mut totals = Totals::default();
        totals.add("error: could not compile `bmv31t001`");
        assert_eq!(totals, Totals::default());
    }
}

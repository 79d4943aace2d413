//! Run the built-in survey scenarios against a live deployment.
//!
//! This example shows how to:
//! - Resolve probe configuration from the environment
//! - Run every built-in scenario in order
//! - Inspect reports without aborting on the first failure
//!
//! # Running
//!
//! ```bash
//! export API_URL=https://api.example.com/data/v2/projects/<project>/customers/export-one
//! export API_KEY_ID=...
//! export API_KEY_SECRET=...
//! export CUSTOMER_ID=...
//! RUST_LOG=survey_probe=debug cargo run --example run_scenarios
//!
//! # Only run scenarios whose name contains a filter
//! cargo run --example run_scenarios -- csrf
//! ```
//!
//! Exits non-zero if any scenario fails or cannot be run.

use survey_probe::logging::init_tracing;
use survey_probe::{ErrorCategory, Scenario, SurveyProbe};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let filter = std::env::args().nth(1);
    let probe = SurveyProbe::from_env()?;

    let count = probe.verify_read_idempotence().await?;
    println!("Event log readable and stable ({count} events)\n");

    let scenarios: Vec<Scenario> = Scenario::builtin()
        .into_iter()
        .filter(|s| filter.as_deref().map_or(true, |f| s.name.contains(f)))
        .collect();

    let mut failures = 0;
    for scenario in &scenarios {
        match probe.run(scenario).await {
            Ok(report) => {
                println!("{}", report.summary());
                if let Err(e) = report.verify() {
                    println!("    {e}");
                    failures += 1;
                } else if report.extra_events() > 0 {
                    println!(
                        "    note: {} extra events, another run may share this customer",
                        report.extra_events()
                    );
                }
            }
            Err(e) => {
                let hint = match e.category() {
                    ErrorCategory::Client => "check configuration",
                    ErrorCategory::External => "API or network problem",
                    ErrorCategory::Expectation => "unexpected API behaviour",
                };
                println!("[ERROR] {}: {e} ({hint})", scenario.name);
                failures += 1;
            }
        }
    }

    println!("\n{} of {} scenarios passed", scenarios.len() - failures, scenarios.len());

    if failures > 0 {
        anyhow::bail!("{failures} scenario(s) failed");
    }
    Ok(())
}

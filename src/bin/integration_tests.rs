//! Midicatcher Integration Test Runner
//!
//! Drives the real watcher, recorder and persister against a scripted
//! sequencer and a manual clock, then validates the files on disk.
//!
//! Usage:
//!   cargo run --features test-harness --bin integration_tests [-- [OPTIONS]]
//!
//! Options:
//!   --filter <pattern>    Run only scenarios whose name contains <pattern>
//!   --verbose             Extra debug output
//!   --keep-sessions       Don't clean up temp dirs (for debugging)
//!   --list                List all scenarios without running them

use midicatcher_lib::test_harness::runner;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let verbose = args.iter().any(|a| a == "--verbose");
    let keep_sessions = args.iter().any(|a| a == "--keep-sessions");
    let list_only = args.iter().any(|a| a == "--list");

    let filter = args.iter()
        .position(|a| a == "--filter")
        .and_then(|i| args.get(i + 1))
        .cloned();

    let log_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level)
    ).init();

    println!("\n=== Midicatcher Integration Tests ===\n");

    let mut scenarios = runner::scenarios();
    if let Some(ref pattern) = filter {
        scenarios.retain(|s| s.name.contains(pattern.as_str()));
        println!("  Filter '{}': {} scenarios match\n", pattern, scenarios.len());
    }

    if list_only {
        for scenario in &scenarios {
            println!("  {}", scenario.name);
        }
        return;
    }

    let mut failed = 0;
    for scenario in &scenarios {
        let result = runner::run_scenario(scenario, keep_sessions);
        if result.passed {
            println!("  PASS  {} ({} ms)", result.name, result.duration_ms);
        } else {
            failed += 1;
            println!("  FAIL  {} ({} ms)", result.name, result.duration_ms);
            for error in &result.errors {
                println!("        - {}", error);
            }
        }
    }

    println!("\n{} passed, {} failed\n", scenarios.len() - failed, failed);
    if failed > 0 {
        std::process::exit(1);
    }
}

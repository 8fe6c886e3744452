//! Scenario-based tests for pipeline-launcher against a scripted console

#[path = "../helpers.rs"]
mod helpers;

mod batch_runs;
mod launch_retries;
mod monitoring;

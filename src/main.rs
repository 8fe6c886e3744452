use anyhow::{Context, Result};
use pipeline_launcher::cli::commands::{HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use pipeline_launcher::cli::output::*;
use pipeline_launcher::cli::{Cli, Command};
use pipeline_launcher::core::config::{default_config_path, DEFAULT_ENV};
use pipeline_launcher::core::target::{resolve_all, resolve_group, resolve_targets};
use pipeline_launcher::core::{BatchReport, LauncherConfig, TargetSelection};
use pipeline_launcher::execution::{BatchCoordinator, BatchRegistry, EventBus, LaunchEvent, RunCoordinator};
use pipeline_launcher::persistence::ReportStore;
use pipeline_launcher::session::FileSessionStore;
use pipeline_launcher::surface::{Browser, DriverBrowser};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; launcher events are printed separately, so the
    // default filter only lets problems through
    let default_filter = if cli.verbose {
        "pipeline_launcher=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_batch(cmd, &cli).await?,
        Command::Validate(cmd) => validate_config(cmd, &cli)?,
        Command::List(cmd) => list_pipelines(cmd, &cli)?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<LauncherConfig> {
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = LauncherConfig::from_file(&path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    config.apply_env_overrides();
    Ok(config)
}

async fn open_history() -> Result<Arc<dyn ReportStore>> {
    #[cfg(feature = "sqlite")]
    {
        let store = pipeline_launcher::persistence::SqliteReportStore::with_default_path().await?;
        Ok(Arc::new(store))
    }
    #[cfg(not(feature = "sqlite"))]
    {
        warn!("Built without sqlite, history is not kept across runs");
        Ok(Arc::new(pipeline_launcher::persistence::InMemoryReportStore::new()))
    }
}

async fn run_batch(cmd: &RunCommand, cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;

    let env_name = cmd
        .env
        .clone()
        .or_else(|| std::env::var("ENV_NAME").ok())
        .or_else(|| config.envs.first().map(|e| e.name.clone()))
        .unwrap_or_else(|| DEFAULT_ENV.to_string());
    let env = config.env(&env_name).with_context(|| {
        format!(
            "Unknown environment '{}' (configured: {})",
            env_name,
            config.env_names().join(", ")
        )
    })?;

    if !cmd.has_selection() {
        anyhow::bail!("Nothing to run: name pipelines, or pass --group or --all");
    }
    let selection: TargetSelection = if cmd.all {
        resolve_all(&env.targets)
    } else if let Some(group) = &cmd.group {
        resolve_group(&env.targets, group)
    } else {
        resolve_targets(&env.targets, &cmd.pipelines)
    };

    for unmatched in &selection.unmatched {
        println!("{} No pipeline matches '{}'", WARN, style(unmatched).yellow());
    }
    if selection.is_empty() {
        println!("{} No pipelines to run in {}", CROSS, style(&env.label).bold());
        std::process::exit(1);
    }

    let sessions = match &cmd.session_dir {
        Some(dir) => FileSessionStore::new(dir),
        None => FileSessionStore::in_current_dir(),
    };

    let bus = EventBus::default();
    let printer = tokio::spawn(print_events(bus.subscribe(), selection.targets.len(), cli.verbose));

    let runner = RunCoordinator::new(
        env.name.clone(),
        config.global.settings.clone(),
        Arc::new(sessions),
        bus,
    )
    .with_credentials(env.credentials.clone());
    let coordinator = BatchCoordinator::new(runner, Arc::new(BatchRegistry::new()));

    let headless = cmd.headless || config.global.headless;
    let browser: Arc<dyn Browser> = Arc::new(
        DriverBrowser::launch(&config.global.driver, headless)
            .await
            .context("Failed to start the automation driver")?,
    );

    let batch = coordinator.execute(browser, selection).await;
    if let Err(e) = printer.await {
        warn!("Event printer stopped: {}", e);
    }

    let report = BatchReport::from_batch(&batch);
    println!();
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", format_report_table(&report));
        println!("\n{}", format_report_summary(&report));
    }

    if !cmd.no_history {
        let store = open_history().await?;
        store.save_report(&report).await?;
        println!(
            "{} Report saved to history (ID: {})",
            INFO,
            style(&report.batch_id.to_string()[..8]).dim()
        );
    }

    if !batch.all_succeeded() {
        std::process::exit(1);
    }

    Ok(())
}

/// Print launcher events until the batch is done
async fn print_events(mut events: broadcast::Receiver<LaunchEvent>, total: usize, verbose: bool) {
    let progress = create_progress_bar(total);
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(line) = format_launch_event(&event, verbose) {
                    progress.println(line);
                }
                match event {
                    LaunchEvent::RunFinished { .. } => progress.inc(1),
                    LaunchEvent::BatchDone { .. } => break,
                    _ => {}
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                progress.println(format!("{} {} events skipped", WARN, skipped));
            }
            Err(RecvError::Closed) => break,
        }
    }
    progress.finish_and_clear();
}

fn validate_config(cmd: &ValidateCommand, cli: &Cli) -> Result<()> {
    println!("{} Validating configuration...", INFO);

    match load_config(cli) {
        Ok(config) => {
            println!("{} Configuration is valid!", CHECK);
            for env in &config.envs {
                println!(
                    "  {} ({}): {} pipelines, credentials {}",
                    style(&env.name).bold(),
                    env.label,
                    style(env.targets.len()).cyan(),
                    if env.credentials.is_some() {
                        style("present").green()
                    } else {
                        style("missing").yellow()
                    }
                );
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

fn list_pipelines(cmd: &ListCommand, cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;

    let envs: Vec<_> = config
        .envs
        .iter()
        .filter(|e| cmd.env.as_deref().map_or(true, |name| e.name == name))
        .collect();

    if cmd.json {
        let data = serde_json::json!({ "envs": envs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if envs.is_empty() {
        println!("{} No environments found", INFO);
        return Ok(());
    }

    for env in envs {
        println!("{} {} ({})", INFO, style(&env.name).bold(), env.label);
        for target in &env.targets {
            println!(
                "  {} {}",
                style(target.qualified_name()).cyan(),
                style(&target.entry_url).dim()
            );
        }
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_history().await?;

    if let Some(id) = &cmd.batch_id {
        let batch_id = uuid::Uuid::parse_str(id).context("Invalid batch ID format")?;
        match store.load_report(batch_id).await? {
            Some(report) if cmd.json => println!("{}", serde_json::to_string_pretty(&report)?),
            Some(report) => {
                println!("{}", format_report_summary(&report));
                println!("{}", format_report_table(&report));
            }
            None => println!("{} Batch not found", WARN),
        }
        return Ok(());
    }

    let reports = store.list_reports(cmd.env.as_deref(), cmd.limit).await?;
    if reports.is_empty() {
        println!("{} No batches found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "batches": reports });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{} Batch history (showing latest {}):", INFO, cmd.limit);
    for report in &reports {
        println!("  {}", format_report_summary(report));
        if cmd.rows {
            for line in format_report_table(report).lines() {
                println!("    {}", line);
            }
        }
    }

    Ok(())
}

//! bladecam CLI - batch planning and stock simulation
//!
//! Runs the operations of a TOML job file against a blade model record.

use anyhow::Result;
use bladecam::task::TaskContext;
use bladecam::BladecamConfig;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

mod job;

use job::Job;

#[derive(Parser)]
#[command(name = "bladecam")]
#[command(about = "Blisk and impeller toolpath planning and stock simulation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan every operation of a job and print its passes
    Plan {
        /// Job file (.toml)
        job: PathBuf,
        /// Print the plans as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate toolpaths and replay them against the job's stock
    Simulate {
        /// Job file (.toml)
        job: PathBuf,
        /// Directory for one step CSV per operation
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Stop each run at the first collision
        #[arg(long)]
        stop_on_collision: bool,
        /// Write the session record (.json) after simulating
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Print the default configuration
    Config {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Plan { job, json }) => {
            let (job, config) = load(&job)?;
            bladecam::logging::init_logging(&config.logging)?;
            plan(&job, config, json)
        }
        Some(Commands::Simulate {
            job: path,
            output,
            stop_on_collision,
            save,
        }) => {
            let (job, mut config) = load(&path)?;
            config.simulation.stop_on_collision |= stop_on_collision;
            bladecam::logging::init_logging(&config.logging)?;
            simulate(&job, config, output.as_deref(), save.as_deref())
        }
        Some(Commands::Config { output }) => write_config(output.as_deref()),
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

fn load(path: &Path) -> Result<(Job, BladecamConfig)> {
    let job = Job::load(path)?;
    let config = job.load_config()?;
    Ok((job, config))
}

fn plan(job: &Job, config: BladecamConfig, json: bool) -> Result<()> {
    let session = job.open_session(config, &TaskContext::detached())?;
    let mut plans = Vec::new();

    for id in session.operation_ids() {
        let operation = session.operation(id)?;
        let outcome = session.plan_operation(id)?;
        if json {
            plans.push(serde_json::json!({
                "operation": id,
                "name": operation.name,
                "plan": outcome,
            }));
            continue;
        }

        println!("{} ({})", operation.name, operation.kind);
        for pass in &outcome.passes {
            println!(
                "  pass {:>3}  {:?}  depth {:>8.3}  rows {:>3}  points {:>5}",
                pass.index,
                pass.stage,
                pass.depth,
                pass.rows.len(),
                pass.point_count()
            );
        }
        for warning in &outcome.warnings {
            println!("  warning: {warning}");
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&plans)?);
    }
    Ok(())
}

fn simulate(
    job: &Job,
    config: BladecamConfig,
    output: Option<&Path>,
    save: Option<&Path>,
) -> Result<()> {
    let Some(stock_box) = job.stock else {
        anyhow::bail!("Job has no [stock] block to simulate");
    };
    let ctx = TaskContext::detached();
    let session = job.open_session(config, &ctx)?;
    if let Some(dir) = output {
        std::fs::create_dir_all(dir)?;
    }

    // Each operation cuts the stock the previous one left.
    let mut stock = session.stock_from_box(stock_box.bounds())?;
    println!("stock volume {:.3}", stock.volume());

    for (index, id) in session.operation_ids().into_iter().enumerate() {
        let operation = session.operation(id)?;
        let generated = session.generate(id, &ctx)?;
        for warning in &generated.warnings {
            println!("  warning: {warning}");
        }

        session.start_simulation(id, stock)?;
        let summary = session.run_simulation(id, &ctx)?;
        println!(
            "{} ({}): {} segments, removed {:.3}, {} collisions, {} overcuts, {:.2} min",
            operation.name,
            operation.kind,
            generated.toolpath.len(),
            summary.removed_volume,
            summary.collisions,
            summary.overcuts,
            summary.machining_time
        );
        if let Some(step) = summary.stopped_at {
            println!("  stopped at step {step}");
        }

        if let Some(dir) = output {
            let file = dir.join(format!("{:02}-{}.csv", index + 1, file_stem(&operation.name)));
            session.with_simulation(id, |s| bladecam::stocksim::export_csv(s.steps(), &file))??;
            println!("  wrote {}", file.display());
        }
        stock = session.with_simulation(id, |s| s.stock().clone())?;
    }

    println!("remaining volume {:.3}", stock.volume());

    if let Some(save) = save {
        session.to_record().save(save)?;
        println!("Saved session to {}", save.display());
    }
    Ok(())
}

fn write_config(output: Option<&Path>) -> Result<()> {
    let config = BladecamConfig::default();
    match output {
        Some(path) => {
            config.save_to_file(path)?;
            println!("Wrote default config to {}", path.display());
        }
        None => print!("{}", config.to_toml_string()?),
    }
    Ok(())
}

/// Operation name made safe for a file name.
fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "operation".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::tests::{scratch, ROUGH_JOB};

    #[test]
    fn test_cli_parses_simulate() {
        let cli = Cli::try_parse_from([
            "bladecam",
            "simulate",
            "job.toml",
            "--output",
            "out",
            "--stop-on-collision",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Simulate {
                job,
                output,
                stop_on_collision,
                save,
            }) => {
                assert_eq!(job, PathBuf::from("job.toml"));
                assert_eq!(output, Some(PathBuf::from("out")));
                assert!(stop_on_collision);
                assert!(save.is_none());
            }
            _ => panic!("expected simulate"),
        }
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("rough A/B"), "rough_A_B");
        assert_eq!(file_stem(""), "operation");
    }

    #[test]
    fn test_simulate_writes_csv_and_record() {
        let dir = scratch("simulate");
        let path = dir.join("job.toml");
        std::fs::write(&path, ROUGH_JOB).unwrap();
        let out = dir.join("out");
        let record = dir.join("session.json");

        let (job, config) = load(&path).unwrap();
        simulate(&job, config, Some(&out), Some(&record)).unwrap();

        let csv = std::fs::read_to_string(out.join("01-rough.csv")).unwrap();
        assert!(csv.lines().count() > 1);
        let saved = bladecam::SessionRecord::load(&record).unwrap();
        assert_eq!(saved.operations.len(), 1);
        assert_eq!(saved.toolpaths.len(), 1);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_config_round_trips_through_file() {
        let dir = std::env::temp_dir().join(format!("bladecam-cli-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bladecam.toml");
        write_config(Some(&path)).unwrap();
        assert_eq!(
            BladecamConfig::load_from_file(&path).unwrap(),
            BladecamConfig::default()
        );
        std::fs::remove_dir_all(dir).ok();
    }
}

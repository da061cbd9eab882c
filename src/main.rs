use anyhow::{bail, Context, Result};
use asistencia::aggregate::{aggregate_records, Grouping};
use asistencia::cli::{Cli, Command, InputOutput};
use asistencia::config::TrainerConfig;
use asistencia::csv_output::{feature_table_csv, metrics_csv, predictions_csv, rollup_csv};
use asistencia::features::{FeatureBuilder, FeatureTable};
use asistencia::ingest::{read_feature_table, read_punches, PunchLog};
use asistencia::label::classify;
use asistencia::model::{load_model, model_status_line, save_model, PersistenceOptions};
use asistencia::predictor::{PredictionResult, Predictor};
use asistencia::rollup::rollup_by_employee_month;
use asistencia::trainer::ModelTrainer;
use clap::Parser;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber (stderr, `RUST_LOG` or `info` unless `--debug`)
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Write to `path`, or stdout when none is given
fn emit(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "wrote output");
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn trainer_config(
    config: Option<&Path>,
    quick: bool,
    seed: Option<u64>,
    workers: Option<usize>,
) -> Result<TrainerConfig> {
    let mut config = match config {
        Some(path) => TrainerConfig::from_toml_file(path)?,
        None if quick => TrainerConfig::quick(),
        None => TrainerConfig::default(),
    };
    if let Some(seed) = seed {
        config.seed = seed;
    }
    if let Some(workers) = workers {
        config.workers = workers;
    }
    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}

/// Load a model and score every record of the input
fn score(model_path: &Path, io: &InputOutput) -> Result<(PunchLog, Vec<PredictionResult>)> {
    let model = load_model(model_path)?;
    info!("{}", model_status_line(&model));

    let log = read_punches(&io.input)?;
    let table = FeatureBuilder::inference().build(&log.records);
    let predictions = Predictor::new(&model).predict(&table)?;
    Ok((log, predictions))
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Features { io, unlabeled } => {
            let log = read_punches(&io.input)?;
            let builder = if log.has_status && !unlabeled {
                FeatureBuilder::training()
            } else {
                FeatureBuilder::inference()
            };
            let table = builder.build(&log.records);
            emit(io.output.as_deref(), &feature_table_csv(&table))?;
        }

        Command::Train {
            input,
            features,
            model,
            config,
            quick,
            seed,
            workers,
            no_compress,
            report,
        } => {
            let config = trainer_config(config.as_deref(), quick, seed, workers)?;

            let table: FeatureTable = if features {
                read_feature_table(&input)?
            } else {
                let log = read_punches(&input)?;
                if !log.has_status {
                    bail!(
                        "{} has no `ausencia` column; training needs labeled records",
                        input.display()
                    );
                }
                FeatureBuilder::training().build(&log.records)
            };

            let run = ModelTrainer::new(config).train_with_report(&table)?;
            let options = PersistenceOptions::new()
                .with_compression(!no_compress)
                .with_name("asistencia-attendance")
                .with_description(format!("best: {}", run.best().params));
            save_model(&run.model, &model, options)?;
            info!(path = %model.display(), "saved model");

            if let Some(path) = report {
                emit(Some(&path), &run.to_json()?)?;
            }

            println!("{}", run.format());
        }

        Command::Predict { model, io } => {
            let (log, predictions) = score(&model.model, &io)?;
            emit(io.output.as_deref(), &predictions_csv(&log.records, &predictions))?;
        }

        Command::Evaluate { model, io, by } => {
            let (log, predictions) = score(&model.model, &io)?;
            if !log.has_status {
                bail!(
                    "{} has no `ausencia` column; nothing to evaluate against",
                    io.input.display()
                );
            }

            let truth: Vec<_> = log
                .records
                .iter()
                .map(|r| classify(r.raw_attendance_status.as_deref()))
                .collect();

            let grouping = Grouping::from(by);
            let mut metrics = aggregate_records(&log.records, &predictions, &truth, grouping)?;
            if grouping != Grouping::Global {
                metrics.extend(aggregate_records(
                    &log.records,
                    &predictions,
                    &truth,
                    Grouping::Global,
                )?);
            }
            emit(io.output.as_deref(), &metrics_csv(&metrics))?;
        }

        Command::Rollup { model, io } => {
            let (log, predictions) = score(&model.model, &io)?;
            let rollups = rollup_by_employee_month(&log.records, &predictions);
            emit(io.output.as_deref(), &rollup_csv(&rollups))?;
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    run(cli)
}

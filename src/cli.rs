//! CLI argument parsing for asistencia

use crate::aggregate::Grouping;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Grouping for `evaluate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GroupBy {
    /// One row per calendar date
    Date,
    /// One row per employee and month
    EmployeeMonth,
    /// A single row over every record
    Global,
}

impl From<GroupBy> for Grouping {
    fn from(by: GroupBy) -> Self {
        match by {
            GroupBy::Date => Grouping::Date,
            GroupBy::EmployeeMonth => Grouping::EmployeeMonth,
            GroupBy::Global => Grouping::Global,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "asistencia")]
#[command(version)]
#[command(about = "Employee attendance prediction from time-clock punches", long_about = None)]
pub struct Cli {
    /// Enable debug logging on stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the feature table from a punch CSV
    Features {
        #[command(flatten)]
        io: InputOutput,

        /// Do not derive labels even if the input has an `ausencia` column
        #[arg(long)]
        unlabeled: bool,
    },

    /// Train a model with cross-validated grid search
    Train {
        /// Punch CSV with an `ausencia` column
        #[arg(short, long, value_name = "CSV")]
        input: PathBuf,

        /// Treat the input as a feature table CSV instead of raw punches
        #[arg(long)]
        features: bool,

        /// Where to write the model artifact (.apr)
        #[arg(short, long, value_name = "FILE")]
        model: PathBuf,

        /// Trainer configuration (TOML)
        #[arg(long, value_name = "FILE", conflicts_with = "quick")]
        config: Option<PathBuf>,

        /// Use the small smoke-test grid
        #[arg(long)]
        quick: bool,

        /// Override the configured seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the configured worker count (0 = all cores)
        #[arg(long)]
        workers: Option<usize>,

        /// Store the model without zstd compression
        #[arg(long)]
        no_compress: bool,

        /// Also write the search results as JSON
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Predict attendance for every record of a punch CSV
    Predict {
        #[command(flatten)]
        model: ModelArg,

        #[command(flatten)]
        io: InputOutput,
    },

    /// Compare predictions with the recorded `ausencia` status
    Evaluate {
        #[command(flatten)]
        model: ModelArg,

        #[command(flatten)]
        io: InputOutput,

        /// How to group the accuracy table
        #[arg(long, value_enum, default_value = "global")]
        by: GroupBy,
    },

    /// Mean predicted probabilities per employee and month
    Rollup {
        #[command(flatten)]
        model: ModelArg,

        #[command(flatten)]
        io: InputOutput,
    },
}

#[derive(Args, Debug)]
pub struct ModelArg {
    /// Trained model artifact (.apr)
    #[arg(short, long, value_name = "FILE")]
    pub model: PathBuf,
}

#[derive(Args, Debug)]
pub struct InputOutput {
    /// Punch CSV to read
    #[arg(short, long, value_name = "CSV")]
    pub input: PathBuf,

    /// Write CSV here instead of stdout
    #[arg(short, long, value_name = "CSV")]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_features() {
        let cli = Cli::parse_from(["asistencia", "features", "-i", "punches.csv"]);
        assert!(!cli.debug);
        match cli.command {
            Command::Features { io, unlabeled } => {
                assert_eq!(io.input, PathBuf::from("punches.csv"));
                assert!(io.output.is_none());
                assert!(!unlabeled);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_train_flags() {
        let cli = Cli::parse_from([
            "asistencia",
            "--debug",
            "train",
            "--input",
            "p.csv",
            "--model",
            "m.apr",
            "--quick",
            "--seed",
            "7",
            "--workers",
            "2",
        ]);
        assert!(cli.debug);
        match cli.command {
            Command::Train {
                input,
                model,
                quick,
                seed,
                workers,
                config,
                features,
                no_compress,
                report,
            } => {
                assert_eq!(input, PathBuf::from("p.csv"));
                assert_eq!(model, PathBuf::from("m.apr"));
                assert!(quick);
                assert_eq!(seed, Some(7));
                assert_eq!(workers, Some(2));
                assert!(config.is_none());
                assert!(!features);
                assert!(!no_compress);
                assert!(report.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_config_conflicts_with_quick() {
        let result = Cli::try_parse_from([
            "asistencia",
            "train",
            "-i",
            "p.csv",
            "-m",
            "m.apr",
            "--quick",
            "--config",
            "t.toml",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_evaluate_grouping() {
        let cli = Cli::parse_from([
            "asistencia",
            "evaluate",
            "-m",
            "m.apr",
            "-i",
            "p.csv",
            "--by",
            "employee-month",
        ]);
        match cli.command {
            Command::Evaluate { by, .. } => {
                assert_eq!(by, GroupBy::EmployeeMonth);
                assert_eq!(Grouping::from(by), Grouping::EmployeeMonth);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_evaluate_defaults_to_global() {
        let cli = Cli::parse_from(["asistencia", "evaluate", "-m", "m.apr", "-i", "p.csv"]);
        assert!(matches!(
            cli.command,
            Command::Evaluate {
                by: GroupBy::Global,
                ..
            }
        ));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["asistencia"]).is_err());
    }

    #[test]
    fn test_cli_predict_output() {
        let cli = Cli::parse_from([
            "asistencia",
            "predict",
            "--model",
            "m.apr",
            "--input",
            "p.csv",
            "--output",
            "out.csv",
        ]);
        match cli.command {
            Command::Predict { model, io } => {
                assert_eq!(model.model, PathBuf::from("m.apr"));
                assert_eq!(io.output, Some(PathBuf::from("out.csv")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}

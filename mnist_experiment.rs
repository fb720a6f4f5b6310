use std::path::PathBuf;
use std::process;

use clap::Parser;
use mnist_experiments::config::load_config;
use mnist_experiments::pipeline::{load_corpus, run_experiment};
use mnist_experiments::train::RunId;
use mnist_experiments::utils::logging::init_tracing;

/// Train and evaluate an MNIST model described by a JSON experiment config.
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Experiment configuration file
    #[arg(value_name = "PATH")]
    config: PathBuf,
    /// Run id; defaults to one past the highest existing run
    #[arg(long, value_name = "INT")]
    run_id: Option<u32>,
    /// Overrides logging.log_root
    #[arg(long, value_name = "DIR")]
    log_root: Option<PathBuf>,
    /// Overrides data.dir
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,
    /// Download missing corpus files
    #[arg(long)]
    download: bool,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn run(cli: Cli) -> mnist_experiments::Result<()> {
    let mut config = load_config(&cli.config)?;
    if let Some(root) = cli.log_root {
        config.logging.log_root = root;
    }
    if let Some(dir) = cli.data_dir {
        config.data.dir = dir;
    }
    config.data.download |= cli.download;

    let run_id = match cli.run_id {
        Some(id) => RunId(id),
        None => RunId::next_available(&config.logging.log_root)?,
    };

    let corpus = load_corpus(&config.data)?;
    let report = run_experiment(&config, &corpus, run_id)?;

    println!("{}", report.summary);
    println!(
        "Run {} ({}) finished: test loss {:.4}, test accuracy {:.2}%",
        report.run_id,
        report.name.as_deref().unwrap_or("unnamed"),
        report.evaluation.loss,
        report.evaluation.accuracy * 100.0
    );
    println!("Confusion matrix (rows = true class, columns = predicted):");
    print!("{}", report.confusion);
    for path in &report.artifacts {
        println!("  wrote {}", path.display());
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

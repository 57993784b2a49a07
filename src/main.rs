mod cli;

use std::{path::PathBuf, process::ExitCode};

use anyhow::Context;
use clap::Parser;
use corpus::{CacheRegistry, Dataset, load_paths};
use log::{error, info};
use orchestrator::{TrainingConfig, train_hdp, train_lda};
use tokio::{signal, task};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => return ExitCode::from(cli::report_parse_error(&e)),
    };

    init_logging(cli.log_level.as_deref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(filters: Option<&str>) {
    let env = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);

    if let Some(filters) = filters {
        builder.parse_filters(filters);
    }

    builder.init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config()?;
    let inputs = cli.inputs;
    let top_terms = cli.top_terms;

    let training = task::spawn_blocking(move || train(&inputs, &config, top_terms));

    tokio::select! {
        ret = training => ret.context("training task panicked")?,
        _ = signal::ctrl_c() => {
            info!("received ctrl-c, stopping");
            std::process::exit(130);
        }
    }
}

fn train(inputs: &[PathBuf], config: &TrainingConfig, top_terms: usize) -> anyhow::Result<()> {
    let docs =
        load_paths(inputs, config.vocab_size().get()).context("failed to load the corpus")?;

    let registry = CacheRegistry::new();
    let corpus = Dataset::parallelize(docs, config.partitions(), &registry);

    if config.algorithm().is_hdp() {
        let run = train_hdp(&corpus, config)?;
        println!(
            "hdp trained for {} iterations, checkpoints under {}",
            run.iterations, run.monitor
        );
        if let Some(score) = run.report.last_score() {
            println!("last score (document perplexity, topic bound): {score}");
        }
        return Ok(());
    }

    let model = train_lda(&corpus, config)?;
    if let Some(score) = model.report().last_score() {
        println!("last perplexity: {score}");
    }

    for (topic, terms) in model.describe_topics(top_terms)?.iter().enumerate() {
        let terms: Vec<String> = terms
            .iter()
            .map(|(term, p)| format!("{term}:{p:.4}"))
            .collect();
        println!("topic {topic}: {}", terms.join(" "));
    }

    model.recycle();
    Ok(())
}

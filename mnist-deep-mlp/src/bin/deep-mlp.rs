use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;

use mlp::dataset::load_mnist;
use mlp::export::Exporter;
use mlp::model::DeepMlp;
use mlp::train::{Parameter, Trainer};
use mlp::util::log::init_logging;

/// Trains the dense 784-128-64-10 digit classifier for 20_000 steps and
/// exports a checkpoint plus a frozen inference graph.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Directory for storing input data
    #[arg(long = "data_dir", default_value = "/tmp/mnist/input_data")]
    data_dir: PathBuf,
    /// Checkpoint path
    #[arg(long, default_value = "my-model/model.ckpt")]
    chkp: PathBuf,
    /// Directory the frozen graph is written to
    #[arg(long, default_value = "my-model")]
    output_dir: PathBuf,
    /// Seed for initialization, batch order and dropout; random if absent
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let splits = load_mnist(&args.data_dir)?;

    let seed = args.seed.unwrap_or_else(rand::random);
    log::info!("seed: {}", seed);
    let model = DeepMlp::classifier(&mut StdRng::seed_from_u64(seed))?;

    let param = Parameter { seed, ..Parameter::default() };
    let mut trainer = Trainer::new(model, splits.train, param)?;
    trainer.run()?;

    let model = trainer.into_model();
    Exporter::new(&model, &args.chkp, &args.output_dir.join("train.pb")).run(&splits.test)?;

    Ok(())
}

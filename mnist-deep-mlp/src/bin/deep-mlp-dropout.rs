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

/// Sibling of `deep-mlp`: same architecture regularized with 50% dropout on
/// the hidden layers, a configurable step budget, and optional weight
/// quantization of the exported graph.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Directory for storing input data
    #[arg(long = "data_dir", default_value = "/tmp/mnist/input_data")]
    data_dir: PathBuf,
    /// Checkpoint path
    #[arg(long, default_value = "my-model/model.ckpt")]
    chkp: PathBuf,
    /// Training step budget
    #[arg(short = 'n', long = "num-iteration", default_value_t = 20_000)]
    num_iteration: usize,
    /// Examples per mini-batch
    #[arg(long, default_value_t = 50)]
    batch_size: usize,
    /// Report training accuracy every n steps
    #[arg(long, default_value_t = 1_000)]
    log_every_iters: usize,
    /// Directory the frozen graph is written to
    #[arg(long, default_value = "my-model")]
    output_dir: PathBuf,
    /// File name of the frozen graph
    #[arg(short, long, default_value = "deep_mlp.pb")]
    output: String,
    /// Keep the weight constants in f32 instead of quantizing them
    #[arg(long, default_value_t = false)]
    no_quantization: bool,
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
    let model = DeepMlp::classifier_with_dropout(&mut StdRng::seed_from_u64(seed))?;

    let param = Parameter {
        num_iterations: args.num_iteration,
        batch_size: args.batch_size,
        log_every_iters: args.log_every_iters,
        seed,
        ..Parameter::default()
    };
    let mut trainer = Trainer::new(model, splits.train, param)?;
    trainer.run()?;

    let model = trainer.into_model();
    Exporter::new(&model, &args.chkp, &args.output_dir.join(&args.output))
        .with_quantization(!args.no_quantization)
        .run(&splits.test)?;

    Ok(())
}

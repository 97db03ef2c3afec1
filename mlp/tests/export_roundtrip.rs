use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;

use mlp::export::{Checkpoint, Exporter, FrozenGraph};
use mlp::model::DeepMlp;
use mlp::train::{Parameter, Trainer};

mod common;

fn trained_classifier(seed: u64) -> Result<DeepMlp> {
    let model = DeepMlp::classifier(&mut StdRng::seed_from_u64(seed))?;
    let param = Parameter {
        num_iterations: 5,
        batch_size: 10,
        log_every_iters: 5,
        seed,
        ..Parameter::default()
    };
    let mut trainer = Trainer::new(model, common::all_zero_ten_examples(), param)?;
    trainer.run()?;
    Ok(trainer.into_model())
}

#[test]
fn test_full_export_pipeline_preserves_the_trained_model() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let checkpoint_path = dir.path().join("my-model/model.ckpt");
    let graph_path = dir.path().join("my-model/train.pb");

    let model = trained_classifier(3)?;
    let test_set = common::all_zero_ten_examples();
    let report = Exporter::new(&model, &checkpoint_path, &graph_path).run(&test_set)?;

    assert!((0.0..=1.0).contains(&report.test_accuracy));

    // the artifact on disk replays to exactly the live model's logits
    let graph = FrozenGraph::read(&graph_path)?;
    let live_logits = model.forward(test_set.images())?;
    assert_eq!(live_logits, graph.run(test_set.images())?);

    // and replaying twice is deterministic
    assert_eq!(graph.run(test_set.images())?, graph.run(test_set.images())?);
    Ok(())
}

#[test]
fn test_checkpoint_restores_into_a_freshly_built_classifier() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let checkpoint_path = dir.path().join("model.ckpt");

    let model = trained_classifier(4)?;
    Checkpoint::capture(&model).save(&checkpoint_path)?;

    let mut fresh = DeepMlp::classifier(&mut StdRng::seed_from_u64(999))?;
    Checkpoint::load(&checkpoint_path)?.restore(&mut fresh)?;

    let input = common::all_zero_ten_examples().images().clone();
    assert_eq!(model.predict(&input)?, fresh.predict(&input)?);
    assert_eq!(model.forward(&input)?, fresh.forward(&input)?);
    Ok(())
}

#[test]
fn test_dropout_variant_freezes_to_a_deterministic_artifact() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let checkpoint_path = dir.path().join("model.ckpt");
    let graph_path = dir.path().join("train.pb");

    let model = DeepMlp::classifier_with_dropout(&mut StdRng::seed_from_u64(8))?;
    let param = Parameter {
        num_iterations: 2,
        batch_size: 10,
        log_every_iters: 1,
        ..Parameter::default()
    };
    let mut trainer = Trainer::new(model, common::all_zero_ten_examples(), param)?;
    trainer.run()?;
    let model = trainer.into_model();

    let test_set = common::all_zero_ten_examples();
    Exporter::new(&model, &checkpoint_path, &graph_path).run(&test_set)?;

    let graph = FrozenGraph::read(&graph_path)?;
    let a = graph.run(test_set.images())?;
    let b = graph.run(test_set.images())?;
    assert_eq!(a, b);
    // inference-mode forward of the dropout model matches the artifact
    assert_eq!(model.forward(test_set.images())?, a);
    Ok(())
}

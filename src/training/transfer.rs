//! Two-Phase Transfer Learning
//!
//! Phase 1 trains only the classification head on top of a frozen
//! MobileNetV2 backbone. Phase 2 unfreezes the backbone stages holding its
//! last `fine_tune_layers` layers and continues at a lower learning rate.
//!
//! Frozen stages run on the inner (non-autodiff) backend: they use batch-norm
//! running statistics and never receive gradients. Each phase starts a fresh
//! Adam optimizer.

use std::path::PathBuf;

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion, Int, Tensor},
};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use super::history::{EpochMetrics, TrainingHistory};
use crate::dataset::{
    augmentation::Augmenter, burn_dataset::LeafBatcher, split::shuffled_indices, LeafDataset,
    LeafImageDataset, ValidationSplit,
};
use crate::evaluation::evaluator::predict_dataset;
use crate::model::{
    artifact::{save_artifact, weights_path, ModelMetadata},
    classifier::{TomatoClassifier, TomatoClassifierConfig},
    config::TrainingConfig,
    mobilenet::MobileNetV2,
};
use crate::utils::error::{Result, TomatoError};
use crate::utils::logging::TrainingLogger;

/// Adam epsilon matching the Keras default
const ADAM_EPSILON: f32 = 1e-7;

/// Files produced by a training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// Metrics of both phases, in epoch order
    pub history: TrainingHistory,
    /// Artifact base path (`<output_dir>/<model_name>`)
    pub model_path: PathBuf,
    pub history_path: PathBuf,
    pub curves_path: PathBuf,
    /// Backbone stages trained during fine-tuning
    pub fine_tuned_stages: usize,
}

/// One training phase: which backbone stages are trainable and how long to train
struct Phase<'a> {
    name: &'a str,
    title: &'a str,
    epochs: usize,
    learning_rate: f64,
    /// First trainable backbone stage; stages before it are frozen
    trainable_from: usize,
    /// Global index of the first epoch of this phase (for shuffling)
    epoch_offset: usize,
}

/// Run the full transfer-learning pipeline
///
/// Loads and splits the dataset, trains both phases, then writes the model
/// artifact, `training_history.json` and `training_curves.svg` into the
/// configured output directory.
pub fn run_training<B: AutodiffBackend>(
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<TrainingOutcome> {
    config.validate().map_err(TomatoError::Config)?;

    println!("{}", "Loading Dataset...".cyan());
    let dataset = LeafDataset::new(&config.data_dir)?;
    dataset.get_stats(config.validation_split).print();

    let split = ValidationSplit::from_dataset(&dataset, config.validation_split)?;
    println!("  Training images:   {}", split.training.len());
    println!("  Validation images: {}", split.validation.len());

    println!();
    println!("{}", "Class Indices:".cyan().bold());
    let class_indices: std::collections::BTreeMap<&str, usize> = dataset
        .class_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();
    println!("{}", serde_json::to_string_pretty(&class_indices)?);

    let (train_dataset, val_dataset) = if config.cache_images {
        println!("{}", "Pre-loading images...".cyan());
        (
            LeafImageDataset::new_cached(&split.training, config.image_size),
            LeafImageDataset::new_cached(&split.validation, config.image_size),
        )
    } else {
        (
            LeafImageDataset::new(&split.training, config.image_size),
            LeafImageDataset::new(&split.validation, config.image_size),
        )
    };
    if train_dataset.is_empty() || val_dataset.is_empty() {
        return Err(TomatoError::Dataset(
            "no readable images left in the training or validation subset".to_string(),
        ));
    }

    println!();
    println!("{}", "Building MobileNetV2 model...".cyan());
    let backbone = match &config.backbone_weights {
        Some(path) => MobileNetV2::<B>::new(device).load_weights(path, device)?,
        None if config.random_backbone => {
            warn!("No backbone weights given; training from a randomly initialised backbone");
            MobileNetV2::new(device)
        }
        None => {
            return Err(TomatoError::Training(
                "no pretrained backbone weights; pass --backbone-weights <file> \
                 (convert torchvision weights with `tomato_leaf import-backbone`) \
                 or --random-backbone to train from scratch"
                    .to_string(),
            ))
        }
    };
    let model_config = TomatoClassifierConfig::new()
        .with_num_classes(dataset.num_classes())
        .with_hidden_units(config.hidden_units)
        .with_dropout(config.dropout);
    let mut model = model_config.init_with_backbone(backbone, device);

    let num_stages = model.backbone.num_stages();
    let fine_tune_from = model.backbone.trainable_from(config.fine_tune_layers);
    info!(
        "Backbone: {} layers in {} stages; fine-tuning stages {}..{}",
        model.backbone.num_layers(),
        num_stages,
        fine_tune_from,
        num_stages
    );

    let batcher = LeafBatcher::<B>::augmenting(
        config.image_size,
        Augmenter::new(config.augmentation.clone()),
        config.seed,
    );

    let phases = [
        Phase {
            name: "Phase 1",
            title: "PHASE 1: Training top layers",
            epochs: config.epochs_phase1,
            learning_rate: config.learning_rate_phase1,
            trainable_from: num_stages,
            epoch_offset: 0,
        },
        Phase {
            name: "Phase 2",
            title: "PHASE 2: Fine-tuning",
            epochs: config.epochs_phase2,
            learning_rate: config.learning_rate_phase2,
            trainable_from: fine_tune_from,
            epoch_offset: config.epochs_phase1,
        },
    ];

    let mut history = TrainingHistory::new();
    for phase in &phases {
        println!();
        println!("{}", "=".repeat(60));
        println!(
            "{}",
            format!("{} ({} epochs)", phase.title, phase.epochs).green().bold()
        );
        println!("{}", "=".repeat(60));

        let (trained, phase_history) =
            train_phase(model, phase, &train_dataset, &val_dataset, &batcher, config, device);
        model = trained;
        history.extend(&phase_history);
    }

    // Persist artifacts
    std::fs::create_dir_all(&config.output_dir)?;
    println!();
    println!("{}", "Saving model...".cyan());

    let metadata = ModelMetadata::new(
        dataset.class_names.clone(),
        dataset.labels(),
        config.image_size,
        config.hidden_units,
        config.dropout,
        config.epochs_phase1,
        config.epochs_phase2,
    );
    let model_path = config.model_path();
    save_artifact(model.valid(), &metadata, &model_path)?;

    let history_path = config.output_dir.join("training_history.json");
    history.save_json(&history_path)?;

    let curves_path = config.output_dir.join("training_curves.svg");
    history.plot(&curves_path, Some(config.epochs_phase1.saturating_sub(1)))?;

    let outcome = TrainingOutcome {
        history,
        model_path,
        history_path,
        curves_path,
        fine_tuned_stages: num_stages - fine_tune_from,
    };
    print_summary(&outcome);

    Ok(outcome)
}

/// Train one phase and return the updated model with its per-epoch metrics
fn train_phase<B: AutodiffBackend>(
    mut model: TomatoClassifier<B>,
    phase: &Phase<'_>,
    train_dataset: &LeafImageDataset,
    val_dataset: &LeafImageDataset,
    batcher: &LeafBatcher<B>,
    config: &TrainingConfig,
    device: &B::Device,
) -> (TomatoClassifier<B>, TrainingHistory) {
    let num_stages = model.backbone.num_stages();
    let trainable = phase.trainable_from.min(num_stages);

    let mut optimizer = AdamConfig::new()
        .with_epsilon(ADAM_EPSILON)
        .init::<B, TomatoClassifier<B>>();
    let loss_fn = CrossEntropyLossConfig::new().init(device);

    // Frozen stages never change during the phase
    let frozen = model.backbone.valid();

    let mut logger = TrainingLogger::new(phase.name, phase.epochs);
    let mut history = TrainingHistory::new();
    let num_batches = train_dataset.len().div_ceil(config.batch_size);

    for epoch in 0..phase.epochs {
        logger.start_epoch(epoch);
        println!(
            "{}",
            format!("Epoch {}/{}", epoch + 1, phase.epochs).yellow().bold()
        );

        let pb = ProgressBar::new(num_batches as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        let order = shuffled_indices(
            train_dataset.len(),
            config.seed,
            phase.epoch_offset + epoch,
        );

        let mut loss_sum = 0.0f64;
        let mut correct = 0usize;
        let mut seen = 0usize;

        for chunk in order.chunks(config.batch_size) {
            let items = train_dataset.get_many(chunk);
            if items.is_empty() {
                pb.inc(1);
                continue;
            }
            let batch = batcher.batch(items, device);
            let batch_len = batch.targets.dims()[0];

            let features = if trainable > 0 {
                let prefix = frozen.forward_range(batch.images.inner(), 0..trainable);
                Tensor::from_inner(prefix)
            } else {
                batch.images
            };
            let features = model.backbone.forward_range(features, trainable..num_stages);
            let logits = model.head.forward(features);

            let loss = loss_fn.forward(logits.clone(), batch.targets.clone());
            let loss_value = loss.clone().into_scalar().elem::<f64>();

            loss_sum += loss_value * batch_len as f64;
            correct += count_correct(logits, batch.targets);
            seen += batch_len;

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(phase.learning_rate, model, grads);

            pb.set_message(format!(
                "loss {:.4} acc {:.2}%",
                loss_sum / seen as f64,
                100.0 * correct as f64 / seen as f64
            ));
            pb.inc(1);
        }
        pb.finish_and_clear();

        let validation = predict_dataset(&model.valid(), val_dataset, config.batch_size, device);
        let metrics = EpochMetrics {
            loss: loss_sum / seen.max(1) as f64,
            accuracy: correct as f64 / seen.max(1) as f64,
            val_loss: validation.loss,
            val_accuracy: validation.accuracy(),
        };

        println!(
            "  {} loss: {:.4} - accuracy: {:.4} - val_loss: {:.4} - val_accuracy: {:.4}",
            "→".cyan(),
            metrics.loss,
            metrics.accuracy,
            metrics.val_loss,
            metrics.val_accuracy
        );
        logger.end_epoch(metrics.loss, metrics.accuracy, metrics.val_loss, metrics.val_accuracy);
        history.record(metrics);
    }

    logger.log_complete();
    (model, history)
}

/// Number of rows whose arg-max matches the target
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predictions = logits.argmax(1).flatten::<1>(0, 1);
    let correct: i64 = predictions
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct.max(0) as usize
}

fn print_summary(outcome: &TrainingOutcome) {
    println!();
    println!("{}", "=".repeat(60));
    println!("{}", "TRAINING COMPLETE!".green().bold());
    println!("{}", "=".repeat(60));

    if let Some(last) = outcome.history.last() {
        println!();
        println!("{}", "Final Results:".cyan().bold());
        println!("  Training Accuracy:   {:.2}%", last.accuracy * 100.0);
        println!("  Validation Accuracy: {:.2}%", last.val_accuracy * 100.0);
        println!("  Training Loss:       {:.4}", last.loss);
        println!("  Validation Loss:     {:.4}", last.val_loss);
    }

    println!();
    println!("{}", "Files Created:".cyan().bold());
    println!("  {:?} - Trained model", weights_path(&outcome.model_path));
    println!("  {:?} - Training metrics", outcome.history_path);
    println!("  {:?} - Accuracy/Loss plots", outcome.curves_path);

    println!();
    println!("{}", "Next Steps:".cyan().bold());
    println!(
        "  1. Run: tomato_leaf evaluate --model {:?}",
        outcome.model_path
    );
    println!("  2. Check confusion matrix and per-class accuracy");
    println!("  3. Serve: tomato-server --model {:?}", outcome.model_path);
}

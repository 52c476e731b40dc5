//! Tomato Leaf Disease Classification CLI
//!
//! Entry point for training, evaluating and running the MobileNetV2 tomato
//! leaf classifier built with the Burn framework.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use tomato_leaf::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use tomato_leaf::dataset::{is_image_file, AugmentationConfig};
use tomato_leaf::evaluation::run_evaluation;
use tomato_leaf::inference::{prepare_file, BurnClassifier, Classifier};
use tomato_leaf::training::run_training;
use tomato_leaf::utils::logging::{init_logging, LogConfig};
use tomato_leaf::{EvaluationConfig, LeafDataset, TomatoError, TrainingConfig};

/// Tomato Leaf Disease Classification
///
/// Transfer learning on MobileNetV2 for five tomato leaf categories.
#[derive(Parser, Debug)]
#[command(name = "tomato_leaf")]
#[command(version)]
#[command(about = "Tomato leaf disease classification with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train the classifier (frozen backbone, then fine-tuning)
    Train {
        /// JSON training configuration; flags below override its fields
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Dataset directory with one subdirectory per class
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Output directory for the model, history and plots
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Artifact base name
        #[arg(long)]
        model_name: Option<String>,

        /// Square input resolution
        #[arg(long)]
        image_size: Option<usize>,

        /// Batch size
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Epochs with the backbone frozen
        #[arg(long)]
        epochs_phase1: Option<usize>,

        /// Fine-tuning epochs
        #[arg(long)]
        epochs_phase2: Option<usize>,

        /// Learning rate of phase 1
        #[arg(long)]
        learning_rate_phase1: Option<f64>,

        /// Learning rate of phase 2
        #[arg(long)]
        learning_rate_phase2: Option<f64>,

        /// Backbone layers unfrozen for fine-tuning, counted from the end
        #[arg(long)]
        fine_tune_layers: Option<usize>,

        /// Fraction of each class held out for validation
        #[arg(long)]
        validation_split: Option<f64>,

        /// Random seed for shuffling and augmentation
        #[arg(long)]
        seed: Option<u64>,

        /// Pretrained backbone record (.mpk)
        #[arg(long)]
        backbone_weights: Option<PathBuf>,

        /// Train from a randomly initialised backbone (no pretrained weights)
        #[arg(long, default_value = "false")]
        random_backbone: bool,

        /// Decode all images into memory before training
        #[arg(long, default_value = "false")]
        cache_images: bool,

        /// Disable training augmentation
        #[arg(long, default_value = "false")]
        no_augmentation: bool,

        /// Write the effective configuration to this file
        #[arg(long)]
        save_config: Option<PathBuf>,
    },

    /// Evaluate a trained model on the validation split
    Evaluate {
        /// Dataset directory
        #[arg(short, long, default_value = "Dataset")]
        data_dir: PathBuf,

        /// Model artifact base path
        #[arg(short, long, default_value = "output/tomato_model")]
        model: PathBuf,

        /// Output directory for the confusion matrix and report
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// Batch size
        #[arg(short, long, default_value = "32")]
        batch_size: usize,

        /// Validation fraction used during training
        #[arg(long, default_value = "0.2")]
        validation_split: f64,
    },

    /// Predict the disease of one image or every image in a directory
    Predict {
        /// Path to an image or a directory of images
        #[arg(short, long)]
        input: PathBuf,

        /// Model artifact base path
        #[arg(short, long, default_value = "output/tomato_model")]
        model: PathBuf,
    },

    /// Show dataset statistics
    Stats {
        /// Dataset directory
        #[arg(short, long, default_value = "Dataset")]
        data_dir: PathBuf,

        /// Validation fraction for the split estimate
        #[arg(long, default_value = "0.2")]
        validation_split: f64,
    },

    /// Convert torchvision MobileNetV2 weights into a backbone record
    #[cfg(feature = "pytorch-import")]
    ImportBackbone {
        /// torchvision `mobilenet_v2` state dict (.pth)
        #[arg(short, long)]
        torch: PathBuf,

        /// Output record path (.mpk)
        #[arg(short, long, default_value = "weights/mobilenet_v2")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };

    if let Err(e) = init_logging(&log_config) {
        eprintln!("{}", e);
    }

    print_banner();

    match cli.command {
        Commands::Train {
            config,
            data_dir,
            output_dir,
            model_name,
            image_size,
            batch_size,
            epochs_phase1,
            epochs_phase2,
            learning_rate_phase1,
            learning_rate_phase2,
            fine_tune_layers,
            validation_split,
            seed,
            backbone_weights,
            random_backbone,
            cache_images,
            no_augmentation,
            save_config,
        } => {
            let mut training = match config {
                Some(path) => TrainingConfig::load(&path)?,
                None => TrainingConfig::default(),
            };

            if let Some(v) = data_dir {
                training.data_dir = v;
            }
            if let Some(v) = output_dir {
                training.output_dir = v;
            }
            if let Some(v) = model_name {
                training.model_name = v;
            }
            if let Some(v) = image_size {
                training.image_size = v;
            }
            if let Some(v) = batch_size {
                training.batch_size = v;
            }
            if let Some(v) = epochs_phase1 {
                training.epochs_phase1 = v;
            }
            if let Some(v) = epochs_phase2 {
                training.epochs_phase2 = v;
            }
            if let Some(v) = learning_rate_phase1 {
                training.learning_rate_phase1 = v;
            }
            if let Some(v) = learning_rate_phase2 {
                training.learning_rate_phase2 = v;
            }
            if let Some(v) = fine_tune_layers {
                training.fine_tune_layers = v;
            }
            if let Some(v) = validation_split {
                training.validation_split = v;
            }
            if let Some(v) = seed {
                training.seed = v;
            }
            if backbone_weights.is_some() {
                training.backbone_weights = backbone_weights;
            }
            if random_backbone {
                training.random_backbone = true;
            }
            if cache_images {
                training.cache_images = true;
            }
            if no_augmentation {
                training.augmentation = AugmentationConfig::none();
            }

            if let Some(path) = save_config {
                training.save(&path)?;
                info!("Saved training configuration to {:?}", path);
            }

            cmd_train(&training)?;
        }

        Commands::Evaluate {
            data_dir,
            model,
            output_dir,
            batch_size,
            validation_split,
        } => {
            let config = EvaluationConfig {
                data_dir,
                model_path: model,
                output_dir,
                batch_size,
                validation_split,
            };
            run_evaluation::<DefaultBackend>(&config, &default_device())?;
        }

        Commands::Predict { input, model } => {
            cmd_predict(&input, &model)?;
        }

        Commands::Stats {
            data_dir,
            validation_split,
        } => {
            cmd_stats(&data_dir, validation_split)?;
        }

        #[cfg(feature = "pytorch-import")]
        Commands::ImportBackbone { torch, output } => {
            cmd_import_backbone(&torch, &output)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!("{}", "=".repeat(60).green());
    println!("{}", "  Tomato Leaf Disease Classification".green().bold());
    println!("{}", "  MobileNetV2 transfer learning with Burn + Rust".green());
    println!("{}", "=".repeat(60).green());
}

fn cmd_train(config: &TrainingConfig) -> Result<()> {
    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Dataset:          {:?}", config.data_dir);
    println!("  Output:           {:?}", config.model_path());
    println!("  Image size:       {}x{}", config.image_size, config.image_size);
    println!("  Batch size:       {}", config.batch_size);
    println!(
        "  Epochs:           {} + {} (fine-tuning)",
        config.epochs_phase1, config.epochs_phase2
    );
    println!(
        "  Learning rates:   {} / {}",
        config.learning_rate_phase1, config.learning_rate_phase2
    );
    println!("  Fine-tune layers: {}", config.fine_tune_layers);
    println!("  Backend:          {}", backend_name());
    println!();

    match run_training::<TrainingBackend>(config, &default_device()) {
        Ok(_) => Ok(()),
        Err(e @ TomatoError::DatasetNotFound(_)) => {
            println!("{} {}", "ERROR:".red().bold(), e);
            println!("Make sure the dataset folder exists, with one subdirectory per class.");
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_predict(input: &Path, model: &Path) -> Result<()> {
    let classifier = match BurnClassifier::<DefaultBackend>::load(model, default_device()) {
        Ok(classifier) => classifier,
        Err(e) => {
            println!("{} {}", "ERROR:".red().bold(), e);
            println!("Run `tomato_leaf train` first to create the model.");
            return Err(e.into());
        }
    };

    let images: Vec<PathBuf> = if input.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(input)
            .with_context(|| format!("cannot read directory {:?}", input))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image_file(path))
            .collect();
        files.sort();
        files
    } else {
        vec![input.to_path_buf()]
    };

    if images.is_empty() {
        anyhow::bail!("no images found in {:?}", input);
    }

    for path in &images {
        let image = prepare_file(path, classifier.image_size())?;
        let prediction = classifier.predict(&image)?;

        println!();
        println!("{} {:?}", "Image:".cyan().bold(), path);
        println!(
            "  Prediction: {} ({:.2}%)",
            prediction.label.green().bold(),
            prediction.confidence * 100.0
        );
        for (label, probability) in prediction.ranked(classifier.labels()) {
            println!("    {:<16} {:>6.2}%", label, probability * 100.0);
        }
    }

    Ok(())
}

fn cmd_stats(data_dir: &Path, validation_split: f64) -> Result<()> {
    info!("Computing dataset statistics for: {:?}", data_dir);

    match LeafDataset::new(data_dir) {
        Ok(dataset) => {
            dataset.get_stats(validation_split).print();
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "Error:".red(), e);
            Err(e.into())
        }
    }
}

#[cfg(feature = "pytorch-import")]
fn cmd_import_backbone(torch: &Path, output: &Path) -> Result<()> {
    use tomato_leaf::model::artifact::weights_path;
    use tomato_leaf::model::import::import_torchvision_backbone;

    let device = default_device();
    let backbone = import_torchvision_backbone::<DefaultBackend>(torch, &device)?;
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    backbone.save_weights(output)?;

    println!("{} Backbone saved to {:?}", "✓".green(), weights_path(output));
    println!("Train with: tomato_leaf train --backbone-weights {:?}", output);
    Ok(())
}

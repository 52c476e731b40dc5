//! Import of torchvision MobileNetV2 weights
//!
//! Converts an ImageNet-pretrained `mobilenet_v2` state dict (`.pth`) into a
//! [`MobileNetV2`] backbone. The torchvision `features.*` keys are remapped to
//! this crate's module paths; the classifier weights are ignored.

use std::path::Path;

use burn::{
    module::Module,
    record::{FullPrecisionSettings, Recorder},
    tensor::backend::Backend,
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use tracing::info;

use super::mobilenet::{MobileNetV2, MobileNetV2Record};
use crate::utils::error::{Result, TomatoError};

/// Index of the last inverted-residual block in torchvision's `features`
const LAST_BLOCK_FEATURE: usize = 17;

/// Regex key remaps from torchvision names to backbone module paths
pub fn torchvision_key_remap() -> Vec<(String, String)> {
    let mut remap = vec![
        (r"^features\.0\.0\.".to_string(), "stem.conv.".to_string()),
        (r"^features\.0\.1\.".to_string(), "stem.bn.".to_string()),
        // First block has no expansion layer
        (r"^features\.1\.conv\.0\.0\.".to_string(), "blocks.0.depthwise.conv.".to_string()),
        (r"^features\.1\.conv\.0\.1\.".to_string(), "blocks.0.depthwise.bn.".to_string()),
        (r"^features\.1\.conv\.1\.".to_string(), "blocks.0.project.".to_string()),
        (r"^features\.1\.conv\.2\.".to_string(), "blocks.0.project_bn.".to_string()),
    ];

    for feature in 2..=LAST_BLOCK_FEATURE {
        let block = feature - 1;
        let prefix = format!(r"^features\.{}\.conv\.", feature);
        for (from, to) in [
            (r"0\.0\.", "expand.conv."),
            (r"0\.1\.", "expand.bn."),
            (r"1\.0\.", "depthwise.conv."),
            (r"1\.1\.", "depthwise.bn."),
            (r"2\.", "project."),
            (r"3\.", "project_bn."),
        ] {
            remap.push((format!("{}{}", prefix, from), format!("blocks.{}.{}", block, to)));
        }
    }

    let last = LAST_BLOCK_FEATURE + 1;
    remap.push((format!(r"^features\.{}\.0\.", last), "last.conv.".to_string()));
    remap.push((format!(r"^features\.{}\.1\.", last), "last.bn.".to_string()));

    remap
}

/// Load a torchvision MobileNetV2 state dict into a backbone
pub fn import_torchvision_backbone<B: Backend>(
    torch_path: &Path,
    device: &B::Device,
) -> Result<MobileNetV2<B>> {
    if !torch_path.exists() {
        return Err(TomatoError::ModelNotFound(torch_path.to_path_buf()));
    }

    let args = torchvision_key_remap()
        .into_iter()
        .fold(LoadArgs::new(torch_path.to_path_buf()), |args, (from, to)| {
            args.with_key_remap(&from, &to)
        });

    let recorder = PyTorchFileRecorder::<FullPrecisionSettings>::default();
    let record: MobileNetV2Record<B> = Recorder::<B>::load(&recorder, args, device)
        .map_err(|e| TomatoError::Model(format!("Failed to import {:?}: {}", torch_path, e)))?;

    info!("Imported torchvision weights from {:?}", torch_path);
    Ok(MobileNetV2::new(device).load_record(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Apply the anchored prefix patterns as literal prefixes
    fn apply(remap: &[(String, String)], key: &str) -> String {
        for (from, to) in remap {
            let literal = from.trim_start_matches('^').replace(r"\.", ".");
            if let Some(rest) = key.strip_prefix(literal.as_str()) {
                return format!("{}{}", to, rest);
            }
        }
        key.to_string()
    }

    #[test]
    fn test_remap_covers_all_blocks() {
        let remap = torchvision_key_remap();
        // stem 2 + first block 4 + 16 blocks * 6 + last 2
        assert_eq!(remap.len(), 2 + 4 + 16 * 6 + 2);
    }

    #[test]
    fn test_remap_examples() {
        let remap = torchvision_key_remap();
        assert_eq!(apply(&remap, "features.0.0.weight"), "stem.conv.weight");
        assert_eq!(apply(&remap, "features.1.conv.2.running_var"), "blocks.0.project_bn.running_var");
        assert_eq!(apply(&remap, "features.2.conv.0.0.weight"), "blocks.1.expand.conv.weight");
        assert_eq!(apply(&remap, "features.17.conv.3.bias"), "blocks.16.project_bn.bias");
        assert_eq!(apply(&remap, "features.18.1.weight"), "last.bn.weight");
        assert_eq!(apply(&remap, "classifier.1.weight"), "classifier.1.weight");
    }
}

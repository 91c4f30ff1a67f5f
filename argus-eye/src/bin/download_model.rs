//! Binary for downloading detection models from command line

use argus_eye::config::ModelConfig;
use argus_eye::error::VisionError;
use argus_eye::models::manager::{download_url, KNOWN_MODELS};
use argus_eye::models::ModelManager;
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), VisionError> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: download_model <model_name>");
        print_available();
        std::process::exit(1);
    }

    let mut model_name = args[1].to_lowercase();
    if !model_name.ends_with(".onnx") {
        model_name.push_str(".onnx");
    }

    let Some(url) = download_url(&model_name) else {
        eprintln!("Unknown model: {}", model_name);
        print_available();
        std::process::exit(1);
    };

    let config = ModelConfig {
        model_name: model_name.clone(),
        ..ModelConfig::default()
    };
    let manager = ModelManager::new(Arc::new(config));

    println!("Downloading {}...", model_name);
    let path = manager.ensure_model(&model_name, &url, "").await?;
    println!("{} downloaded to: {:?}", model_name, path);

    Ok(())
}

fn print_available() {
    eprintln!("Available models:");
    for (name, params) in KNOWN_MODELS {
        eprintln!("  {} ({} parameters)", name, params);
    }
}

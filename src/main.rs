use std::process::ExitCode;

use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use entrywise::{Value, cli, config::KernelConfig, kernel::Kernel};

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match KernelConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "could not load the configuration");
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let tokens: Vec<String> = std::env::args().skip(1).collect();
    let pipeline = match cli::parse_pipeline(&tokens, &config.pipeline_separator) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    debug!(steps = pipeline.len(), "pipeline parsed");

    let (kernel, _registry) = Kernel::from_config(config);
    match kernel.execute(&pipeline) {
        Ok(Value::Null) => ExitCode::SUCCESS,
        Ok(result) => {
            println!("{result}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

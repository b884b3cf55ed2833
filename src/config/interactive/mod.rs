#[cfg(test)]
mod tests;

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, EmbeddingBackend, GenerationBackend, OllamaConfig};

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Audience Match Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Embedding Provider").bold().yellow());
    eprintln!("Embeddings are used both to build the segment index and to embed briefs.");
    eprintln!();

    configure_embedding(&mut config)?;

    if config.embedding.backend == EmbeddingBackend::Ollama
        || config.generation.backend == GenerationBackend::Ollama
    {
        eprintln!();
        eprintln!("{}", style("Ollama Connection").bold().yellow());
        configure_ollama(&mut config.ollama)?;
    }

    eprintln!();
    eprintln!("{}", style("Generation Provider").bold().yellow());
    configure_generation(&mut config)?;

    if config.embedding.backend == EmbeddingBackend::Ollama {
        eprintln!();
        eprintln!("{}", style("Testing configuration...").yellow());

        if test_ollama_connection(&config.ollama) {
            eprintln!("{}", style("✓ Ollama connection successful!").green());
        } else {
            eprintln!(
                "{}",
                style("⚠ Warning: Could not connect to Ollama").yellow()
            );
            eprintln!(
                "You can continue, but make sure Ollama is running before building the index."
            );
        }
    }

    let missing = config.missing_credentials();
    if !missing.is_empty() {
        eprintln!();
        eprintln!(
            "{} {}",
            style("⚠ Set these environment variables before use:").yellow(),
            style(missing.join(", ")).bold()
        );
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding:").bold().yellow());
    eprintln!("  Backend: {}", style(config.embedding.backend).cyan());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Batch Size: {}", style(config.embedding.batch_size).cyan());
    if let Some(dimension) = config.embedding.dimension {
        eprintln!("  Dimension: {}", style(dimension).cyan());
    }
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  OpenAI URL: {}", style(&config.openai.base_url).cyan());

    eprintln!();
    eprintln!("{}", style("Generation:").bold().yellow());
    eprintln!("  Backend: {}", style(config.generation.backend).cyan());
    eprintln!("  Model: {}", style(&config.generation.model).cyan());
    eprintln!(
        "  Segments requested: {}",
        style(config.generation.segment_count).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!(
        "  Default top-k: {} (max {})",
        style(config.retrieval.default_top_k).cyan(),
        config.retrieval.max_top_k
    );
    eprintln!(
        "  Provider timeout: {}s",
        style(config.retrieval.provider_timeout_secs).cyan()
    );
    eprintln!("  Store: {}", style(config.store_dir().display()).cyan());

    eprintln!();
    let missing = config.missing_credentials();
    if missing.is_empty() {
        eprintln!("Credentials: {}", style("Complete").green());
    } else {
        eprintln!(
            "Credentials: {} (missing {})",
            style("Incomplete").red(),
            missing.join(", ")
        );
    }

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load_file(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Config::with_base_dir(config_dir)
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn configure_embedding(config: &mut Config) -> Result<()> {
    let backends = [EmbeddingBackend::Ollama, EmbeddingBackend::OpenAi];
    let default_index = backends
        .iter()
        .position(|&b| b == config.embedding.backend)
        .unwrap_or(0);

    let backend_index = Select::new()
        .with_prompt("Embedding backend")
        .default(default_index)
        .items(&backends)
        .interact()?;
    config.embedding.backend = backends[backend_index];

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(config.embedding.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for index builds")
        .default(config.embedding.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    config.embedding.set_model(model)?;
    config.embedding.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                port: 11434, // Use default port for validation
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;

    Ok(())
}

fn configure_generation(config: &mut Config) -> Result<()> {
    let backends = [
        GenerationBackend::OpenAi,
        GenerationBackend::Ollama,
        GenerationBackend::Disabled,
    ];
    let default_index = backends
        .iter()
        .position(|&b| b == config.generation.backend)
        .unwrap_or(0);

    let backend_index = Select::new()
        .with_prompt("Generation backend")
        .default(default_index)
        .items(&backends)
        .interact()?;
    config.generation.backend = backends[backend_index];

    if config.generation.backend == GenerationBackend::Disabled {
        return Ok(());
    }

    config.generation.model = Input::new()
        .with_prompt("Generation model")
        .default(config.generation.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    config.generation.segment_count = Input::new()
        .with_prompt("Segments to propose")
        .default(config.generation.segment_count)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=20).contains(input) {
                Ok(())
            } else {
                Err("Segment count must be between 1 and 20")
            }
        })
        .interact_text()?;

    Ok(())
}

fn test_ollama_connection(ollama: &OllamaConfig) -> bool {
    let url = format!(
        "{}://{}:{}/api/version",
        ollama.protocol, ollama.host, ollama.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => true,
        Err(_) => false,
    }
}


use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use tracing::info;

use crate::StageWarning;
use crate::config::{Config, EmbeddingBackend};
use crate::embeddings::{OllamaClient, create_provider};
use crate::fusion::{ParsedReport, parse_report, render_ranked_listing, render_report};
use crate::indexer::{Corpus, IndexBuilder};
use crate::pipeline::{GenerateRequest, MatchService, RetrieveRequest};
use crate::store::{StorePaths, read_display_names, read_manifest};

/// Embed a corpus file and replace the store under the configured directory
#[inline]
pub async fn build_index(
    config_dir: &Path,
    input: &Path,
    display_names: Option<&Path>,
) -> Result<()> {
    let config = Config::load(config_dir)?;
    let corpus = Corpus::from_path(input)
        .with_context(|| format!("Failed to read corpus {}", input.display()))?;
    let display_names = match display_names {
        Some(path) => read_display_names(path)?,
        None => Default::default(),
    };

    let embedder = create_provider(&config)?;
    let store_dir = config.store_dir();
    info!("Building segment index into {}", store_dir.display());

    let manifest = IndexBuilder::from_config(&config, embedder)
        .with_progress(true)
        .build_and_persist(corpus, &store_dir, display_names)
        .await?;

    println!("{}", style("✅ Index built").bold().green());
    println!("   Segments:  {}", manifest.count);
    println!("   Dimension: {}", manifest.dimension);
    println!("   Model:     {}", manifest.embedding_model);
    println!("   Location:  {}", store_dir.display());

    Ok(())
}

/// Print the nearest catalog segments for `query`
#[inline]
pub async fn search(
    config_dir: &Path,
    query: String,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let config = Config::load(config_dir)?;
    let service = MatchService::from_config(&config)?;

    let response = service.retrieve(&RetrieveRequest { query, top_k }).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    print_warnings(&response.warnings);
    if response.candidates.is_empty() {
        println!("No matching segments.");
    } else {
        print!("{}", render_ranked_listing(&response.candidates));
    }

    Ok(())
}

/// Retrieve candidates for `brief` and print them with generated segments
#[inline]
pub async fn generate(
    config_dir: &Path,
    brief: String,
    top_k: Option<usize>,
    require_generation: bool,
    json: bool,
) -> Result<()> {
    let config = Config::load(config_dir)?;
    let service = MatchService::from_config(&config)?;

    let request = GenerateRequest {
        brief,
        top_k,
        require_generation,
    };
    let response = service.generate(&request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    print_warnings(&response.warnings);
    print!(
        "{}",
        render_report(&response.candidates, &response.generated_segments)
    );

    Ok(())
}

/// Parse a rendered report from `source` (a path, or `-` for stdin) and print
/// it as JSON
#[inline]
pub fn parse_report_command(source: &str) -> Result<()> {
    let report = read_report(source)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[inline]
pub fn read_report(source: &str) -> Result<ParsedReport> {
    let text = if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read report from stdin")?;
        text
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read report {}", source))?
    };

    Ok(parse_report(&text))
}

/// Show store presence, build metadata and configuration completeness
#[inline]
pub async fn show_status(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir)?;

    println!("📊 Audience Match Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🗄️  Segment Store:");
    let store_dir = config.store_dir();
    let paths = StorePaths::new(&store_dir);
    if paths.is_available() {
        println!("   ✅ Present at {}", store_dir.display());
        match read_manifest(&store_dir) {
            Ok(Some(manifest)) => {
                println!("   📋 Segments: {}", manifest.count);
                println!("   🔢 Dimension: {}", manifest.dimension);
                println!("   🤖 Built with: {}", manifest.embedding_model);
                println!(
                    "   🕒 Built at: {}",
                    manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
                if manifest.embedding_model != config.embedding.model {
                    println!(
                        "   ⚠️  Configured model is {}; rebuild before searching",
                        config.embedding.model
                    );
                }
            }
            Ok(None) => println!("   ⚠️  No manifest recorded"),
            Err(e) => println!("   ❌ Manifest unreadable - {}", e),
        }
    } else {
        println!("   ❌ Not built yet at {}", store_dir.display());
        println!("   Use 'audience-match build --input <corpus.json>' to create it.");
    }
    println!();

    println!("🤖 Providers:");
    println!(
        "   Embedding: {} ({})",
        config.embedding.backend, config.embedding.model
    );
    println!(
        "   Generation: {} ({})",
        config.generation.backend, config.generation.model
    );

    if config.embedding.backend == EmbeddingBackend::Ollama {
        let client = OllamaClient::new(&config)?;
        let base_url = client.base_url().clone();
        match tokio::task::spawn_blocking(move || client.health_check()).await? {
            Ok(()) => println!("   ✅ Ollama: Connected at {}", base_url),
            Err(e) => println!("   ❌ Ollama: {} - {:#}", base_url, e),
        }
    }
    println!();

    let missing = config.missing_credentials();
    if missing.is_empty() {
        println!("🔑 Credentials: ✅ Complete");
    } else {
        println!("🔑 Credentials: ❌ Missing {}", missing.join(", "));
    }

    Ok(())
}

fn print_warnings(warnings: &[StageWarning]) {
    for warning in warnings {
        eprintln!("{} {}", style("⚠").yellow(), warning);
    }
}

use super::load_existing_config as load_existing_config_impl;
use super::*;
use tempfile::TempDir;

#[test]
fn load_existing_config_falls_back_to_defaults() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config = load_existing_config_impl(temp_dir.path());
    assert_eq!(config, Config::with_base_dir(temp_dir.path()));
}

#[test]
fn load_existing_config_reads_saved_file() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let mut saved = Config::with_base_dir(temp_dir.path());
    saved.embedding.batch_size = 16;
    saved.save().expect("config should save");

    let config = load_existing_config_impl(temp_dir.path());
    assert_eq!(config.embedding.batch_size, 16);
}

#[test]
fn unreachable_ollama_reports_failure() {
    let ollama = OllamaConfig {
        protocol: "http".to_string(),
        host: "127.0.0.1".to_string(),
        port: 1,
    };
    assert!(!test_ollama_connection(&ollama));
}

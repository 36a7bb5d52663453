//! Integration tests for ConfigManager and configuration file handling
//!
//! These tests verify:
//! - User config and rule table round trips
//! - Hand-written YAML files in the documented layout
//! - Invalid rule tables are rejected as a whole

use camino::Utf8PathBuf;
use docflow::ConfigManager;
use docflow::models::{ReplacementRule, RuleSet, UserConfig};
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

fn no_environment() -> ::config::Environment {
    ConfigManager::environment().source(Some(HashMap::new()))
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.config_dir(), &config_path);
    assert_eq!(manager.rules_path(), config_path.join("DocFlow Rules.yaml"));
}

#[test]
fn test_user_config_round_trip() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let mut config = UserConfig::default();
    config.settings.max_workers = 3;
    config.settings.key_separator = "_".to_string();
    config.settings.font.family = "Times New Roman".to_string();
    config.settings.font.footer_size_pt = 9.0;
    manager.save_user_config(&config).unwrap();

    let loaded = manager.load_user_config_with(no_environment()).unwrap();

    assert_eq!(loaded.settings.max_workers, 3);
    assert_eq!(loaded.settings.key_separator, "_");
    assert_eq!(loaded.settings.font, config.settings.font);
    assert_eq!(loaded.settings.pool_size(), 3);
}

#[test]
fn test_partial_user_config_keeps_defaults() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    fs::write(
        manager.user_config_path(),
        "settings:\n  font:\n    family: Georgia\n",
    )
    .unwrap();

    let loaded = manager.load_user_config_with(no_environment()).unwrap();

    assert_eq!(loaded.settings.font.family, "Georgia");
    assert_eq!(loaded.settings.font.body_size_pt, 12.0);
    assert_eq!(loaded.settings.conversion_timeout_secs, 120);
    assert_eq!(loaded.settings.soffice_path, "soffice");
}

#[test]
fn test_rules_round_trip_keeps_order() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let mut rules = RuleSet::new();
    rules.add(ReplacementRule::new("2024", "2025").unwrap()).unwrap();
    rules.add(ReplacementRule::new("Draft ", "").unwrap()).unwrap();
    manager.save_rules(&rules).unwrap();

    let loaded = manager.load_rules().unwrap();
    assert_eq!(loaded, rules);
    assert_eq!(loaded.apply("Draft Report 2024.docx"), "Report 2025.docx");
}

#[test]
fn test_hand_written_rules_file() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    fs::write(
        manager.rules_path(),
        "rules:\n  - old_text: January\n    new_text: February\n  - old_text: Acme\n    new_text: Globex\n",
    )
    .unwrap();

    let rules = manager.load_rules().unwrap();

    assert_eq!(rules.len(), 2);
    assert_eq!(rules.apply("Acme January.docx"), "Globex February.docx");
}

#[test]
fn test_rules_file_with_empty_old_text_is_rejected() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    fs::write(
        manager.rules_path(),
        "rules:\n  - old_text: ''\n    new_text: x\n",
    )
    .unwrap();

    let err = manager.load_rules().unwrap_err();
    assert!(format!("{err:#}").contains("empty old text"));
}

#[test]
fn test_rules_file_with_duplicates_is_rejected() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    fs::write(
        manager.rules_path(),
        "rules:\n  - old_text: a\n    new_text: b\n  - old_text: a\n    new_text: b\n",
    )
    .unwrap();

    assert!(manager.load_rules().is_err());
}

// Tests for the command-line handlers

use std::io::Write;
use tempfile::{NamedTempFile, TempDir};
use vlscout::command_argument_builder;
use vlscout::commands::ListArg;
use vlscout::handlers::*;
use vlscout_core::{ScoutConfig, Tag};

fn sub_matches(args: &[&str]) -> clap::ArgMatches {
    let matches = command_argument_builder()
        .try_get_matches_from(args)
        .unwrap();
    let (_, sub) = matches.subcommand().unwrap();
    sub.clone()
}

// ============================================================================
// Seed loading
// ============================================================================

#[test]
fn test_parse_url_line_with_scheme() {
    let result = parse_url_line("https://example.com/sub.txt");
    assert_eq!(result, Some("https://example.com/sub.txt".to_string()));
}

#[test]
fn test_parse_url_line_without_scheme() {
    let result = parse_url_line("raw.githubusercontent.com/o/r/main/sub.txt");
    assert_eq!(
        result,
        Some("https://raw.githubusercontent.com/o/r/main/sub.txt".to_string())
    );
}

#[test]
fn test_parse_url_line_skips_comments_and_junk() {
    assert_eq!(parse_url_line("# mirrors"), None);
    assert_eq!(parse_url_line("   "), None);
    assert_eq!(parse_url_line("not a valid url!!!"), None);
}

#[test]
fn test_load_urls_from_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut temp_file = NamedTempFile::new()?;
    writeln!(temp_file, "# seeds")?;
    writeln!(temp_file, "https://example.com/a.txt")?;
    writeln!(temp_file)?;
    writeln!(temp_file, "example.org/b.txt")?;

    let urls = load_urls_from_file(temp_file.path())?;

    assert_eq!(
        urls,
        vec!["https://example.com/a.txt", "https://example.org/b.txt"]
    );
    Ok(())
}

#[test]
fn test_load_urls_from_file_empty() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "# only a comment").unwrap();
    writeln!(temp_file, "   ").unwrap();

    let result = load_urls_from_file(temp_file.path());
    assert!(result.unwrap_err().contains("No valid URLs"));
}

#[test]
fn test_load_urls_from_missing_file() {
    let result = load_urls_from_file(std::path::Path::new("/nonexistent/seeds.txt"));
    assert!(result.unwrap_err().contains("Failed to read seeds file"));
}

#[test]
fn test_parse_token_list() {
    assert_eq!(parse_token_list("ghp_a, ghp_b,,  "), vec!["ghp_a", "ghp_b"]);
    assert!(parse_token_list("").is_empty());
}

// ============================================================================
// Command line
// ============================================================================

#[test]
fn test_subcommand_is_required() {
    assert!(command_argument_builder()
        .try_get_matches_from(["vlscout"])
        .is_err());
}

#[test]
fn test_prune_rejects_unknown_list() {
    assert!(command_argument_builder()
        .try_get_matches_from(["vlscout", "prune", "trash"])
        .is_err());
    let sub = sub_matches(&["vlscout", "prune"]);
    assert_eq!(sub.get_one::<ListArg>("TAG"), Some(&ListArg::Global));
    let sub = sub_matches(&["vlscout", "prune", "ru"]);
    assert_eq!(Tag::from(*sub.get_one::<ListArg>("TAG").unwrap()), Tag::Ru);
}

#[test]
fn test_build_config_defaults() {
    let sub = sub_matches(&["vlscout", "crawl", "-u", "https://example.com/a.txt"]);
    let config = build_config(&sub).unwrap();
    let defaults = ScoutConfig::default();

    assert_eq!(config.workers, defaults.workers);
    assert_eq!(config.oracle_concurrency, 2);
    assert_eq!(config.classifier.max_recursion_depth, 1);
}

#[test]
fn test_build_config_flags_override_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{"workers": 8, "classifier": {{"aggregator_threshold": 5}}}}"#).unwrap();
    let path = file.path().to_string_lossy().into_owned();

    let sub = sub_matches(&[
        "vlscout",
        "hunt",
        "--config",
        &path,
        "--threads",
        "4",
        "--max-depth",
        "2",
        "--timeout",
        "3",
    ]);
    let config = build_config(&sub).unwrap();

    assert_eq!(config.workers, 4);
    assert_eq!(config.classifier.max_recursion_depth, 2);
    assert_eq!(config.classifier.aggregator_threshold, 5);
    assert_eq!(config.fetcher.timeout_secs, 3);
}

#[test]
fn test_build_config_rejects_oracle_above_workers() {
    let sub = sub_matches(&[
        "vlscout",
        "crawl",
        "--threads",
        "2",
        "--oracle-concurrency",
        "3",
    ]);
    assert!(build_config(&sub).is_err());
}

#[test]
fn test_build_oracle_without_token_is_disabled() {
    let config = ScoutConfig::default();
    assert_eq!(build_oracle(&config, None).unwrap().oracle_name(), "disabled");
    assert_eq!(
        build_oracle(&config, Some("  ".to_string())).unwrap().oracle_name(),
        "disabled"
    );
}

#[test]
fn test_output_dir_is_created() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("lists").join("nested");
    let target_str = target.to_string_lossy().into_owned();

    let sub = sub_matches(&["vlscout", "prune", "--output-dir", &target_str]);
    let resolved = output_dir(&sub).unwrap();

    assert_eq!(resolved, target);
    assert!(target.is_dir());
}

// ============================================================================
// Handlers
// ============================================================================

#[tokio::test]
async fn test_crawl_requires_seeds() {
    let sub = sub_matches(&["vlscout", "crawl"]);
    let err = handle_crawl(&sub).await.unwrap_err();
    assert!(err.to_string().contains("--url or --seeds-file"));
}

#[tokio::test]
async fn test_prune_of_empty_list_leaves_directory_clean() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().to_string_lossy().into_owned();

    let sub = sub_matches(&["vlscout", "prune", "ru", "--quiet", "--output-dir", &out]);
    handle_prune(&sub).await.unwrap();

    assert!(!dir.path().join("verified_ru.txt").exists());
}

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use xvalid::cache::SchemaCache;
use xvalid::cli::{Cli, VerbosityLevel};
use xvalid::config::ConfigManager;
use xvalid::diagnostics::{ExitStatus, overall_exit_status};
use xvalid::engine::{ProgressCallback, ValidationEngine, ValidationPhase, ValidationProgress};
use xvalid::error_reporter::ErrorReporter;
use xvalid::file_discovery::FileDiscovery;
use xvalid::output::Output;

#[tokio::main]
async fn main() {
    let status = match run().await {
        Ok(status) => status,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitStatus::CommandError
        }
    };
    std::process::exit(status.code());
}

async fn run() -> anyhow::Result<ExitStatus> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are not failures
            let status = if e.use_stderr() {
                ExitStatus::CommandError
            } else {
                ExitStatus::Success
            };
            e.print().context("failed to print usage")?;
            return Ok(status);
        }
    };

    let config = match ConfigManager::load_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            ErrorReporter::new(VerbosityLevel::Normal).report_config_error(&e);
            return Ok(ExitStatus::CommandError);
        }
    };
    let reporter = Arc::new(ErrorReporter::with_options(
        config.verbosity(),
        config.output.timestamps,
    ));

    let discovery = FileDiscovery::new()
        .with_extensions(config.files.extensions.clone())
        .with_max_depth(config.files.max_depth)
        .with_follow_symlinks(config.files.follow_symlinks)
        .with_include_patterns(config.files.include_patterns.clone())
        .and_then(|d| d.with_exclude_patterns(config.files.exclude_patterns.clone()));
    let discovery = match discovery {
        Ok(discovery) => discovery,
        Err(e) => {
            reporter.report_error(&e);
            return Ok(ExitStatus::CommandError);
        }
    };

    let files = match discovery.expand_paths(&cli.paths).await {
        Ok(files) => files,
        Err(e) => {
            reporter.report_error(&e);
            return Ok(ExitStatus::IoError);
        }
    };
    if files.is_empty() {
        reporter.report_warning("no files with a matching extension were found");
    }

    let cache = Arc::new(SchemaCache::new(config.cache.clone()));
    let engine = ValidationEngine::new(cache, cli.schema_source(), config.validation.clone());

    let progress_reporter = Arc::clone(&reporter);
    let progress: ProgressCallback =
        Arc::new(move |progress: ValidationProgress| match progress.phase {
            ValidationPhase::Processing => {
                progress_reporter.report_processing(&progress.current_file)
            }
            ValidationPhase::Finished(result) => progress_reporter.report_result(&result),
        });

    let results = engine
        .validate_files_with_progress(&files, Some(progress))
        .await;
    reporter.report_cache_stats(&engine.cache().stats().await);

    let output = Output::new(config.verbosity()).with_format(config.output.format);
    print!("{}", output.format_results(&results));

    Ok(overall_exit_status(&results))
}

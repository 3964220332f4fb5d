use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use docsalvage_core::analysis::{analyze, AnalysisOptions};
use docsalvage_core::recovery::{recover_batch_with, BatchReport};
use docsalvage_core::{
	extract_stream_file, is_supported_input, InputImage, RecoveryConfig, RecoveryEngine,
	RecoveryResult, DEFAULT_STREAM_NAME,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(name = "docsalvage", version, about = "Recover members from damaged compound document archives")]
struct Cli {
	/// Debug logging
	#[arg(short, long, global = true)]
	verbose: bool,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Recover archive members from a file or every archive under a directory
	Recover {
		/// Archive file or directory of archives
		input: PathBuf,
		/// Output directory (default: <input dir>/recovered/<stem>)
		#[arg(short, long)]
		output: Option<PathBuf>,
		/// Compound-file stream holding the compressed archive
		#[arg(long)]
		stream_name: Option<String>,
		/// JSON configuration file
		#[arg(long)]
		config: Option<PathBuf>,
		/// Worker threads for directory input
		#[arg(long)]
		threads: Option<usize>,
		/// Re-hash written members after recovery
		#[arg(long)]
		verify: bool,
		/// Print the result as JSON
		#[arg(long)]
		json: bool,
	},
	/// Save the raw named stream of each input for offline analysis
	ExtractStream {
		/// Archive files
		#[arg(required = true)]
		inputs: Vec<PathBuf>,
		/// Output directory
		#[arg(short, long, default_value = "extracted_streams")]
		output: PathBuf,
		#[arg(long, default_value = DEFAULT_STREAM_NAME)]
		stream_name: String,
	},
	/// Byte-level analysis of one archive
	Analyze {
		input: PathBuf,
		/// Known-good file to compare against
		#[arg(long)]
		reference: Option<PathBuf>,
		#[arg(long, default_value = DEFAULT_STREAM_NAME)]
		stream_name: String,
		/// Print the report as JSON
		#[arg(long)]
		json: bool,
	},
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	let directive = if cli.verbose { "docsalvage=debug" } else { "docsalvage=info" };
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
		.with_writer(std::io::stderr)
		.init();

	match cli.command {
		Commands::Recover { input, output, stream_name, config, threads, verify, json } => {
			let mut config = match config {
				Some(path) => RecoveryConfig::from_json_file(&path)?,
				None => RecoveryConfig::default(),
			};
			if let Some(name) = stream_name {
				config.stream_name = name;
			}
			if threads.is_some() {
				config.threads = threads;
			}

			if input.is_dir() {
				recover_directory(&input, output, config, verify, json)
			} else {
				recover_single(&input, output.as_deref(), config, verify, json)
			}
		}
		Commands::ExtractStream { inputs, output, stream_name } => {
			let mut extracted = 0usize;
			for input in &inputs {
				println!("🔍 Extracting {} from {}", stream_name, input.display());
				match extract_stream_file(input, &output, &stream_name) {
					Ok(Some((path, stream))) => {
						extracted += 1;
						println!("💾 {} ({} bytes, {:?})", path.display(), stream.data.len(), stream.source);
					}
					Ok(None) => println!("❌ Stream not found"),
					Err(e) => eprintln!("❌ {:#}", e),
				}
			}
			println!("📊 Extracted {}/{} streams into {}", extracted, inputs.len(), output.display());
			if extracted == 0 {
				bail!("no streams extracted");
			}
			Ok(())
		}
		Commands::Analyze { input, reference, stream_name, json } => {
			let image = InputImage::open(&input)
				.with_context(|| format!("Failed to open {}", input.display()))?;
			let options = AnalysisOptions { stream_name, ..AnalysisOptions::default() };
			let mut report = analyze(&image, &options);

			if let Some(reference) = reference {
				let reference_image = InputImage::open(&reference)
					.with_context(|| format!("Failed to open {}", reference.display()))?;
				report.compare_with(&image, &reference_image);
			}

			if json {
				println!("{}", report.to_json()?);
			} else {
				println!("📋 Analysis of {}", input.display());
				println!("{}", report.render_text());
			}
			Ok(())
		}
	}
}

fn recover_single(
	input: &Path,
	output: Option<&Path>,
	config: RecoveryConfig,
	verify: bool,
	json: bool,
) -> Result<()> {
	let spinner = ProgressBar::new_spinner();
	spinner.enable_steady_tick(Duration::from_millis(100));

	let mut engine = RecoveryEngine::new(config);
	let progress = spinner.clone();
	engine.set_progress_callback(move |p| progress.set_message(p.current_operation));

	let result = engine.recover_file(input, output);
	spinner.finish_and_clear();
	let result = result?;

	if json {
		println!("{}", result.to_json()?);
	} else {
		print_result(&result);
	}
	if verify {
		print_verification(&result);
	}

	if !result.success {
		bail!("no recoverable data in {}", input.display());
	}
	Ok(())
}

fn recover_directory(
	dir: &Path,
	output: Option<PathBuf>,
	config: RecoveryConfig,
	verify: bool,
	json: bool,
) -> Result<()> {
	let mut paths: Vec<PathBuf> = WalkDir::new(dir)
		.into_iter()
		.filter_map(|entry| entry.ok())
		.filter(|entry| entry.file_type().is_file() && is_supported_input(entry.path()))
		.map(|entry| entry.into_path())
		.collect();
	paths.sort();

	if paths.is_empty() {
		bail!("no supported archives under {}", dir.display());
	}

	let output_root = output.unwrap_or_else(|| dir.join("recovered"));
	println!("🔍 Found {} archives, recovering into {}", paths.len(), output_root.display());

	let pb = ProgressBar::new(paths.len() as u64);
	pb.set_style(
		ProgressStyle::default_bar()
			.template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} | {msg}")?
			.progress_chars("=>-"),
	);
	pb.enable_steady_tick(Duration::from_millis(100));

	let engine = RecoveryEngine::new(config);
	let report = recover_batch_with(&engine, &paths, &output_root, |item| {
		let name = item
			.input
			.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.unwrap_or_default();
		pb.set_message(name);
		pb.inc(1);
	});
	pb.finish_and_clear();

	if json {
		println!("{}", report.to_json()?);
	} else {
		print_batch(&report);
	}
	if verify {
		for result in report.items.iter().filter_map(|item| item.result.as_ref()) {
			print_verification(result);
		}
	}

	if report.statistics.files_extracted == 0 {
		bail!("no archives recovered");
	}
	Ok(())
}

fn print_result(result: &RecoveryResult) {
	let stats = &result.statistics;
	if result.success {
		println!("✅ Recovery completed");
	} else {
		println!("❌ No recoverable data");
	}
	println!("📊 Run ID: {}", result.run_id);
	if let Some(strategy) = result.strategy {
		println!("🎯 Strategy: {}", strategy);
	}
	println!("📁 Output: {}", result.output_dir.display());
	println!("📈 Members Extracted: {}", stats.members_extracted);
	println!("💾 Bytes Written: {}", stats.total_size_out);
	if stats.checksum_errors > 0 || stats.checksum_warnings > 0 {
		println!(
			"⚠️  Checksum errors: {}, warnings: {}",
			stats.checksum_errors, stats.checksum_warnings
		);
	}
	if !result.issues.is_empty() {
		println!("📝 {} issue(s) logged", result.issues.len());
	}
	println!("⏱️  {} ms", result.duration_ms());
}

fn print_batch(report: &BatchReport) {
	for item in &report.items {
		match (&item.result, &item.error) {
			(Some(result), _) if result.success => println!(
				"✅ {} -> {} member(s)",
				item.input.display(),
				result.members.len()
			),
			(Some(_), _) => println!("❌ {} -> no recoverable data", item.input.display()),
			(None, Some(error)) => println!("❌ {} -> {}", item.input.display(), error),
			(None, None) => {}
		}
	}

	let stats = &report.statistics;
	println!();
	println!("📊 Processed: {}", stats.files_processed);
	println!("✅ Extracted: {}", stats.files_extracted);
	println!("❌ Failed: {}", stats.files_failed);
	println!("📈 Members: {}", stats.members_extracted);
	println!("⚠️  Checksum errors: {}", stats.checksum_errors);
	println!("🎯 Success rate: {:.1}%", stats.success_rate() * 100.0);
}

fn print_verification(result: &RecoveryResult) {
	let verification = result.verify_members();
	let summary = &verification.summary;
	println!(
		"🔒 {}: {}/{} verified, {} corrupted, {} missing",
		result.output_dir.display(),
		summary.verified,
		summary.total_files,
		summary.corrupted,
		summary.missing
	);
}

#[cfg(test)]
mod tests {
	use super::*;
	use docsalvage_core::recovery::default_output_dir;

	#[test]
	fn test_cli_parses_recover() {
		let cli = Cli::parse_from(["docsalvage", "recover", "in.ac_", "-o", "out", "--verify"]);
		match cli.command {
			Commands::Recover { input, output, verify, .. } => {
				assert_eq!(input, PathBuf::from("in.ac_"));
				assert_eq!(output, Some(PathBuf::from("out")));
				assert!(verify);
			}
			_ => panic!("expected recover"),
		}
	}

	#[test]
	fn test_default_output_matches_core() {
		assert_eq!(
			default_output_dir(Path::new("/data/a.ac_")),
			PathBuf::from("/data/recovered/a")
		);
	}
}

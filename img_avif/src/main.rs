use anyhow::Context;
use avif_core::config::default_config_path;
use avif_core::error_handler::{handle_error, install_panic_handler, report_error, ErrorAction};
use avif_core::logging::{init_logging, LogConfig};
use avif_core::tools::{locate_ffmpeg, locate_ffprobe, tool_version};
use avif_core::{
    expand_inputs, print_record_table, print_summary_report, BatchProgress, ConversionEngine,
    ConversionObserver, EngineParts, NoopObserver, Settings,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "img-avif")]
#[command(version, about = "Batch image to AVIF converter (ffmpeg, GPU with CPU fallback)", long_about = None)]
struct Cli {
    /// Settings file (default: ./avif_config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert images to AVIF
    Run {
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long)]
        recursive: bool,

        #[command(flatten)]
        overrides: SettingsOverrides,

        /// Persist the effective settings before running
        #[arg(long)]
        save_config: bool,

        /// Print final records as JSON instead of the progress bar and report
        #[arg(long)]
        json: bool,
    },

    /// Show image resolutions via ffprobe
    Probe {
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long)]
        recursive: bool,

        #[arg(long, default_value_t = 0)]
        probe_threads: usize,

        #[arg(short, long, value_enum, default_value = "human")]
        output: OutputFormat,
    },

    /// Show or save settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print effective settings and detected tools
    Show {
        #[command(flatten)]
        overrides: SettingsOverrides,
    },
    /// Write settings (defaults plus overrides) to the config file
    Save {
        #[command(flatten)]
        overrides: SettingsOverrides,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

/// Flags layered over the settings file.
#[derive(Args, Default, Clone)]
struct SettingsOverrides {
    /// Quality (0-63, lower is better)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Encoder speed / cpu-used (0-9)
    #[arg(short, long)]
    speed: Option<u8>,

    /// Conversion workers (0 = auto)
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Resolution probe workers (0 = auto)
    #[arg(long)]
    probe_threads: Option<usize>,

    /// Skip the GPU encoder
    #[arg(long)]
    cpu: bool,

    /// Scale images wider than 7680
    #[arg(long)]
    auto_scale: bool,

    /// Do not scale images taller than 6000
    #[arg(long)]
    no_height_limit: bool,

    /// Delete originals after a successful conversion
    #[arg(long, conflicts_with = "keep_original")]
    delete_original: bool,

    #[arg(long)]
    keep_original: bool,

    /// Delete permanently instead of using the recycle bin
    #[arg(long)]
    no_trash: bool,

    /// Keep outputs even when they are not smaller
    #[arg(long)]
    keep_larger: bool,

    /// Write outputs here instead of next to the inputs
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

impl SettingsOverrides {
    fn apply(&self, mut s: Settings) -> Settings {
        if let Some(q) = self.quality {
            s.quality = q;
        }
        if let Some(sp) = self.speed {
            s.speed = sp;
        }
        if let Some(t) = self.threads {
            s.max_threads = t;
        }
        if let Some(t) = self.probe_threads {
            s.resolution_threads = t;
        }
        if self.cpu {
            s.use_gpu = false;
        }
        if self.auto_scale {
            s.auto_scale = true;
        }
        if self.no_height_limit {
            s.height_limit = false;
        }
        if self.delete_original {
            s.delete_original_after_compress = true;
        }
        if self.keep_original {
            s.delete_original_after_compress = false;
        }
        if self.no_trash {
            s.delete_to_recycle_bin = false;
        }
        if self.keep_larger {
            s.skip_larger = false;
        }
        if let Some(dir) = &self.output_dir {
            s.output_dir = Some(dir.clone());
            s.overwrite_in_place = false;
        }
        s
    }
}

fn main() -> anyhow::Result<()> {
    install_panic_handler();
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::default()
            .with_level(tracing::Level::DEBUG)
            .with_stderr_level(tracing::Level::INFO)
    } else {
        LogConfig::default()
    };
    if let Err(e) = init_logging("img_avif", log_config) {
        eprintln!("⚠️  File logging disabled: {:#}", e);
    }

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let settings = Settings::load(&config_path);

    let result = match cli.command {
        Commands::Run {
            inputs,
            recursive,
            overrides,
            save_config,
            json,
        } => run(overrides.apply(settings), &config_path, &inputs, recursive, save_config, json),
        Commands::Probe {
            inputs,
            recursive,
            probe_threads,
            output,
        } => probe(settings, &inputs, recursive, probe_threads, output),
        Commands::Config { action } => match action {
            ConfigAction::Show { overrides } => show_config(&overrides.apply(settings), &config_path),
            ConfigAction::Save { overrides } => {
                let s = overrides.apply(settings);
                s.save(&config_path)
                    .with_context(|| format!("Failed to save {}", config_path.display()))?;
                println!("✅ Saved settings to {}", config_path.display());
                Ok(())
            }
        },
    };

    if let Err(e) = result {
        let err: &(dyn std::error::Error + 'static) = e.as_ref();
        report_error(err);
        std::process::exit(1);
    }
    Ok(())
}

fn run(
    settings: Settings,
    config_path: &Path,
    inputs: &[PathBuf],
    recursive: bool,
    save_config: bool,
    json: bool,
) -> anyhow::Result<()> {
    if save_config {
        if let Err(e) = settings.save(config_path) {
            let category = e.category();
            if let ErrorAction::Abort(err) = handle_error(category, "saving settings", e) {
                return Err(err);
            }
        }
    }

    let progress = Arc::new(if json {
        BatchProgress::hidden()
    } else {
        BatchProgress::new("AVIF")
    });
    let observer: Arc<dyn ConversionObserver> = progress.clone();
    let parts = EngineParts::system(&settings).with_observer(observer);
    let engine = ConversionEngine::new(settings, parts).context("Failed to start engine")?;

    let files = expand_inputs(inputs, recursive);
    let report = engine.add_paths(&files)?;
    if !json && report.total_rejected() > 0 {
        progress.println(&format!(
            "{} {} duplicate, {} unsupported, {} missing",
            style("⚠️  Skipped inputs:").yellow(),
            report.duplicates,
            report.unsupported,
            report.missing
        ));
    }

    let stop_flag = engine.context().stop_flag();
    ctrlc::set_handler(move || {
        stop_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl-C handler")?;

    let summary = engine.start().context("Conversion run failed")?;

    if json {
        let out = json!({
            "summary": summary,
            "records": engine.snapshot(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_summary_report(&summary, &engine.snapshot());
    }

    // cancelled tasks are not failures; Ctrl-C alone exits 0
    if summary.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn probe(
    settings: Settings,
    inputs: &[PathBuf],
    recursive: bool,
    probe_threads: usize,
    output: OutputFormat,
) -> anyhow::Result<()> {
    if locate_ffprobe().is_none() {
        anyhow::bail!(avif_core::ConvertError::ToolNotFound("ffprobe".to_string()));
    }
    let settings = Settings {
        resolution_threads: probe_threads,
        ..settings
    };
    let parts = EngineParts::system(&settings).with_observer(Arc::new(NoopObserver));
    let engine = ConversionEngine::new(settings, parts)?;

    let spinner = (output == OutputFormat::Human).then(|| avif_core::progress::create_spinner("Probing"));
    engine.add_paths(expand_inputs(inputs, recursive))?;
    let rounds = engine.queue().len().div_ceil(engine.probe_pool().size()).max(1);
    let timeout = engine.settings().probe_timeout() * rounds as u32;
    if !engine.probe_pool().wait_idle(timeout + Duration::from_secs(1)) {
        tracing::warn!("Some probes did not finish in time");
    }
    if let Some(s) = spinner {
        s.finish_and_clear();
    }

    let records = engine.snapshot();
    match output {
        OutputFormat::Human => print_record_table(&records),
        OutputFormat::Json => {
            let rows: Vec<_> = records
                .iter()
                .map(|r| {
                    json!({
                        "path": r.path,
                        "width": r.width,
                        "height": r.height,
                        "size": r.original_size,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}

fn show_config(settings: &Settings, config_path: &Path) -> anyhow::Result<()> {
    println!("{} {}", style("Config file:").cyan(), config_path.display());
    println!("{}", serde_json::to_string_pretty(settings)?);
    println!();
    for (name, found) in [("ffmpeg", locate_ffmpeg()), ("ffprobe", locate_ffprobe())] {
        match found {
            Some(path) => {
                let version = tool_version(&path).unwrap_or_else(|| "unknown version".to_string());
                println!("{} {} ({})", style("✅").green(), path.display(), version);
            }
            None => println!("{} {} not found", style("❌").red(), name),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_layer_over_settings() {
        let o = SettingsOverrides {
            quality: Some(40),
            cpu: true,
            keep_original: true,
            output_dir: Some(PathBuf::from("out")),
            ..SettingsOverrides::default()
        };
        let s = o.apply(Settings::default());
        assert_eq!(s.quality, 40);
        assert_eq!(s.speed, 5);
        assert!(!s.use_gpu);
        assert!(!s.delete_original_after_compress);
        assert!(!s.overwrite_in_place);
        assert_eq!(s.output_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_no_overrides_is_identity() {
        let s = Settings::default();
        assert_eq!(SettingsOverrides::default().apply(s.clone()), s);
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "img-avif", "run", "a.png", "dir", "-r", "--cpu", "-q", "30", "--no-trash",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                inputs,
                recursive,
                overrides,
                ..
            } => {
                assert_eq!(inputs.len(), 2);
                assert!(recursive);
                assert!(overrides.cpu);
                assert!(overrides.no_trash);
                assert_eq!(overrides.quality, Some(30));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_delete_flags_conflict() {
        assert!(Cli::try_parse_from([
            "img-avif",
            "run",
            "a.png",
            "--delete-original",
            "--keep-original"
        ])
        .is_err());
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

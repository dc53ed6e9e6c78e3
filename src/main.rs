mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;

use cli::{BatchArgs, ChartExportArgs, Cli, Command, StemChartArgs, StemExportArgs};
use stemchart::chart::stemstation::{build_stem_chart, StemChartRequest};
use stemchart::config::{self, Config};
use stemchart::pipeline::{collect_inputs, run_batch, track_id_for};
use stemchart::{BatchReport, CancelToken, ChartJob, OutputDirs, Pipeline, StemJob};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();

    if cli.verbose && cli.quiet {
        anyhow::bail!("Cannot specify both --verbose and --quiet");
    }

    let mut config = match config::discover_config_path(cli.config.as_deref()) {
        Some(path) => {
            let cfg = config::load_config(&path)?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => Config::default(),
    };

    let report = match cli.command {
        Command::ChartExport(args) => {
            apply_batch_overrides(&mut config, &args.batch);
            if let Some(ref dir) = args.charts_dir {
                config.chart.charts_dir = dir.clone();
            }
            chart_export(config, args, cli.quiet)?
        }
        Command::StemExport(args) => {
            apply_batch_overrides(&mut config, &args.batch);
            stem_export(config, args, cli.quiet)?
        }
        Command::StemChart(args) => return stem_chart(args),
        Command::ShowConfig => {
            config.validate()?;
            print!("{}", toml::to_string_pretty(&config)?);
            return Ok(());
        }
    };

    report.log_summary();
    if !report.is_success() {
        anyhow::bail!(
            "{} of {} files failed",
            report.outcomes.len() - report.succeeded(),
            report.outcomes.len()
        );
    }
    Ok(())
}

/// CLI flags win over the config file.
fn apply_batch_overrides(config: &mut Config, batch: &BatchArgs) {
    if let Some(decoder) = batch.decoder {
        config.audio.decoder = decoder.into();
    }
    if let Some(ref dir) = batch.midi_dir {
        config.midi.midi_dir = dir.clone();
    }
}

/// The pipeline is built before inputs are scanned so a bad config or a missing
/// decoder fails even when there is nothing to process.
fn chart_export(config: Config, args: ChartExportArgs, quiet: bool) -> Result<BatchReport> {
    let pipeline = Pipeline::from_config(config)?;

    let from_directory = args.input.is_dir();
    let inputs = if args.from_midi {
        if !args.input.is_file() {
            anyhow::bail!("--from-midi expects a MIDI file: {}", args.input.display());
        }
        vec![args.input.clone()]
    } else {
        collect_inputs(&args.input)?
    };
    if inputs.is_empty() {
        return Ok(BatchReport::default());
    }

    let dirs = OutputDirs {
        charts_dir: pipeline.config().chart.charts_dir.clone(),
        midi_dir: pipeline.config().midi.midi_dir.clone(),
    };
    log::info!(
        "chart-export: {} file(s), difficulty {}, offset {}ms, seed {}",
        inputs.len(),
        args.difficulty,
        args.offset_ms,
        args.seed
    );

    let cancel = CancelToken::new();
    let report = run_batch(&inputs, args.batch.jobs, &cancel, !quiet, |input: &Path| {
        let job = ChartJob {
            track_id: track_id_for(&args.track_id, input, from_directory),
            difficulty: args.difficulty,
            offset_ms: args.offset_ms,
            bpm: args.batch.bpm,
            seed: args.seed,
            title: if from_directory { None } else { args.title.clone() },
            artist: args.artist.clone(),
        };
        if args.from_midi {
            pipeline.chart_from_midi(input, &job, &dirs)
        } else {
            pipeline.chart_export(input, &job, &dirs)
        }
    })?;
    Ok(report)
}

fn stem_export(config: Config, args: StemExportArgs, quiet: bool) -> Result<BatchReport> {
    let pipeline = Pipeline::from_config(config)?;

    let from_directory = args.input.is_dir();
    let inputs = collect_inputs(&args.input)?;
    if inputs.is_empty() {
        return Ok(BatchReport::default());
    }

    let midi_dir = pipeline.config().midi.midi_dir.clone();
    log::info!("stem-export: {} file(s) -> {}", inputs.len(), midi_dir.display());

    let cancel = CancelToken::new();
    let report = run_batch(&inputs, args.batch.jobs, &cancel, !quiet, |input: &Path| {
        let job = StemJob {
            track_id: track_id_for(&args.track_id, input, from_directory),
            bpm: args.batch.bpm,
            combined: args.combined,
        };
        pipeline.stem_export(input, &job, &midi_dir)
    })?;
    Ok(report)
}

fn stem_chart(args: StemChartArgs) -> Result<()> {
    let chart = build_stem_chart(&StemChartRequest {
        track_id: &args.track_id,
        song_name: &args.song_name,
        artist: &args.artist,
        bpm: args.bpm,
        midi_dir: &args.midi_dir,
    })?;
    stemchart::output::write_json(&args.output, &chart)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    log::info!("Wrote chart JSON: {}", args.output.display());
    Ok(())
}

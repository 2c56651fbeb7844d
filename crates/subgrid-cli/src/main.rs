//! Subgrid CLI
//!
//! Headless front-end for the caption grid engine: slice caption files,
//! regrid them, fold voice-activity segments into an exportable track and
//! write the voice timeline itself.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use subgrid_core::core::{
    captions::{ExportSelection, MergePriority, TimingMode},
    project::EditSession,
    regrid::GridLayout,
    settings::{EditorSettings, SettingsManager},
    timegrid,
    tracks::{AutoPreset, AutoSegment},
    GlobalInterval, MediaInfo, Ms, AUTO_TRACK, TRACK_COUNT,
};

/// Subgrid command line
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (JSON); defaults are used when missing
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import a caption file into a track and export a time window of it
    Slice {
        /// Caption file to import
        input: PathBuf,
        /// Track to import into and export from (0-4)
        #[arg(long, default_value_t = 1)]
        track: usize,
        /// Window start (ms or HH:MM:SS,mmm)
        #[arg(long, value_parser = parse_time, default_value = "0")]
        from: Ms,
        /// Window end, inclusive (ms or HH:MM:SS,mmm); defaults to the end
        #[arg(long, value_parser = parse_time)]
        to: Option<Ms>,
        /// Offset added to every exported timestamp
        #[arg(long, value_parser = parse_time)]
        offset: Option<Ms>,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import a caption file and print its layout on another interval
    Grid {
        /// Caption file to import
        input: PathBuf,
        /// Interval to regrid to, in milliseconds
        #[arg(long)]
        interval: u64,
        /// Track to import into (0-4)
        #[arg(long, default_value_t = 1)]
        track: usize,
        /// Print the layout as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fold voice-activity segments into track 0 and export it
    Auto {
        /// JSON file of `[[start_ms, end_ms], ...]`
        segments: PathBuf,
        /// Text placed in every segment (defaults to the settings preset)
        #[arg(long)]
        text: Option<String>,
        /// One span per segment (true) or one per grid cell (false)
        #[arg(long)]
        merge: Option<bool>,
        /// Interval used for per-cell spans, in milliseconds
        #[arg(long)]
        interval: Option<u64>,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write detected voice segments as a timeline cue file
    Marks {
        /// JSON file of `[[start_ms, end_ms], ...]`
        segments: PathBuf,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
        /// Window start (ms or HH:MM:SS,mmm)
        #[arg(long, value_parser = parse_time, default_value = "0")]
        from: Ms,
        /// Window end, exclusive (ms or HH:MM:SS,mmm); defaults to the last segment end
        #[arg(long, value_parser = parse_time)]
        to: Option<Ms>,
        /// Write media time instead of time relative to the window start
        #[arg(long)]
        absolute: bool,
        /// Offset added to every timestamp
        #[arg(long, value_parser = parse_time)]
        offset: Option<Ms>,
        /// Drop segments this long or shorter (0 keeps all)
        #[arg(long)]
        max_ignore: Option<Ms>,
        /// Join segments separated by this gap or less (0 joins none)
        #[arg(long)]
        max_merge: Option<Ms>,
        /// Rule applied first when a segment is both short and close
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        /// Cue text
        #[arg(long)]
        text: Option<String>,
        /// Also write `<name>.unnumbered.<ext>` without cue numbers
        #[arg(long)]
        unnumbered: bool,
    },

    /// Print the default settings as JSON
    PrintDefaultSettings,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Priority {
    Merge,
    Ignore,
}

impl From<Priority> for MergePriority {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::Merge => MergePriority::Merge,
            Priority::Ignore => MergePriority::Ignore,
        }
    }
}

fn parse_time(value: &str) -> Result<Ms, String> {
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse().map_err(|e| format!("{e}"));
    }
    timegrid::timestamp_to_ms(value).map_err(|e| e.to_string())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_settings(path: Option<&Path>) -> EditorSettings {
    match path {
        Some(path) => SettingsManager::with_file(path.to_path_buf()).load(),
        None => EditorSettings::default(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    let settings = load_settings(cli.settings.as_deref());

    match cli.command {
        Commands::Slice {
            input,
            track,
            from,
            to,
            offset,
            output,
        } => {
            check_track(track)?;
            let mut session = EditSession::open(&MediaInfo::default(), &settings);
            let result = session
                .import_file(track, &input)
                .with_context(|| format!("Failed to import {}", input.display()))?;
            tracing::info!(entries = result.entries.len(), "imported {}", input.display());

            let to = to.unwrap_or(session.state().duration_ms);
            let offset = offset.unwrap_or(settings.export.default_offset_ms);
            let selection = ExportSelection::new(track, from, to, offset);
            write_export(&session, selection, output.as_deref())?;
        }

        Commands::Grid {
            input,
            interval,
            track,
            json,
        } => {
            check_track(track)?;
            let interval = GlobalInterval::new(interval).context("Invalid interval")?;
            let mut session = EditSession::open(&MediaInfo::default(), &settings);
            session
                .import_file(track, &input)
                .with_context(|| format!("Failed to import {}", input.display()))?;

            session.request_regrid(interval)?;
            session
                .finish_regrid()
                .await
                .context("Regrid did not complete")?;

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            if json {
                serde_json::to_writer_pretty(&mut out, session.layout())?;
                writeln!(out)?;
            } else {
                print_layout(&mut out, session.layout(), interval)?;
            }
        }

        Commands::Auto {
            segments,
            text,
            merge,
            interval,
            output,
        } => {
            let parsed = read_segments(&segments)?;

            let mut settings = settings;
            if let Some(interval) = interval {
                settings.interval_ms = GlobalInterval::new(interval).context("Invalid interval")?.ms();
            }
            let preset = AutoPreset {
                text: text.unwrap_or_else(|| settings.auto_preset.text.clone()),
                merge_as_single_span: merge.unwrap_or(settings.auto_preset.merge_as_single_span),
            };
            if preset.text.is_empty() {
                bail!("Preset text is empty; pass --text or set autoPreset.text in the settings");
            }

            let duration = parsed.iter().map(|s| s.end_ms).max().unwrap_or(0);
            let mut session = EditSession::open(&MediaInfo::with_duration(duration), &settings);
            if let Some(interval) = interval {
                // Settings normalization only keeps preset intervals
                session.regrid_now(GlobalInterval::new(interval)?)?;
            }
            session.apply_auto_segments(parsed, preset)?;

            let selection = ExportSelection::new(
                AUTO_TRACK,
                0,
                session.state().duration_ms,
                settings.export.default_offset_ms,
            );
            write_export(&session, selection, output.as_deref())?;
        }

        Commands::Marks {
            segments,
            output,
            from,
            to,
            absolute,
            offset,
            max_ignore,
            max_merge,
            priority,
            text,
            unnumbered,
        } => {
            let parsed = read_segments(&segments)?;

            let mut settings = settings;
            let options = &mut settings.time_marks;
            if absolute {
                options.timing = TimingMode::Absolute;
            }
            if let Some(offset) = offset {
                options.offset_ms = offset;
            }
            if let Some(max_ignore) = max_ignore {
                options.max_ignore_ms = max_ignore;
            }
            if let Some(max_merge) = max_merge {
                options.max_merge_ms = max_merge;
            }
            if let Some(priority) = priority {
                options.priority = priority.into();
            }
            options.unnumbered_copy |= unnumbered;

            let end = parsed.iter().map(|s| s.end_ms).max().unwrap_or(0);
            let to = to.unwrap_or(end);
            let preset = AutoPreset {
                text: text.unwrap_or_else(|| settings.auto_preset.text.clone()),
                merge_as_single_span: true,
            };

            let mut session = EditSession::open(&MediaInfo::with_duration(end), &settings);
            session.apply_auto_segments(parsed, preset)?;
            let report = session
                .export_time_marks(from, to, &output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            tracing::info!(marks = report.marks, "wrote {}", output.display());
            if let Some(copy) = report.unnumbered_path {
                tracing::info!("wrote {}", copy.display());
            }
        }

        Commands::PrintDefaultSettings => {
            println!("{}", serde_json::to_string_pretty(&EditorSettings::default())?);
        }
    }

    Ok(())
}

fn read_segments(path: &Path) -> Result<Vec<AutoSegment>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let raw: Vec<(Ms, Ms)> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let mut parsed = Vec::with_capacity(raw.len());
    for (start_ms, end_ms) in raw {
        match AutoSegment::new(start_ms, end_ms) {
            Ok(segment) => parsed.push(segment),
            Err(e) => tracing::warn!("skipping segment: {}", e),
        }
    }
    Ok(parsed)
}

fn check_track(track: usize) -> Result<()> {
    if track >= TRACK_COUNT {
        bail!("Track {} is out of range (0-{})", track, TRACK_COUNT - 1);
    }
    Ok(())
}

fn write_export(session: &EditSession, selection: ExportSelection, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let report = session
                .export_to_file(selection, path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(cues = report.cues, "wrote {}", path.display());
        }
        None => {
            let rendered = session.export(selection)?;
            std::io::stdout().lock().write_all(rendered.as_bytes())?;
        }
    }
    Ok(())
}

fn print_layout(out: &mut impl Write, layout: &GridLayout, interval: GlobalInterval) -> Result<()> {
    writeln!(out, "# interval {} | {} rows", interval, layout.row_count)?;
    let mut spans: Vec<(u64, usize, &str, u64)> = layout
        .tracks
        .iter()
        .enumerate()
        .flat_map(|(track, spans)| {
            spans
                .iter()
                .map(move |span| (span.row, track, span.text.as_str(), span.row_span))
        })
        .collect();
    spans.sort();

    for (row, track, text, row_span) in spans {
        writeln!(
            out,
            "{:>9}  track {}  rows {:<3} {}",
            timegrid::row_label(row, interval),
            track,
            row_span,
            text.replace('\n', " / ")
        )?;
    }
    Ok(())
}

//! albis: inspect, render and analyze detector frames.
//!
//! Frames come from local HDF5, TIFF and raw files, or from a running
//! viewer backend (`fetch`).
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use std::path::{Path, PathBuf};
use std::time::Instant;

use albis_analysis::{Point, RoiMode};
use albis_core::{format_stat, Colormap, Dtype, Frame, Mask};
use albis_io::{
    open_hdf5_stack, read_local_frame, write_tiff, ApiClient, FileKind, FrameRequest,
    LocalRequest, MappedFrameReader, Metadata, RawLayout,
};
use albis_render::Backend;
use albis_viewer::{ViewerConfig, ViewerState};
use clap::{Args, Parser, Subcommand};
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source error: {0}")]
    Source(#[from] albis_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] albis_core::Error),

    #[error("Viewer error: {0}")]
    Viewer(#[from] albis_viewer::ViewerError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

/// Detector frame viewer toolkit.
#[derive(Parser)]
#[command(name = "albis")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Viewer settings file (colormap, peak count, backend URL)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where to read a frame from.
#[derive(Args, Debug, Clone)]
struct SourceArgs {
    /// Input file (HDF5, TIFF or raw)
    input: PathBuf,

    /// HDF5 dataset path (default: first image dataset)
    #[arg(short, long)]
    dataset: Option<String>,

    /// Frame index
    #[arg(short, long, default_value = "0")]
    index: usize,

    /// Threshold channel of 4-D stacks
    #[arg(short, long, default_value = "0")]
    threshold: usize,

    /// Element type of raw files (e.g. uint16, <f4)
    #[arg(long)]
    dtype: Option<String>,

    /// Frame size of raw files as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_size)]
    shape: Option<(usize, usize)>,

    /// Bytes to skip before the first raw frame
    #[arg(long, default_value = "0")]
    header_bytes: usize,

    /// Ignore the detector mask
    #[arg(long)]
    no_mask: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show shape, type and mask summary of a frame source
    Info {
        #[command(flatten)]
        source: SourceArgs,

        /// Print the metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print frame statistics and the auto-contrast window
    Stats {
        #[command(flatten)]
        source: SourceArgs,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a frame to PNG
    Render {
        #[command(flatten)]
        source: SourceArgs,

        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,

        /// Colormap (gray, heat, viridis, ..., albulaHdr)
        #[arg(short, long)]
        colormap: Option<Colormap>,

        /// Black level (default: auto-contrast)
        #[arg(long)]
        min: Option<f64>,

        /// White level (default: auto-contrast)
        #[arg(long)]
        max: Option<f64>,

        /// Invert the palette
        #[arg(long)]
        invert: bool,

        /// Render backend: auto, gpu or cpu
        #[arg(short, long, default_value = "auto")]
        backend: Backend,
    },

    /// Compute ROI statistics and profiles
    Roi {
        #[command(flatten)]
        source: SourceArgs,

        /// ROI shape: line, box, circle or annulus
        #[arg(short, long)]
        mode: RoiMode,

        /// First point (line start, box corner or circle center) as X,Y
        #[arg(long, value_parser = parse_point)]
        start: Point,

        /// Second point as X,Y; for round shapes it sets the outer radius
        #[arg(long, value_parser = parse_point)]
        end: Point,

        /// Inner radius of an annulus
        #[arg(long)]
        inner: Option<f64>,

        /// Directory to write the profile CSV into
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Find the brightest local maxima
    Peaks {
        #[command(flatten)]
        source: SourceArgs,

        /// Number of peaks to report
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Directory to write the peak CSV into
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Fetch a frame from a running viewer backend
    Fetch {
        /// File path on the backend
        file: String,

        /// Dataset path
        #[arg(short, long, default_value = "")]
        dataset: String,

        /// Frame index
        #[arg(short, long, default_value = "0")]
        index: usize,

        /// Threshold channel
        #[arg(short, long, default_value = "0")]
        threshold: usize,

        /// Backend API base URL
        #[arg(long)]
        url: Option<String>,

        /// Output path; .tif/.tiff keeps raw values, anything else renders PNG
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn parse_point(s: &str) -> std::result::Result<Point, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got {s}"))?;
    let x: f64 = x.trim().parse().map_err(|e| format!("{x}: {e}"))?;
    let y: f64 = y.trim().parse().map_err(|e| format!("{y}: {e}"))?;
    Ok(Point::new(x, y))
}

fn parse_size(s: &str) -> std::result::Result<(usize, usize), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s}"))?;
    let w: usize = w.trim().parse().map_err(|e| format!("{w}: {e}"))?;
    let h: usize = h.trim().parse().map_err(|e| format!("{h}: {e}"))?;
    Ok((w, h))
}

/// One frame read from a local source.
struct Loaded {
    meta: Metadata,
    frame: Frame,
    index: usize,
    threshold: usize,
    mask: Option<(Mask, String)>,
}

/// Metadata for sources without an HDF5 header.
fn local_metadata(path: &Path, frame: &Frame, frame_count: usize) -> Metadata {
    let mut shape = vec![frame.height(), frame.width()];
    if frame_count > 1 {
        shape.insert(0, frame_count);
    }
    Metadata {
        path: path.display().to_string(),
        ndim: shape.len(),
        shape,
        dtype: frame.dtype().numpy_tag().to_string(),
        chunks: None,
        maxshape: None,
        linked_stack: false,
        threshold_energies: None,
    }
}

fn raw_layout(args: &SourceArgs) -> Result<RawLayout> {
    let (Some(tag), Some((width, height))) = (args.dtype.as_deref(), args.shape) else {
        return Err(CliError::Usage(format!(
            "{} is read as raw data and needs --dtype and --shape",
            args.input.display()
        )));
    };
    let (dtype, endian) =
        Dtype::parse(tag).ok_or_else(|| CliError::Usage(format!("unknown dtype: {tag}")))?;
    Ok(RawLayout::new(dtype, width, height)
        .with_endian(endian)
        .with_header_bytes(args.header_bytes))
}

fn load(args: &SourceArgs) -> Result<Loaded> {
    let start = Instant::now();
    let path = args.input.as_path();
    let loaded = match FileKind::of(path) {
        FileKind::Hdf5 => {
            let stack = open_hdf5_stack(path, args.dataset.as_deref())?;
            let meta = stack.metadata()?;
            let threshold_count = meta.threshold_count();
            let index = args.index.min(meta.frame_count().saturating_sub(1));
            let threshold = args.threshold.min(threshold_count.saturating_sub(1));
            let frame = stack.read_frame(index, threshold)?;
            let mask = if args.no_mask {
                None
            } else {
                stack.read_mask((threshold_count > 1).then_some(threshold))?
            };
            Loaded {
                meta,
                frame,
                index,
                threshold,
                mask,
            }
        }
        FileKind::Raw => {
            let reader = MappedFrameReader::open(path, raw_layout(args)?)?;
            let index = args.index.min(reader.frame_count().saturating_sub(1));
            let frame = reader.frame(index)?;
            Loaded {
                meta: local_metadata(path, &frame, reader.frame_count()),
                frame,
                index,
                threshold: 0,
                mask: None,
            }
        }
        FileKind::Tiff | FileKind::HeaderImage => {
            let frame = read_local_frame(path, &LocalRequest::default())?;
            Loaded {
                meta: local_metadata(path, &frame, 1),
                frame,
                index: 0,
                threshold: 0,
                mask: None,
            }
        }
    };
    log::info!(
        "loaded {} frame {} ({}x{} {}) in {:.2?}",
        path.display(),
        loaded.index,
        loaded.frame.width(),
        loaded.frame.height(),
        loaded.frame.dtype(),
        start.elapsed()
    );
    Ok(loaded)
}

/// Put a loaded frame and its mask into a fresh viewer.
fn show(
    config: &ViewerConfig,
    backend: Backend,
    file: &str,
    loaded: Loaded,
    use_mask: bool,
) -> ViewerState {
    let mut state = ViewerState::with_backend(config, backend);
    state.open_with_counts(
        file,
        &loaded.meta.path,
        loaded.meta.frame_count(),
        loaded.meta.threshold_count(),
        loaded.mask.is_some(),
    );
    state.set_threshold(loaded.threshold);
    if let Some(ticket) = state.request_frame(loaded.index) {
        state.receive_frame(ticket, loaded.frame);
    }
    if let (Some((mask, mask_path)), Some(key)) = (loaded.mask, state.mask_request()) {
        state.install_mask(&key, mask, &mask_path);
    }
    if !use_mask {
        state.set_mask_enabled(false);
    }
    state
}

fn open_viewer(config: &ViewerConfig, backend: Backend, args: &SourceArgs) -> Result<ViewerState> {
    let loaded = load(args)?;
    let file = args.input.display().to_string();
    Ok(show(config, backend, &file, loaded, !args.no_mask))
}

fn print_info(loaded: &Loaded, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&loaded.meta)?);
        return Ok(());
    }
    let meta = &loaded.meta;
    println!("Dataset: {}", meta.path);
    println!("Shape: {:?}", meta.shape);
    println!("Dtype: {}", loaded.frame.dtype());
    println!("Frames: {}", meta.frame_count());
    println!("Thresholds: {}", meta.threshold_count());
    for t in 0..meta.threshold_count() {
        if let Some(energy) = meta.threshold_energy(t) {
            println!("  threshold {}: {} eV", t + 1, format_stat(energy));
        }
    }
    if meta.linked_stack {
        println!("Linked stack: yes");
    }
    match &loaded.mask {
        Some((mask, source)) => {
            let (good, dead, gap) = mask.class_counts();
            println!("Mask: {source}");
            println!("  good {good}, dead {dead}, gap {gap}");
        }
        None => println!("Mask: none"),
    }
    Ok(())
}

fn print_stats(state: &ViewerState, json: bool) -> Result<()> {
    let (Some(stats), Some(global)) = (state.stats(), state.global_stats()) else {
        return Err(albis_viewer::ViewerError::NoFrame.into());
    };
    let window = state.window();
    if json {
        let value = serde_json::json!({
            "min": stats.min,
            "max": stats.max,
            "saturation": stats.sat_max,
            "count": global.count,
            "sum": global.sum,
            "mean": global.mean,
            "std": global.std,
            "median": global.median,
            "auto_min": window.min,
            "auto_max": window.max,
            "masked": state.mask_state().is_enabled(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    println!("Range: {} - {}", format_stat(stats.min), format_stat(stats.max));
    if let Some(sat) = stats.sat_max {
        println!("Saturation: {}", format_stat(sat));
    }
    println!("Pixels: {}", global.count);
    println!("Sum: {}", format_stat(global.sum));
    println!("Mean: {}", format_stat(global.mean));
    println!("Std: {}", format_stat(global.std));
    if let Some(median) = global.median {
        println!("Median: {}", format_stat(median));
    }
    println!(
        "Auto window: {} - {}",
        format_stat(window.min),
        format_stat(window.max)
    );
    println!(
        "Mask: {}",
        if state.mask_state().is_enabled() {
            "applied"
        } else {
            "off"
        }
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = cli
        .config
        .as_deref()
        .map(ViewerConfig::load_or_default)
        .unwrap_or_default();

    match cli.command {
        Commands::Info { source, json } => {
            let loaded = load(&source)?;
            println!("File: {}", source.input.display());
            print_info(&loaded, json)?;
        }

        Commands::Stats { source, json } => {
            let state = open_viewer(&config, Backend::Cpu, &source)?;
            print_stats(&state, json)?;
        }

        Commands::Render {
            source,
            output,
            colormap,
            min,
            max,
            invert,
            backend,
        } => {
            let start = Instant::now();
            let mut state = open_viewer(&config, backend, &source)?;
            if let Some(colormap) = colormap {
                state.set_colormap(colormap);
            }
            if let Some(min) = min {
                state.set_min(min);
            }
            if let Some(max) = max {
                state.set_max(max);
            }
            state.set_invert(invert);
            state.export_png(&output)?;

            let window = state.window();
            println!(
                "Rendered {} with {} ({}, window {} - {}) in {:.2}s",
                output.display(),
                state.renderer_kind(),
                window.colormap,
                format_stat(window.min),
                format_stat(window.max),
                start.elapsed().as_secs_f64()
            );
            if let Some(status) = state.renderer_status() {
                eprintln!("{status}");
            }
        }

        Commands::Roi {
            source,
            mode,
            start,
            end,
            inner,
            output_dir,
        } => {
            let mut state = open_viewer(&config, Backend::Cpu, &source)?;
            state.set_roi_mode(mode);
            state.pointer_down(start, 1.0, true);
            state.pointer_move(end);
            state.pointer_up();
            if let Some(inner) = inner {
                state.roi_mut().set_inner_radius(inner);
            }
            let Some(result) = state.refresh_roi() else {
                return Err(CliError::Usage(format!(
                    "{mode} ROI is empty or outside the frame"
                )));
            };
            let stats = &result.stats;
            println!("ROI: {mode}");
            println!("Start: {}, {}", result.start.0, result.start.1);
            println!("End: {}, {}", result.end.0, result.end.1);
            println!("Size: {}", result.size);
            println!("Pixels: {}", stats.count);
            println!("Sum: {}", format_stat(stats.sum));
            println!("Mean: {}", format_stat(stats.mean));
            println!("Min: {}", format_stat(stats.min));
            println!("Max: {}", format_stat(stats.max));
            println!("Std: {}", format_stat(stats.std));
            println!("Median: {}", format_stat(stats.median));

            if let Some(dir) = output_dir {
                let path = state.export_roi_csv(&dir)?;
                println!("Wrote {}", path.display());
            }
        }

        Commands::Peaks {
            source,
            count,
            output_dir,
        } => {
            let mut state = open_viewer(&config, Backend::Cpu, &source)?;
            if let Some(count) = count {
                state.set_peak_count(count);
            }
            state.set_peaks_enabled(true);

            let peaks = state.peaks().peaks();
            println!("{:<6} | {:<8} | {:<8} | {:<12}", "#", "X", "Y", "Intensity");
            println!("{:-<43}", "");
            for (i, peak) in peaks.iter().enumerate() {
                println!(
                    "{:<6} | {:<8} | {:<8} | {:<12}",
                    i + 1,
                    peak.x,
                    peak.y,
                    format_stat(peak.intensity)
                );
            }
            println!("Peaks: {}", peaks.len());

            if let Some(dir) = output_dir {
                let path = state.export_peaks_csv(&dir)?;
                println!("Wrote {}", path.display());
            }
        }

        Commands::Fetch {
            file,
            dataset,
            index,
            threshold,
            url,
            output,
        } => {
            let config = match url {
                Some(url) => config.with_base_url(url),
                None => config,
            };
            let client = ApiClient::new(&config.client_config())?;
            let health = client.health()?;
            if !health.is_ok() {
                return Err(CliError::Usage(format!(
                    "backend at {} is not healthy",
                    client.base_url()
                )));
            }

            let meta = client.metadata(&file, &dataset)?;
            let threshold_count = meta.threshold_count();
            let index = index.min(meta.frame_count().saturating_sub(1));
            let threshold = threshold.min(threshold_count.saturating_sub(1));
            let request =
                FrameRequest::new(&file, &dataset, index).with_threshold(threshold, threshold_count);
            let frame = client.frame(&request)?.frame()?;
            log::info!(
                "fetched {} frame {} ({}x{} {})",
                file,
                index,
                frame.width(),
                frame.height(),
                frame.dtype()
            );

            let is_tiff = output
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"));
            if is_tiff {
                write_tiff(&output, &frame)?;
            } else {
                let has_mask = FileKind::of(Path::new(&file)).has_mask();
                let mask = if has_mask {
                    match client.mask(&file, (threshold_count > 1).then_some(threshold)) {
                        Ok(payload) => {
                            let source = payload.meta.mask_path.clone().unwrap_or_default();
                            Some((payload.mask()?, source))
                        }
                        Err(e) => {
                            log::warn!("mask unavailable: {e}");
                            None
                        }
                    }
                } else {
                    None
                };
                let loaded = Loaded {
                    meta,
                    frame,
                    index,
                    threshold,
                    mask,
                };
                let mut state = show(&config, Backend::Auto, &file, loaded, true);
                state.export_png(&output)?;
            }
            println!("Wrote {}", output.display());
        }
    }

    Ok(())
}

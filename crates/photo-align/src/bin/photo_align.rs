use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use serde::Serialize;

use photo_align::editor::MergeMode;
use photo_align::io::{write_outputs, FsImageSource, OutputFormat};
use photo_align::{
    AlignConfig, AlignmentPipeline, ImageSource, Interpolation, PairEditor, Project,
};

#[derive(Parser, Debug)]
#[command(name = "photo-align", version, about = "Align photos to a reference image")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Warp every image onto the reference and write the cropped results.
    Align {
        project: PathBuf,
        output_dir: PathBuf,
        /// JSON run configuration.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum)]
        interpolation: Option<InterpolationArg>,
        #[arg(long, value_enum, default_value_t = FormatArg::Png)]
        format: FormatArg,
    },
    /// Detect correspondences between the reference and one target and save
    /// them into the project file.
    Match {
        project: PathBuf,
        /// Index of the target image in the project (1 = first target).
        #[arg(long)]
        target: usize,
        #[arg(long)]
        max_points: Option<usize>,
        /// Keep mutual nearest neighbours only.
        #[arg(long)]
        cross_check: bool,
        /// Add to the existing points instead of replacing them.
        #[arg(long)]
        append: bool,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the target → reference homography of one pair as JSON.
    Estimate {
        project: PathBuf,
        #[arg(long)]
        target: usize,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InterpolationArg {
    Nearest,
    Bilinear,
}

impl From<InterpolationArg> for Interpolation {
    fn from(arg: InterpolationArg) -> Self {
        match arg {
            InterpolationArg::Nearest => Interpolation::Nearest,
            InterpolationArg::Bilinear => Interpolation::Bilinear,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Png,
    Jpeg,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Png => OutputFormat::Png,
            FormatArg::Jpeg => OutputFormat::Jpeg,
        }
    }
}

#[derive(Serialize)]
struct EstimateReport {
    reference: String,
    target: String,
    /// Row-major target → reference matrix.
    homography: [[f64; 3]; 3],
    inliers: usize,
    correspondences: usize,
    rms_px: f64,
    inlier_mask: Vec<bool>,
}

/// Exit status when some targets could not be aligned.
const EXIT_WARNINGS: u8 = 2;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    #[cfg(feature = "tracing")]
    photo_align::core::init_tracing(false, level);
    #[cfg(not(feature = "tracing"))]
    let _ = photo_align::core::init_with_level(level);
}

fn log_sizes(project: &Project) {
    for (i, record) in project.images().iter().enumerate() {
        if let Some((w, h)) = record.dimensions {
            log::info!("image {i} ({}): {w}x{h}", record.path);
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AlignConfig, Box<dyn Error>> {
    Ok(match path {
        Some(p) => AlignConfig::load_json(p)?,
        None => AlignConfig::default(),
    })
}

fn run_align(
    project_path: &Path,
    output_dir: &Path,
    config: Option<&Path>,
    interpolation: Option<InterpolationArg>,
    format: FormatArg,
) -> Result<ExitCode, Box<dyn Error>> {
    let cfg = load_config(config)?;
    let mut params = cfg.build_params();
    if let Some(interp) = interpolation {
        params.interpolation = interp.into();
    }
    let mut project = Project::load_json(project_path)?;
    let source = FsImageSource::for_project_file(project_path);
    let result = AlignmentPipeline::new(params).align(&project, &source)?;
    result.record_dimensions(&mut project)?;
    log_sizes(&project);
    let paths = write_outputs(&result, output_dir, format.into())?;

    let mut warned = false;
    for warning in result.warnings() {
        eprintln!("warning: {warning}");
        warned = true;
    }
    println!(
        "wrote {} image(s) of {}x{} to {}",
        paths.len(),
        result.bounding.width(),
        result.bounding.height(),
        output_dir.display()
    );
    Ok(if warned {
        ExitCode::from(EXIT_WARNINGS)
    } else {
        ExitCode::SUCCESS
    })
}

fn run_match(
    project_path: &Path,
    target: usize,
    max_points: Option<usize>,
    cross_check: bool,
    append: bool,
    config: Option<&Path>,
) -> Result<ExitCode, Box<dyn Error>> {
    let cfg = load_config(config)?;
    let mut matcher = cfg.build_matcher_params();
    if cross_check {
        matcher.cross_check = true;
    }
    let max_points = max_points.unwrap_or(cfg.max_points);

    let mut project = Project::load_json(project_path)?;
    let key = project.pair_key_at(target)?;
    let source = FsImageSource::for_project_file(project_path);
    let mut images = Vec::with_capacity(2);
    for id in [key.reference, key.target] {
        let record = project
            .image(id)
            .ok_or_else(|| format!("image {id} missing from project"))?
            .clone();
        let img = source.load(&record)?;
        project.set_dimensions(id, img.width, img.height)?;
        images.push(img);
    }

    let mode = if append {
        MergeMode::Append
    } else {
        MergeMode::Replace
    };
    let mut editor = PairEditor::new();
    let found = editor.auto_correlate(
        &mut project,
        key,
        &images[0].view(),
        &images[1].view(),
        max_points,
        &matcher,
        mode,
    )?;
    log_sizes(&project);
    project.write_json(project_path)?;
    println!("matched {found} point(s) for image {target}");
    Ok(ExitCode::SUCCESS)
}

fn run_estimate(
    project_path: &Path,
    target: usize,
    config: Option<&Path>,
) -> Result<ExitCode, Box<dyn Error>> {
    let cfg = load_config(config)?;
    let project = Project::load_json(project_path)?;
    let key = project.pair_key_at(target)?;
    let fit = AlignmentPipeline::new(cfg.build_params())
        .estimate(&project, &key)
        .ok_or_else(|| format!("image {target} has no correspondences with the reference"))??;

    let path_of = |id| {
        project
            .image(id)
            .map(|r| r.path.clone())
            .unwrap_or_default()
    };
    let report = EstimateReport {
        reference: path_of(key.reference),
        target: path_of(key.target),
        homography: fit.homography.to_array(),
        inliers: fit.inlier_count(),
        correspondences: fit.inliers.len(),
        rms_px: fit.inlier_rms(),
        inlier_mask: fit.inliers.clone(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::SUCCESS)
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    match cli.command {
        Command::Align {
            project,
            output_dir,
            config,
            interpolation,
            format,
        } => run_align(&project, &output_dir, config.as_deref(), interpolation, format),
        Command::Match {
            project,
            target,
            max_points,
            cross_check,
            append,
            config,
        } => run_match(
            &project,
            target,
            max_points,
            cross_check,
            append,
            config.as_deref(),
        ),
        Command::Estimate {
            project,
            target,
            config,
        } => run_estimate(&project, target, config.as_deref()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

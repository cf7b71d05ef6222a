use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use temporal_glare::config::{CliArgs, Command, GlareArgs, LightFieldArgs};
use temporal_glare::reprojection::{CameraArray, LightField, LightFieldRenderer, VirtualCamera};
use temporal_glare::{
    logging, ComputeOptions, ComputeSession, FrameDriver, GlareConfig, GlarePipeline, MemorySurface,
};

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let mut config = match GlareConfig::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    config.apply_cli_overrides(&args);
    logging::init_logging(&config.debug.log_level);

    if let Command::WriteConfig = args.command {
        return match config.save(&args.config) {
            Ok(()) => {
                tracing::info!(path = %args.config.display(), "Config written");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not write config");
                ExitCode::FAILURE
            }
        };
    }

    let session = match ComputeSession::new(&ComputeOptions {
        threads: config.render.threads,
        skip_self_check: false,
    }) {
        Ok(session) => Arc::new(session),
        Err(e) => {
            tracing::error!(error = %e, "Compute startup failed");
            return ExitCode::FAILURE;
        }
    };

    match &args.command {
        Command::Glare(glare) => run_glare(session, &config, glare),
        Command::Lightfield(lightfield) => run_lightfield(session, &config, lightfield),
        Command::WriteConfig => ExitCode::SUCCESS,
    }
}

fn run_glare(session: Arc<ComputeSession>, config: &GlareConfig, args: &GlareArgs) -> ExitCode {
    let mut pipeline = GlarePipeline::new(session, config);
    if let Err(e) = pipeline.load_exr(&args.image, &config.assets.grating) {
        tracing::error!(error = %e, "Nothing to render");
        return ExitCode::FAILURE;
    }

    let mut driver = FrameDriver::new(pipeline, MemorySurface::new());
    driver.run(config.render.frames, Duration::from_millis(config.render.tick_ms));

    // TODO: write the presented frame to PNG once an output path option exists.
    if let Some(frame) = driver.surface().frame() {
        tracing::info!(
            frames = driver.surface().presented(),
            failed = driver.failed_frames(),
            last_index = frame.index,
            psf_max = frame.psf_max,
            exposure = frame.exposure,
            "Glare run finished"
        );
    }
    ExitCode::SUCCESS
}

fn run_lightfield(session: Arc<ComputeSession>, config: &GlareConfig, args: &LightFieldArgs) -> ExitCode {
    let array = CameraArray {
        rows: args.rows,
        cols: args.cols,
        spacing: args.spacing,
        fov_deg: args.array_fov,
    };
    let field = match LightField::load_dir(&args.dir, array) {
        Ok(field) => Arc::new(field),
        Err(e) => {
            tracing::error!(error = %e, "Could not load light field");
            return ExitCode::FAILURE;
        }
    };

    let camera = VirtualCamera::new(args.focus, args.aperture, args.fov);
    let renderer = LightFieldRenderer::new(session, field, camera);
    let mut driver = FrameDriver::new(renderer, MemorySurface::new());
    driver.run(config.render.frames, Duration::from_millis(config.render.tick_ms));

    tracing::info!(
        frames = driver.surface().presented(),
        failed = driver.failed_frames(),
        "Light field run finished"
    );
    ExitCode::SUCCESS
}

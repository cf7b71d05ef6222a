use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use temporal_glare::config::ExposureMode;
use temporal_glare::driver::DriverEvent;
use temporal_glare::grating::GratingTexture;
use temporal_glare::{
    BackgroundDriver, ComputeOptions, ComputeSession, Control, FrameDriver, GlareConfig,
    GlarePipeline, LoadError, MemorySurface,
};

const SIZE: usize = 64;

fn session() -> Arc<ComputeSession> {
    Arc::new(
        ComputeSession::new(&ComputeOptions {
            threads: Some(2),
            skip_self_check: false,
        })
        .unwrap(),
    )
}

/// Near-Fraunhofer setup with a sparse lens so the PSF peaks at the center.
fn config(seed: u64) -> GlareConfig {
    let mut config = GlareConfig::default();
    config.render.seed = Some(seed);
    config.optics.lens_particles = 20;
    config.optics.distance_mm = 1.0e6;
    config.tonemap.exposure_mode = ExposureMode::Manual;
    config.tonemap.alpha = 0.5;
    config
}

fn write_impulse(dir: &Path) -> PathBuf {
    let path = dir.join("impulse.exr");
    let c = SIZE / 2;
    exr::prelude::write_rgb_file(&path, SIZE, SIZE, |x, y| {
        let v = if x == c && y == c { 1000.0f32 } else { 0.0 };
        (v, v, v)
    })
    .unwrap();
    path
}

fn write_grating(dir: &Path) -> PathBuf {
    let path = dir.join("grating.png");
    GratingTexture::radial(32, 32, 12).as_image().save(&path).unwrap();
    path
}

fn green(image: &image::RgbaImage, x: u32, y: u32) -> f32 {
    image.get_pixel(x, y).0[1] as f32
}

fn ring_mean(image: &image::RgbaImage, min_r: f32, max_r: f32) -> f32 {
    let c = SIZE as f32 / 2.0;
    let (mut sum, mut n) = (0.0, 0);
    for (x, y, px) in image.enumerate_pixels() {
        let r = (x as f32 - c).hypot(y as f32 - c);
        if r >= min_r && r < max_r {
            sum += px.0[1] as f32;
            n += 1;
        }
    }
    sum / n.max(1) as f32
}

#[test]
fn impulse_spreads_into_centered_glare() {
    let dir = tempfile::tempdir().unwrap();
    let (image, grating) = (write_impulse(dir.path()), write_grating(dir.path()));

    let mut pipeline = GlarePipeline::new(session(), &config(11));
    pipeline.load_exr(&image, &grating).unwrap();

    let frame = pipeline.render_frame().unwrap().unwrap();
    assert_eq!(frame.image.dimensions(), (SIZE as u32, SIZE as u32));
    assert!(frame.psf_max.unwrap() > 0.0);
    assert_eq!(frame.exposure, Some(1.0));

    let c = (SIZE / 2) as u32;
    let center = green(&frame.image, c, c);
    assert!(frame.image.pixels().all(|px| px.0[1] as f32 <= center));
    assert!(ring_mean(&frame.image, 0.0, 3.0) > ring_mean(&frame.image, 20.0, 64.0));
    assert!(frame.image.pixels().all(|px| px.0[3] == 255));
}

#[test]
fn default_optics_center_the_glare() {
    let dir = tempfile::tempdir().unwrap();
    let (image, grating) = (write_impulse(dir.path()), write_grating(dir.path()));

    let mut config = GlareConfig::default();
    config.render.seed = Some(11);
    config.tonemap.exposure_mode = ExposureMode::Manual;
    config.tonemap.alpha = 0.5;
    let mut pipeline = GlarePipeline::new(session(), &config);
    pipeline.load_exr(&image, &grating).unwrap();

    for _ in 0..3 {
        let frame = pipeline.render_frame().unwrap().unwrap();
        let brightest = frame.image.pixels().map(|px| px.0[1]).max().unwrap();
        let c = SIZE as f32 / 2.0;
        let near_center = frame
            .image
            .enumerate_pixels()
            .filter(|(x, y, _)| (*x as f32 - c).hypot(*y as f32 - c) < 3.0)
            .map(|(_, _, px)| px.0[1])
            .max()
            .unwrap();
        assert_eq!(near_center, brightest);

        let (inner, middle, outer) = (
            ring_mean(&frame.image, 0.0, 3.0),
            ring_mean(&frame.image, 3.0, 8.0),
            ring_mean(&frame.image, 20.0, 64.0),
        );
        assert!(inner > middle && middle > outer, "{inner} {middle} {outer}");
    }
}

#[test]
fn manual_exposure_slider_ends_still_present_frames() {
    let dir = tempfile::tempdir().unwrap();
    let (image, grating) = (write_impulse(dir.path()), write_grating(dir.path()));

    let mut pipeline = GlarePipeline::new(session(), &config(8));
    pipeline.load_exr(&image, &grating).unwrap();
    let controls = pipeline.controls();
    let mut driver = FrameDriver::new(pipeline, MemorySurface::new());

    controls.send(Control::Alpha(10.0));
    driver.run(1, Duration::ZERO);
    let frame = driver.surface().frame().unwrap();
    assert_eq!(frame.exposure, Some(f32::MAX));
    let c = (SIZE / 2) as u32;
    assert_eq!(frame.image.get_pixel(c, c).0[1], 255);

    controls.send(Control::Alpha(-10.0));
    driver.run(1, Duration::ZERO);
    let frame = driver.surface().frame().unwrap();
    assert_eq!(frame.exposure, Some(f32::MIN_POSITIVE));
    assert!(frame.image.pixels().all(|px| px.0[..3] == [0, 0, 0]));

    assert_eq!(driver.surface().presented(), 2);
    assert_eq!(driver.failed_frames(), 0);
}

#[test]
fn same_seed_renders_identical_frames() {
    let dir = tempfile::tempdir().unwrap();
    let (image, grating) = (write_impulse(dir.path()), write_grating(dir.path()));
    let session = session();

    let frames: Vec<_> = (0..2)
        .map(|_| {
            let mut pipeline = GlarePipeline::new(Arc::clone(&session), &config(5));
            pipeline.load_exr(&image, &grating).unwrap();
            pipeline.render_frame().unwrap();
            pipeline.render_frame().unwrap().unwrap()
        })
        .collect();

    assert_eq!(frames[0].image, frames[1].image);
    assert_eq!(frames[0].psf_max, frames[1].psf_max);
}

#[test]
fn loading_sizes_grating_and_particles_to_the_image() {
    let dir = tempfile::tempdir().unwrap();
    let (image, grating) = (write_impulse(dir.path()), write_grating(dir.path()));

    let mut pipeline = GlarePipeline::new(session(), &config(1));
    assert!(pipeline.render_frame().unwrap().is_none());
    pipeline.load_exr(&image, &grating).unwrap();

    let scene = pipeline.scene().unwrap();
    assert_eq!((scene.grating.width(), scene.grating.height()), (SIZE as u32, SIZE as u32));
    assert_eq!(scene.particles.len(), 20);
    assert_eq!(scene.generation, 1);
}

#[test]
fn failed_reload_keeps_the_previous_scene() {
    let dir = tempfile::tempdir().unwrap();
    let (image, grating) = (write_impulse(dir.path()), write_grating(dir.path()));

    let mut pipeline = GlarePipeline::new(session(), &config(2));
    pipeline.load_exr(&image, &grating).unwrap();

    let missing = dir.path().join("missing.exr");
    let err = pipeline.load_exr(&missing, &grating).unwrap_err();
    assert!(matches!(err, LoadError::Exr { .. }));

    let err = pipeline.load_exr(&image, &dir.path().join("missing.png")).unwrap_err();
    assert!(matches!(err, LoadError::Texture { .. }));

    assert_eq!(pipeline.scene().unwrap().generation, 1);
    assert!(pipeline.render_frame().unwrap().is_some());
}

#[test]
fn switching_to_auto_exposure_changes_only_exposure() {
    let dir = tempfile::tempdir().unwrap();
    let (image, grating) = (write_impulse(dir.path()), write_grating(dir.path()));

    let mut config = config(3);
    config.tonemap.alpha = 0.7;
    let mut pipeline = GlarePipeline::new(session(), &config);
    pipeline.load_exr(&image, &grating).unwrap();

    let manual = pipeline.render_frame().unwrap().unwrap();
    let (gamma, white) = (pipeline.params().gamma, pipeline.params().white_point);

    pipeline.controls().send(Control::ExposureMode(ExposureMode::Auto));
    let auto = pipeline.render_frame().unwrap().unwrap();

    let expected = pipeline.scene().unwrap().image.stats().auto_exposure();
    assert_eq!(auto.exposure, Some(expected));
    assert_ne!(manual.exposure, auto.exposure);
    assert_eq!(pipeline.params().gamma, gamma);
    assert_eq!(pipeline.params().white_point, white);
    assert_eq!(pipeline.params().alpha, 0.7);
}

#[test]
fn headless_driver_presents_every_frame() {
    let dir = tempfile::tempdir().unwrap();
    let (image, grating) = (write_impulse(dir.path()), write_grating(dir.path()));

    let mut pipeline = GlarePipeline::new(session(), &config(4));
    pipeline.load_exr(&image, &grating).unwrap();

    let mut driver = FrameDriver::new(pipeline, MemorySurface::new());
    driver.run(3, Duration::ZERO);
    assert_eq!(driver.surface().presented(), 3);
    assert_eq!(driver.failed_frames(), 0);
    assert_eq!(driver.surface().frame().unwrap().index, 2);
}

#[test]
fn background_reload_swaps_scene_between_frames() {
    let dir = tempfile::tempdir().unwrap();
    let (image, grating) = (write_impulse(dir.path()), write_grating(dir.path()));

    let pipeline = GlarePipeline::new(session(), &config(6));
    let mut driver = BackgroundDriver::spawn(pipeline).unwrap();
    let mut surface = MemorySurface::new();
    let timeout = Duration::from_secs(30);

    let id = driver.request_frame().unwrap();
    assert!(matches!(driver.wait(&mut surface, timeout), Some(DriverEvent::Idle { id: got }) if got == id));

    assert!(driver.reload(move |p: &mut GlarePipeline| p.load_exr(&image, &grating)));
    assert!(matches!(driver.wait(&mut surface, timeout), Some(DriverEvent::Reloaded(Ok(())))));

    let id = driver.request_frame().unwrap();
    match driver.wait(&mut surface, timeout) {
        Some(DriverEvent::Presented { id: got, index }) => {
            assert_eq!((got, index), (id, 0));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(surface.frame().unwrap().generation, 1);
    driver.shutdown();
}

//! A thin standalone harness around `render_session::Session`, grounded on
//! `app/cycles_test.cpp`'s shape (kept in the reference pack) and
//! `code_analysis/src/main.rs`'s clap-derive CLI pattern. Builds a BVH over
//! a scene with `bvh_build`, then renders it in background mode with a
//! flat-color placeholder kernel (real shading is out of scope, spec §1).

mod args;
mod error;
mod image_writer;
mod scene;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use args::Arguments;
use bvh_sah::SahCostModel;
use render_progress::Progress;
use render_session::{DenoiseParams, FlatColorKernel, ResumableChunkParams, Session, SessionParams};
use render_tiles::TileOrder;
use scene::DemoScene;

const KNOWN_DEVICES: &[&str] = &["cpu"];

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let arguments = Arguments::parse();

    if arguments.list_devices {
        for device in KNOWN_DEVICES {
            println!("{device}");
        }
        return ExitCode::SUCCESS;
    }

    match run(&arguments) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(arguments: &Arguments) -> anyhow::Result<()> {
    arguments.validate()?;

    let demo_scene = match &arguments.scene_file {
        Some(path) => DemoScene::load(path)?,
        None => DemoScene::demo_cube(),
    };
    tracing::info!(triangles = demo_scene.triangle_count(), "scene loaded");

    let build_progress = Progress::new();
    let build_params = bvh_build::BuildParams {
        num_threads: arguments.threads as usize,
        ..bvh_build::BuildParams::default()
    };
    let cost_model = SahCostModel::default();
    let pool = demo_scene.to_reference_pool();
    let build_output = bvh_build::build(pool, &build_params, &cost_model, &demo_scene, &build_progress);

    match &build_output.root {
        Some(_) => tracing::info!(primitives = build_output.output.prim_type.len(), "BVH built"),
        None => tracing::warn!("BVH build produced no root (empty scene or cancelled)"),
    }

    let session_params = SessionParams {
        background: arguments.background,
        progressive_refine: false,
        target_samples: arguments.samples.max(0) as u32,
        image_width: arguments.width,
        image_height: arguments.height,
        tile_width: 64,
        tile_height: 64,
        tile_order: TileOrder::Center,
        resolution_divider: 1,
        num_worker_threads: arguments.threads.max(1),
        display_buffer_linear: false,
        denoise: DenoiseParams::default(),
        pause_timeout: Duration::from_millis(100),
        cancel_timeout: Duration::from_millis(100),
        reset_timeout: Duration::from_millis(100),
        progressive_update_timeout: Duration::from_millis(100),
        resumable_chunk: ResumableChunkParams::default(),
        // Always render into the session-wide persistent buffer rather than
        // per-tile transient ones: this harness has no device-side file
        // writer to drain transient tiles through (image I/O is out of
        // scope per spec §1), so it tonemaps the one shared buffer at the
        // end regardless of whether `--output` is set.
        output_path: None,
    };

    let kernel: Arc<dyn render_session::DeviceKernel> = Arc::new(FlatColorKernel { rgb: [0.6, 0.6, 0.6] });
    let session = Session::new(session_params, kernel).map_err(|e| anyhow::anyhow!("session error: {e}"))?;

    if !arguments.quiet {
        let progress = Arc::clone(session.progress());
        session.set_update_tile_callback(move |_tile_index, _still_rendering| {
            tracing::debug!(fraction = progress.progress_fraction(), "tile updated");
        });
    }

    session.start();
    session.join();

    if let Some(output) = &arguments.output {
        let display = session.tonemap_display();
        image_writer::write_ppm(output, &display)?;
        tracing::info!(path = %output.display(), "wrote output image");
    }

    Ok(())
}

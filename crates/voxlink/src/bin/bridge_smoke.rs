//! # Bridge Smoke Run
//!
//! Drives the whole bridge against the in-process mock host:
//!
//! Detect → Resolve → Placeholder → Compute → Submit → Teardown → Recompute
//!
//! Usage: `bridge_smoke [config.toml]`

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use voxlink::binding::{ForeignRuntime, MockClass, MockRuntime};
use voxlink::core::{
    ArgShape, BridgeConfig, CellCoord, ConfigResult, ForeignHandle, ForeignValue, RenderBox,
    StructureId,
};
use voxlink::rendering::{
    CellContent, FrameParams, MockStructureSource, RecordingBuffers, RecordingPoses,
    StructureContext,
};
use voxlink::{init_tracing, CapabilityBridge};

const STRUCTURES: u64 = 16;
const CELLS_PER_STRUCTURE: i32 = 64;
const FRAMES: usize = 240;

/// A host where both modules are loaded and the newest renderer exists.
fn mock_host() -> MockRuntime {
    MockRuntime::new()
        .with_module("kinetics")
        .with_module("microvoxel")
        .with_class(MockClass::new("team.microvoxel.common.block.BETiles"))
        .with_class(
            MockClass::new("team.microvoxel.client.render.TileCollectionRenderer").with_method(
                "renderBoxes",
                ArgShape::handle(),
                |args| {
                    let id = args
                        .first()
                        .and_then(ForeignValue::as_handle)
                        .map_or(0, |h| h.id);
                    let n = 1 + (id % 4) as usize;
                    Ok(ForeignValue::Boxes(vec![
                        RenderBox::new([0.0; 3], [0.5; 3]);
                        n
                    ]))
                },
            ),
        )
}

/// Every structure alternates micro-voxel cells with assembly casing.
fn mock_world() -> MockStructureSource {
    let source = MockStructureSource::new();
    for s in 0..STRUCTURES {
        let cells = (0..CELLS_PER_STRUCTURE)
            .map(|i| {
                let coord = CellCoord::new(i % 8, i / 8, 0);
                let id = s * 1000 + u64::from(i.unsigned_abs());
                let class = if i % 2 == 0 {
                    "team.microvoxel.common.block.BETiles"
                } else {
                    "org.kinetics.content.CasingBlock"
                };
                CellContent::new(coord, ForeignHandle::new(class, id))
            })
            .collect();
        source.add_structure(StructureContext::new(StructureId(s), cells));
    }
    source
}

fn load_config() -> ConfigResult<BridgeConfig> {
    match std::env::args().nth(1) {
        Some(path) => BridgeConfig::load(path),
        None => Ok(BridgeConfig::default()),
    }
}

fn main() -> ExitCode {
    init_tracing();

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║           VOXLINK BRIDGE SMOKE RUN                               ║");
    println!("║           Detect → Resolve → Render → Teardown                   ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let runtime: Arc<dyn ForeignRuntime> = Arc::new(mock_host());
    let bridge = match CapabilityBridge::new(config, runtime) {
        Ok(bridge) => bridge,
        Err(err) => {
            eprintln!("config error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let events = bridge.subscribe();
    let world = mock_world();
    let stage = bridge.config().render.stage.clone();

    println!("Bridge active: {}", bridge.is_bridge_active());

    // Tick-side discovery before the first frame.
    let scan = bridge.scan_tick(&world);
    println!(
        "Scan: {} structures, {} foreign cells, {} placeholders",
        scan.structures, scan.foreign_cells, scan.placeholders_created
    );

    let mut poses = RecordingPoses::default();
    let mut buffers = RecordingBuffers::default();
    let mut frame_us = Vec::with_capacity(FRAMES);

    println!("Rendering {FRAMES} frames...");
    let start = Instant::now();
    for frame in 0..FRAMES {
        if frame == FRAMES / 2 {
            // Mid-session disassembly.
            bridge.on_structure_teardown(StructureId(0));
        }
        buffers.clear();
        let stats = bridge.on_render_stage(
            &stage,
            &world,
            &mut poses,
            &mut buffers,
            FrameParams::default(),
        );
        frame_us.push(stats.frame_time_us);
    }
    let elapsed = start.elapsed();

    frame_us.sort_unstable();
    let first = bridge.hook().totals();
    let p50 = frame_us[frame_us.len() / 2];
    let p99 = frame_us[frame_us.len() * 99 / 100];

    println!();
    println!("═══════════════════════════════════════════════════════════════════");
    println!("RESULTS");
    println!("═══════════════════════════════════════════════════════════════════");
    println!("  Frames:          {}", first.frames);
    println!("  Computed:        {}", first.artifacts_computed);
    println!("  Submissions:     {}", first.submissions);
    println!("  Frame p50:       {p50}us");
    println!("  Frame p99:       {p99}us");
    println!("  Wall time:       {:.2}ms", elapsed.as_secs_f64() * 1000.0);
    println!("  Events:          {}", events.drain().len());
    println!();
    println!("{}", bridge.status_summary());

    // Half the cells of every structure are foreign; structure 0 computed twice.
    let per_structure = u64::from(CELLS_PER_STRUCTURE.unsigned_abs()) / 2;
    let expected = per_structure * (STRUCTURES + 1);
    if bridge.is_bridge_active() && first.artifacts_computed == expected {
        println!("✓ SMOKE RUN PASSED");
        ExitCode::SUCCESS
    } else {
        println!(
            "✗ SMOKE RUN FAILED: expected {expected} computations, got {}",
            first.artifacts_computed
        );
        ExitCode::FAILURE
    }
}

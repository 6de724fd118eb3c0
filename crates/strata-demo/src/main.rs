//! Headless walkthrough: builds a few synthetic tiles, renders three frames
//! offscreen, and runs a hit test at the view center.

use std::sync::Arc;

use anyhow::{Context, Result};
use strata_engine::coords::{Coord, Extent};
use strata_engine::device::{Gpu, GpuInit};
use strata_engine::logging::{init_logging, LoggingConfig};
use strata_engine::paint::Color;
use strata_engine::render::{RenderBackend, RenderCtx, RenderTarget, WgpuBackend};
use strata_vector::{
    Feature, FeatureId, FrameState, Geometry, LayerOptions, LayerProperties, MemoryTileSource,
    Style, TileGrid, TileLayerRenderer, TileSource,
};

const VIEW_SIZE: [u32; 2] = [512, 512];

fn main() -> Result<()> {
    init_logging(match std::env::var("STRATA_LOG") {
        Ok(filter) => LoggingConfig::with_filter(filter),
        Err(_) => LoggingConfig::default(),
    });

    let init = GpuInit {
        force_fallback_adapter: std::env::var_os("STRATA_FALLBACK_ADAPTER").is_some(),
        ..GpuInit::default()
    };
    let gpu = Gpu::headless_blocking(init)?;
    let mut backend = WgpuBackend::from_gpu(&gpu);
    let target = gpu.offscreen_target(VIEW_SIZE[0], VIEW_SIZE[1])?;

    let grid = TileGrid::xyz(Extent::new(0.0, 0.0, 1024.0, 1024.0), 3, 256)
        .context("invalid demo tile grid")?;
    let mut source = MemoryTileSource::new(grid);
    populate(&mut source);

    let layer = LayerProperties::new()
        .with_style(Style::fill(Color::from_rgba(40, 120, 200, 0.8)).with_stroke(Color::BLACK, 2.0));
    let mut renderer = TileLayerRenderer::new(LayerOptions::default());

    let center = Coord::new(512.0, 512.0);
    for (index, resolution) in [(1, 1.0), (2, 1.0), (3, 0.75)] {
        let mut frame = FrameState::new(index, center, resolution, 0.0, 1.0, VIEW_SIZE);
        if !renderer.prepare_frame(&mut frame, &layer, &mut source, &mut backend) {
            log::info!("frame {index}: nothing to draw");
            continue;
        }
        for (coord, err) in renderer.last_errors() {
            log::warn!("frame {index}: tile {coord} failed: {err}");
        }

        backend.clear_target();
        renderer.compose_frame(&frame, &layer, &source, &mut backend);

        let mut encoder = gpu.begin_frame();
        let ctx = RenderCtx::for_offscreen(&target, gpu.init().frame_format);
        backend.encode_frame(&ctx, &mut RenderTarget::new(&mut encoder, &target.view));
        gpu.submit(encoder);

        let stats = renderer.stats();
        log::info!(
            "frame {index}: {} tiles drawn, {} groups built, {} triangulations, {} live buffers",
            stats.tiles_drawn,
            stats.groups_built,
            stats.triangulations,
            backend.live_buffers()
        );

        if index == 3 {
            let hit = renderer.for_each_feature_at_coordinate(
                Coord::new(400.0, 600.0),
                &frame,
                &source,
                &mut backend,
                |feature| Some(feature.id()),
            )?;
            match hit {
                Some(id) => log::info!("hit feature {}", id.0),
                None => log::info!("no feature at probe"),
            }
        }
    }

    renderer.release_all(&mut source, &mut backend);
    Ok(())
}

/// One square per z2 tile plus a street crossing the whole grid.
fn populate(source: &mut MemoryTileSource) {
    let grid = source.tile_grid().clone();
    let street = Arc::new(Feature::new(
        FeatureId(9000),
        Geometry::LineString(vec![Coord::new(0.0, 500.0), Coord::new(1024.0, 540.0)]),
    ));

    let Some(range) = grid.full_tile_range(2) else { return };
    for coord in range.coords(2) {
        let e = grid.tile_coord_extent(coord).buffered(-24.0);
        let ring = vec![
            Coord::new(e.min_x, e.min_y),
            Coord::new(e.max_x, e.min_y),
            Coord::new(e.max_x, e.max_y),
            Coord::new(e.min_x, e.max_y),
        ];
        let id = FeatureId((coord.y * 4 + coord.x) as u64);
        let block = Arc::new(Feature::new(id, Geometry::Polygon(vec![ring])));
        source.set_loaded(coord, vec![block, street.clone()]);
    }
}

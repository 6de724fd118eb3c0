use std::sync::Arc;

use super::TileCoord;
use crate::feature::Feature;
use crate::replay::ReplayGroup;

/// Load lifecycle: `Idle -> Loading -> {Loaded | Error | Empty}`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TileState {
    Idle,
    Loading,
    Loaded,
    Error,
    Empty,
}

impl TileState {
    /// Whether a tile in this state can be drawn as-is. `Error` only counts when
    /// interim substitution for failed tiles is disabled.
    pub fn is_drawable(self, use_interim_tiles_on_error: bool) -> bool {
        match self {
            TileState::Loaded | TileState::Empty => true,
            TileState::Error => !use_interim_tiles_on_error,
            TileState::Idle | TileState::Loading => false,
        }
    }
}

/// Cached batch of a tile and the stamps it was built with.
#[derive(Debug, Default)]
pub struct ReplayState {
    pub dirty: bool,
    /// `None` until a batch was built.
    pub rendered_revision: Option<u64>,
    pub rendered_render_order: Option<u64>,
    pub resolution: Option<f64>,
    pub replay_group: Option<ReplayGroup>,
}

impl ReplayState {
    /// A cached batch is reusable only if nothing it depends on changed.
    pub fn is_reusable(&self, revision: u64, render_order: Option<u64>, resolution: f64) -> bool {
        !self.dirty
            && self.rendered_revision == Some(revision)
            && self.rendered_render_order == render_order
            && self.resolution == Some(resolution)
    }

    pub(crate) fn stamp(&mut self, revision: u64, render_order: Option<u64>, resolution: f64) {
        self.dirty = false;
        self.rendered_revision = Some(revision);
        self.rendered_render_order = render_order;
        self.resolution = Some(resolution);
    }
}

/// One tile: its address, load state, features, and cached batch.
#[derive(Debug)]
pub struct Tile {
    coord: TileCoord,
    state: TileState,
    features: Vec<Arc<Feature>>,
    pub replay_state: ReplayState,
    pub(crate) last_used: u64,
}

impl Tile {
    pub fn new(coord: TileCoord) -> Self {
        Self {
            coord,
            state: TileState::Idle,
            features: Vec::new(),
            replay_state: ReplayState::default(),
            last_used: 0,
        }
    }

    #[inline]
    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    #[inline]
    pub fn state(&self) -> TileState {
        self.state
    }

    #[inline]
    pub fn features(&self) -> &[Arc<Feature>] {
        &self.features
    }

    pub fn set_state(&mut self, state: TileState) {
        if self.state != state {
            log::trace!("tile {}: {:?} -> {:?}", self.coord, self.state, state);
            self.state = state;
        }
    }

    /// Completes loading with `features` and invalidates any cached batch.
    pub fn set_loaded(&mut self, features: Vec<Arc<Feature>>) {
        self.features = features;
        self.set_state(TileState::Loaded);
        self.mark_dirty();
    }

    /// Forces a rebuild on the next frame that draws this tile.
    pub fn mark_dirty(&mut self) {
        self.replay_state.dirty = true;
    }

    pub fn is_drawable(&self, use_interim_tiles_on_error: bool) -> bool {
        self.state.is_drawable(use_interim_tiles_on_error)
    }
}

//! The tile manager (spec §4.J): partitions the image, orders the tiles,
//! and drives their lifecycle as devices acquire and release them.

use crate::chunk::ResumableChunk;
use crate::grid::{ImageParams, TileGrid};
use crate::order::{compute_order, TileOrder};
use crate::tile::{TileHandle, TileRecord, TileState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileManagerConfig {
    pub image: ImageParams,
    pub resolution_divider: u32,
    pub order: TileOrder,
    pub schedule_denoising: bool,
    pub progressive_refine: bool,
    pub chunk: ResumableChunk,
    pub target_samples: u32,
}

#[derive(Debug)]
pub struct TileManager {
    config: TileManagerConfig,
    grid: TileGrid,
    visitation_order: Vec<usize>,
    records: Vec<TileRecord>,
    sample_range: (u32, u32),
}

impl TileManager {
    pub fn new(config: TileManagerConfig) -> Self {
        let mut manager = TileManager {
            config,
            grid: TileGrid::build(config.image, config.resolution_divider.max(1)),
            visitation_order: Vec::new(),
            records: Vec::new(),
            sample_range: (0, 0),
        };
        manager.rebuild();
        manager
    }

    /// Discards all tile state and rebuilds the grid from `config`. Per
    /// spec, a `reset()` with a smaller resolution divider throws away
    /// whatever was previously in flight.
    pub fn reset(&mut self, config: TileManagerConfig) {
        self.config = config;
        self.grid = TileGrid::build(config.image, config.resolution_divider.max(1));
        self.rebuild();
    }

    fn rebuild(&mut self) {
        self.visitation_order = compute_order(self.config.order, self.grid.cols, self.grid.rows);
        self.records = (0..self.grid.len())
            .map(|i| TileRecord::new(self.grid.rect(i)))
            .collect();
        self.sample_range = self.config.chunk.sample_range(self.config.target_samples);
    }

    pub fn tile_count(&self) -> usize {
        self.records.len()
    }

    /// Pops the next Pending tile this device may claim: either one it
    /// already owns (progressive-refine stickiness) or an unclaimed one.
    pub fn next_tile(&mut self, device_index: u32) -> Option<TileHandle> {
        let total_for_tile = self.sample_range.1;
        for &idx in &self.visitation_order {
            let rec = &self.records[idx];
            if rec.state != TileState::Pending {
                continue;
            }
            if let Some(owner) = rec.owning_device {
                if owner != device_index {
                    continue;
                }
            }
            let start_sample = self.sample_range.0 + rec.samples_done;
            let num_samples = total_for_tile.saturating_sub(rec.samples_done);
            if num_samples == 0 {
                continue;
            }
            let rect = rec.rect;
            let rec = &mut self.records[idx];
            rec.begin_render(device_index);
            return Some(TileHandle {
                index: idx,
                rect,
                device_index,
                start_sample,
                num_samples,
            });
        }
        None
    }

    /// Marks a Rendering tile Done (or NeedDenoise, per config). Returns
    /// true once the tile has left the pipeline entirely; `release_buffers`
    /// tells the caller whether it is safe to free the tile's buffer now.
    pub fn finish_tile(&mut self, tile_index: usize, release_buffers: &mut bool) -> bool {
        let rec = &mut self.records[tile_index];
        rec.samples_done = self.sample_range.1;
        rec.finish_render(self.config.schedule_denoising);
        let left_pipeline = rec.state == TileState::Done;
        *release_buffers = left_pipeline && !self.config.progressive_refine;
        left_pipeline
    }

    /// Pops the next NeedDenoise tile, transitioning it to Denoising.
    pub fn next_denoise_tile(&mut self) -> Option<usize> {
        for &idx in &self.visitation_order {
            if self.records[idx].state == TileState::NeedDenoise {
                self.records[idx].begin_denoise();
                return Some(idx);
            }
        }
        None
    }

    pub fn finish_denoising(&mut self, tile_index: usize) {
        self.records[tile_index].finish_denoise();
    }

    /// The 3x3 neighborhood of `tile_index` for denoise read access;
    /// entries outside the image are `None`.
    pub fn neighbor_tiles(&self, tile_index: usize) -> [Option<usize>; 9] {
        let (col, row) = self.grid.col_row(tile_index);
        let mut out = [None; 9];
        let mut slot = 0;
        for dr in -1i32..=1 {
            for dc in -1i32..=1 {
                let nc = col as i32 + dc;
                let nr = row as i32 + dr;
                out[slot] = if nc >= 0 && nr >= 0 {
                    self.grid.index_of(nc as u32, nr as u32)
                } else {
                    None
                };
                slot += 1;
            }
        }
        out
    }

    pub fn no_pending_tiles(&self) -> bool {
        !self.records.iter().any(|r| r.state == TileState::Pending)
    }

    pub fn is_finished(&self) -> bool {
        self.records.iter().all(|r| r.state == TileState::Done)
    }

    /// Progressive refine: returns every Done tile to Pending (preserving
    /// `owning_device`) so another round of samples can be scheduled.
    /// Called after `set_target_samples` raises the sample target.
    pub fn requeue_for_more_samples(&mut self) {
        for rec in &mut self.records {
            if rec.state == TileState::Done && rec.samples_done < self.sample_range.1 {
                rec.state = TileState::Pending;
            }
        }
    }

    /// Per spec §4.K.5: samples may only be increased while running; a
    /// decrease is a silent no-op.
    pub fn set_target_samples(&mut self, new_total: u32) {
        if new_total <= self.config.target_samples {
            return;
        }
        self.config.target_samples = new_total;
        self.sample_range = self.config.chunk.sample_range(new_total);
        self.requeue_for_more_samples();
    }
}

//! Drives one run: builds the render pool, prepares the store, then renders
//! and cuts every meta-tile.
//!
//! Every meta-tile is queued up front and render workers, one per pool slot,
//! take them from the queue. Cutting happens on a dedicated rayon pool that
//! the calling thread never joins as a worker, so a render worker is free to
//! render again as soon as its image is handed over. After the first failure
//! queued meta-tiles are skipped; work already running finishes and the
//! render pool is always destroyed before returning.

use crate::{
    config::Task,
    cutter::{CutSummary, TileCutter},
    enumerator::all_meta_tiles,
    error::Error,
    meta_tile::MetaTile,
    render_pool::RenderPool,
    renderer::{RenderOptions, Renderer, RendererFactory},
    store::TileStore,
    time_track::{self, Metric, StatsMsg},
};
use crossbeam_deque::{Injector, Steal};
use image::RgbaImage;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc::Sender,
    },
    thread,
    time::Instant,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Created,
    PoolBuilt,
    StoreReady,
    Rendering,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub location: String,
    pub meta_tiles: usize,
    pub inserted: usize,
    pub skipped: usize,
}

pub struct Pipeline<'a> {
    task: &'a Task,
    stage: Stage,
}

/// State shared by the render workers and the cut jobs.
struct Shared {
    aborted: AtomicBool,
    first_error: Mutex<Option<Error>>,
    done: AtomicUsize,
    inserted: AtomicUsize,
    skipped: AtomicUsize,
}

impl Shared {
    fn fail(&self, error: Error) {
        log::error!("{error}");

        self.aborted.store(true, Ordering::SeqCst);

        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(error);
    }

    fn record(
        &self,
        summary: CutSummary,
        total: usize,
        meta_tile: MetaTile,
        stats_tx: &Sender<StatsMsg>,
    ) {
        self.inserted.fetch_add(summary.inserted, Ordering::SeqCst);

        self.skipped.fetch_add(summary.skipped, Ordering::SeqCst);

        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;

        let _ = stats_tx.send(StatsMsg::Progress(done, total, meta_tile));
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

impl<'a> Pipeline<'a> {
    pub fn new(task: &'a Task) -> Self {
        Self {
            task,
            stage: Stage::Created,
        }
    }

    #[cfg(test)]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, stage: Stage) {
        log::info!("Pipeline {:?} -> {:?}", self.stage, stage);

        self.stage = stage;
    }

    /// Runs to completion; the store is opened only after the pool is built.
    pub fn run<F, S>(
        &mut self,
        factory: F,
        open_store: impl FnOnce() -> Result<S, Error>,
    ) -> Result<RunSummary, Error>
    where
        F: RendererFactory,
        S: TileStore,
    {
        let result = self.try_run(factory, open_store);

        match result {
            Ok(_) => self.advance(Stage::Completed),
            Err(_) => self.advance(Stage::Aborted),
        }

        result
    }

    fn try_run<F, S>(
        &mut self,
        mut factory: F,
        open_store: impl FnOnce() -> Result<S, Error>,
    ) -> Result<RunSummary, Error>
    where
        F: RendererFactory,
        S: TileStore,
    {
        let task = self.task;

        // validates boxes and zooms before anything is rendered
        let total = all_meta_tiles(&task.bboxes, task.zoom_min, task.zoom_max)?.count();

        let cut_pool = ThreadPoolBuilder::new()
            .num_threads(task.cut_threads)
            .thread_name(|i| format!("cut-{i}"))
            .build()?;

        factory.prepare()?;

        let pool = RenderPool::new(factory, task.pool_size)?;

        self.advance(Stage::PoolBuilt);

        let result = self.prepare_and_render(&pool, &cut_pool, open_store, total);

        pool.destroy();

        result
    }

    fn prepare_and_render<F, S>(
        &mut self,
        pool: &RenderPool<F>,
        cut_pool: &ThreadPool,
        open_store: impl FnOnce() -> Result<S, Error>,
        total: usize,
    ) -> Result<RunSummary, Error>
    where
        F: RendererFactory,
        S: TileStore,
    {
        let store = open_store()?;

        store.ensure_schema(&self.task.table_spec())?;

        self.advance(Stage::StoreReady);

        self.advance(Stage::Rendering);

        let (stats_tx, stats_thread) = time_track::new();

        let result = self.render_all(pool, cut_pool, &store, total, &stats_tx);

        drop(stats_tx);

        if stats_thread.join().is_err() {
            log::warn!("Stats collector panicked");
        }

        let summary = result?;

        log::info!(
            "Rendered {} meta-tile(s) into {}: {} tile(s) inserted, {} skipped",
            summary.meta_tiles,
            summary.location,
            summary.inserted,
            summary.skipped
        );

        Ok(summary)
    }

    fn render_all<F, S>(
        &self,
        pool: &RenderPool<F>,
        cut_pool: &ThreadPool,
        store: &S,
        total: usize,
        stats_tx: &Sender<StatsMsg>,
    ) -> Result<RunSummary, Error>
    where
        F: RendererFactory,
        S: TileStore,
    {
        let task = self.task;

        let queue = Injector::<MetaTile>::new();

        for meta_tile in all_meta_tiles(&task.bboxes, task.zoom_min, task.zoom_max)? {
            queue.push(meta_tile);
        }

        let shared = Shared {
            aborted: AtomicBool::new(false),
            first_error: Mutex::new(None),
            done: AtomicUsize::new(0),
            inserted: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        };

        let cutter = TileCutter::new(
            store,
            &task.table_name,
            task.tile_size,
            task.format,
            task.jpeg_quality,
            stats_tx.clone(),
        );

        log::info!(
            "Rendering {total} meta-tile(s) with {} renderer(s) and {} cut thread(s)",
            pool.capacity(),
            cut_pool.current_num_threads()
        );

        let state = &shared;
        let queue = &queue;
        let cutter = &cutter;

        // the calling thread only joins the render workers; cuts keep every
        // thread of the cut pool
        cut_pool.in_place_scope(|cuts| {
            thread::scope(|workers| {
                for _ in 0..pool.capacity() {
                    workers.spawn(move || {
                        loop {
                            let meta_tile = match queue.steal() {
                                Steal::Success(meta_tile) => meta_tile,
                                Steal::Retry => continue,
                                Steal::Empty => break,
                            };

                            if state.is_aborted() {
                                log::debug!("Skipping {meta_tile} after a failure");

                                continue;
                            }

                            let image = match self.render_meta_tile(pool, &meta_tile, stats_tx) {
                                Ok(image) => image,
                                Err(e) => {
                                    state.fail(e);

                                    continue;
                                }
                            };

                            cuts.spawn(move |_| match cutter.cut(&meta_tile, &image) {
                                Ok(summary) => state.record(summary, total, meta_tile, stats_tx),
                                Err(e) => state.fail(e),
                            });
                        }
                    });
                }
            });
        });

        if shared.is_aborted() {
            log::warn!(
                "Stopped after {} of {total} meta-tile(s)",
                shared.done.load(Ordering::SeqCst)
            );
        }

        if let Some(error) = shared
            .first_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
        {
            return Err(error);
        }

        Ok(RunSummary {
            location: store.location(),
            meta_tiles: shared.done.into_inner(),
            inserted: shared.inserted.into_inner(),
            skipped: shared.skipped.into_inner(),
        })
    }

    fn render_meta_tile<F: RendererFactory>(
        &self,
        pool: &RenderPool<F>,
        meta_tile: &MetaTile,
        stats_tx: &Sender<StatsMsg>,
    ) -> Result<RgbaImage, Error> {
        let size = self.task.meta_tile_size;

        let instant = Instant::now();

        let mut renderer = pool.acquire()?;

        time_track::record(stats_tx, Metric::Acquire, instant);

        let instant = Instant::now();

        renderer.set_view(&meta_tile.extent());

        log::debug!("Rendering {meta_tile}");

        // on error the guard returns the renderer to the pool
        let image = renderer.render(
            size,
            size,
            &RenderOptions {
                scale: self.task.scale,
                zoom: meta_tile.zoom(),
            },
        )?;

        pool.release(renderer);

        time_track::record(stats_tx, Metric::Render, instant);

        Ok(image)
    }
}

mod args;
mod bbox;
mod config;
mod cutter;
mod encode;
mod enumerator;
mod error;
mod geo;
mod gpkg;
mod meta_tile;
mod pipeline;
mod render_pool;
mod renderer;
mod schema;
mod store;
mod style;
mod tile;
mod time_track;
mod warp;

use args::Args;
use clap::Parser;
use config::{Task, TaskConfig};
use gpkg::GeoPackage;
use pipeline::Pipeline;
use renderer::GdalRendererFactory;
use std::{
    env,
    path::{Path, PathBuf},
    process::ExitCode,
    thread::available_parallelism,
};
use style::Style;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = try_main() {
        log::error!("{e}");

        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn try_main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_pool_size = available_parallelism().map_or(1, |n| n.get());

    let task = Task::resolve(TaskConfig::from_args(args)?, default_pool_size)?;

    let style_path = absolute(&task.style_path)?;

    let gpkg_path = absolute(&task.gpkg_path)?;

    // relative references in the style resolve against its directory
    if let Some(style_dir) = style_path.parent() {
        env::set_current_dir(style_dir)
            .map_err(|e| format!("Error entering {}: {e}", style_dir.display()))?;
    }

    let style = Style::new(&style_path, &task.style_params)?;

    let factory = GdalRendererFactory::new(style, task.transform_pipeline.clone());

    let summary = Pipeline::new(&task).run(factory, || GeoPackage::open(&gpkg_path))?;

    log::info!(
        "Finished {}: {} meta-tile(s), {} tile(s) added, {} already present",
        summary.location,
        summary.meta_tiles,
        summary.inserted,
        summary.skipped
    );

    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf, String> {
    std::path::absolute(path).map_err(|e| format!("Error resolving {}: {e}", path.display()))
}

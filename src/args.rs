use crate::encode::Format;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// JSON task configuration; options given here override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Bounding box in degrees: <west> <south> <east> <north>
    #[arg(long, num_args = 4, allow_hyphen_values = true, value_names = ["WEST", "SOUTH", "EAST", "NORTH"])]
    pub bbox: Option<Vec<f64>>,

    /// Min zoom level
    #[arg(long)]
    pub zmin: Option<u8>,

    /// Max zoom level
    #[arg(long)]
    pub zmax: Option<u8>,

    /// GDAL raster or VRT document to render tiles from
    #[arg(long)]
    pub style: Option<PathBuf>,

    /// Style document parameter <name>:<value>, replaces ${name}; repeatable
    #[arg(long = "style-param")]
    pub style_params: Vec<String>,

    /// Output *.gpkg file [default: <style name>.gpkg]
    #[arg(long)]
    pub gpkg: Option<PathBuf>,

    /// Tile table name [default: style name]
    #[arg(long)]
    pub table: Option<String>,

    /// Human readable label of the tile table
    #[arg(long)]
    pub table_label: Option<String>,

    /// Description of the tile table
    #[arg(long)]
    pub table_desc: Option<String>,

    /// Tile image scale; tiles are 256 * scale pixels [default: 1.0]
    #[arg(long)]
    pub scale: Option<f64>,

    /// Tile image format [default: png]
    #[arg(long, value_enum)]
    pub format: Option<Format>,

    /// JPEG quality [default: 85]
    #[arg(long)]
    pub jpeg_quality: Option<u8>,

    /// Number of renderers working in parallel [default: available parallelism]
    #[arg(long)]
    pub num_threads: Option<u16>,

    /// Number of threads cutting and storing tiles [default: available parallelism]
    #[arg(long)]
    pub cut_threads: Option<u16>,

    /// Projection transformation pipeline
    #[arg(long)]
    pub transform_pipeline: Option<String>,
}

//! Task configuration: a JSON file and/or command line options resolved into
//! one immutable [`Task`].

use crate::{
    args::Args,
    bbox::{BBox, BoundingBox},
    encode::Format,
    enumerator::validate_zoom,
    error::Error,
    geo::WEB_MERCATOR_EXTENT,
    meta_tile::META_TILE_SPAN,
    schema::is_valid_table_name,
    store::TableSpec,
};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const BASE_TILE_SIZE: f64 = 256.0;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct TaskConfig {
    pub bbox: Option<[f64; 4]>,
    pub zoom_min: Option<u8>,
    pub zoom_max: Option<u8>,
    pub style: Option<PathBuf>,
    pub style_params: Vec<String>,
    pub gpkg: Option<PathBuf>,
    pub table: Option<String>,
    pub table_label: Option<String>,
    pub table_desc: Option<String>,
    pub scale: Option<f64>,
    pub format: Option<Format>,
    pub jpeg_quality: Option<u8>,
    pub num_threads: Option<u16>,
    pub cut_threads: Option<u16>,
    pub transform_pipeline: Option<String>,
}

impl TaskConfig {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid JSON: {e}")))
    }

    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let json = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Error reading {}: {e}", path.display())))?;

        Self::from_json(&json)
    }

    /// Reads `--config` if given and lays the other options over it.
    pub fn from_args(args: Args) -> Result<Self, Error> {
        let base = args
            .config
            .as_deref()
            .map(Self::from_file)
            .transpose()?
            .unwrap_or_default();

        let bbox = args
            .bbox
            .map(|bbox| {
                <[f64; 4]>::try_from(bbox)
                    .map_err(|_| Error::Config("bbox needs exactly 4 values".into()))
            })
            .transpose()?;

        Ok(Self {
            bbox: bbox.or(base.bbox),
            zoom_min: args.zmin.or(base.zoom_min),
            zoom_max: args.zmax.or(base.zoom_max),
            style: args.style.or(base.style),
            style_params: if args.style_params.is_empty() {
                base.style_params
            } else {
                args.style_params
            },
            gpkg: args.gpkg.or(base.gpkg),
            table: args.table.or(base.table),
            table_label: args.table_label.or(base.table_label),
            table_desc: args.table_desc.or(base.table_desc),
            scale: args.scale.or(base.scale),
            format: args.format.or(base.format),
            jpeg_quality: args.jpeg_quality.or(base.jpeg_quality),
            num_threads: args.num_threads.or(base.num_threads),
            cut_threads: args.cut_threads.or(base.cut_threads),
            transform_pipeline: args.transform_pipeline.or(base.transform_pipeline),
        })
    }
}

/// Validated, read-only snapshot of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub bbox: BoundingBox,
    /// `bbox` split at the antimeridian.
    pub bboxes: Vec<BoundingBox>,
    pub zoom_min: u8,
    pub zoom_max: u8,
    pub scale: f64,
    pub tile_size: u32,
    pub meta_tile_size: u32,
    pub style_path: PathBuf,
    pub style_params: Vec<String>,
    pub gpkg_path: PathBuf,
    pub table_name: String,
    pub table_label: Option<String>,
    pub table_desc: Option<String>,
    pub format: Format,
    pub jpeg_quality: u8,
    pub pool_size: usize,
    pub cut_threads: usize,
    pub transform_pipeline: Option<String>,
}

impl Task {
    pub fn resolve(config: TaskConfig, default_pool_size: usize) -> Result<Self, Error> {
        let [west, south, east, north] = config
            .bbox
            .ok_or_else(|| Error::Config("missing bbox".into()))?;

        let bbox = BoundingBox::new(west, south, east, north);

        let bboxes = bbox.normalize()?;

        let zoom_min = config
            .zoom_min
            .ok_or_else(|| Error::Config("missing min zoom".into()))?;

        let zoom_max = config
            .zoom_max
            .ok_or_else(|| Error::Config("missing max zoom".into()))?;

        validate_zoom(zoom_min)?;

        validate_zoom(zoom_max)?;

        if zoom_min > zoom_max {
            return Err(Error::Config(format!(
                "min zoom {zoom_min} is greater than max zoom {zoom_max}"
            )));
        }

        let style_path = config
            .style
            .ok_or_else(|| Error::Config("missing style".into()))?;

        let scale = config.scale.unwrap_or(1.0);

        if !(scale.is_finite() && scale > 0.0) {
            return Err(Error::Config(format!("invalid scale {scale}")));
        }

        let tile_size = (BASE_TILE_SIZE * scale).round() as u32;

        if tile_size == 0 {
            return Err(Error::Config(format!("scale {scale} yields empty tiles")));
        }

        let style_name = style_name(&style_path);

        let gpkg_path = with_gpkg_extension(
            config
                .gpkg
                .unwrap_or_else(|| PathBuf::from(format!("{style_name}.gpkg"))),
        );

        let table_name = config.table.unwrap_or(style_name);

        if !is_valid_table_name(&table_name) {
            return Err(Error::Config(format!("invalid table name: {table_name}")));
        }

        let jpeg_quality = config.jpeg_quality.unwrap_or(85);

        if !(1..=100).contains(&jpeg_quality) {
            return Err(Error::Config(format!("invalid JPEG quality {jpeg_quality}")));
        }

        let pool_size = config
            .num_threads
            .map_or(default_pool_size, usize::from)
            .max(1);

        let cut_threads = config
            .cut_threads
            .map_or(default_pool_size, usize::from)
            .max(1);

        Ok(Self {
            bbox,
            bboxes,
            zoom_min,
            zoom_max,
            scale,
            tile_size,
            meta_tile_size: tile_size * META_TILE_SPAN,
            style_path,
            style_params: config.style_params,
            gpkg_path,
            table_name,
            table_label: config.table_label,
            table_desc: config.table_desc,
            format: config.format.unwrap_or_default(),
            jpeg_quality,
            pool_size,
            cut_threads,
            transform_pipeline: config.transform_pipeline,
        })
    }

    pub fn table_spec(&self) -> TableSpec {
        let contents_bounds = self
            .bboxes
            .iter()
            .map(BoundingBox::to_meters)
            .reduce(|a, b| a.union(&b))
            .unwrap_or_else(|| self.bbox.to_meters());

        TableSpec {
            name: self.table_name.clone(),
            label: self.table_label.clone(),
            description: self.table_desc.clone(),
            contents_bounds,
            matrix_set_bounds: BBox {
                min_x: -WEB_MERCATOR_EXTENT,
                max_x: WEB_MERCATOR_EXTENT,
                min_y: -WEB_MERCATOR_EXTENT,
                max_y: WEB_MERCATOR_EXTENT,
            },
            zoom_min: self.zoom_min,
            zoom_max: self.zoom_max,
            tile_size: self.tile_size,
        }
    }
}

/// File stem with non-word characters replaced by single underscores.
fn style_name(style_path: &Path) -> String {
    let stem = style_path
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default();

    let mut name = String::with_capacity(stem.len());

    for c in stem.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '_' {
            c
        } else {
            '_'
        };

        if !(c == '_' && name.ends_with('_')) {
            name.push(c);
        }
    }

    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }

    if name.is_empty() { "tiles".into() } else { name }
}

fn with_gpkg_extension(path: PathBuf) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == "gpkg") {
        path
    } else {
        let mut path = path.into_os_string();

        path.push(".gpkg");

        path.into()
    }
}

use crate::{
    bbox::BBox,
    error::Error,
    style::{Style, StyleDocument},
    warp,
};
use gdal::{Dataset, DriverManager, Metadata, spatial_ref::SpatialRef};
use image::RgbaImage;

const BAND_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub scale: f64,
    /// Exposed to the renderer as a render-time variable.
    pub zoom: u8,
}

/// One stateful rendering handle; renders one image at a time.
pub trait Renderer: Send {
    /// Sets the EPSG:3857 extent of the next render.
    fn set_view(&mut self, extent: &BBox);

    fn render(
        &mut self,
        width: u32,
        height: u32,
        options: &RenderOptions,
    ) -> Result<RgbaImage, Error>;
}

pub trait RendererFactory: Send + Sync {
    type Renderer: Renderer;

    /// Runs once before any renderer is created.
    fn prepare(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn create(&self) -> Result<Self::Renderer, Error>;
}

/// Renders by warping a GDAL source into an in-memory EPSG:3857 raster.
pub struct GdalRenderer {
    source: Dataset,
    transform_pipeline: Option<String>,
    view: Option<BBox>,
}

impl GdalRenderer {
    pub fn open(document: &StyleDocument, transform_pipeline: Option<&str>) -> Result<Self, Error> {
        let source = Dataset::open(document.as_path())
            .map_err(|e| Error::RenderPool(format!("Error opening style: {e}")))?;

        let band_count = source.raster_count();

        if band_count != 3 && band_count != BAND_COUNT {
            return Err(Error::RenderPool(format!(
                "Expecting 3 or 4 bands, got {band_count}"
            )));
        }

        Ok(Self {
            source,
            transform_pipeline: transform_pipeline.map(str::to_string),
            view: None,
        })
    }
}

impl Renderer for GdalRenderer {
    fn set_view(&mut self, extent: &BBox) {
        self.view = Some(*extent);
    }

    fn render(
        &mut self,
        width: u32,
        height: u32,
        options: &RenderOptions,
    ) -> Result<RgbaImage, Error> {
        let view = self.view.ok_or_else(|| Error::render("view", "no view set"))?;

        let target = format!("{view:?}");

        let err = |e: gdal::errors::GdalError| Error::render(&target, e);

        let band_count = self.source.raster_count();

        let mut target_ds = DriverManager::get_driver_by_name("MEM")
            .map_err(err)?
            .create("", width as usize, height as usize, band_count)
            .map_err(err)?;

        target_ds
            .set_geo_transform(&[
                view.min_x,                                   // Top-left x
                (view.max_x - view.min_x) / f64::from(width), // Pixel width
                0.0,                                          // Rotation (x-axis)
                view.max_y,                                   // Top-left y
                0.0,                                          // Rotation (y-axis)
                -((view.max_y - view.min_y) / f64::from(height)), // Pixel height (negative for top-down)
            ])
            .map_err(err)?;

        target_ds
            .set_spatial_ref(&SpatialRef::from_epsg(3857).map_err(err)?)
            .map_err(err)?;

        target_ds
            .set_metadata_item("ZOOM", &options.zoom.to_string(), "")
            .map_err(err)?;

        target_ds
            .set_metadata_item("SCALE", &options.scale.to_string(), "")
            .map_err(err)?;

        warp::warp(
            &self.source,
            &target_ds,
            (width, height),
            self.transform_pipeline.as_deref(),
        )?;

        let (w, h) = (width as usize, height as usize);

        let buffers = (1..=band_count)
            .map(|band| {
                target_ds
                    .rasterband(band)
                    .and_then(|band| band.read_as::<u8>((0, 0), (w, h), (w, h), None))
                    .map_err(err)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut out_buffer = vec![255u8; w * h * BAND_COUNT];

        for (i, buffer) in buffers.iter().enumerate() {
            for (offset, b) in buffer.data().iter().enumerate() {
                out_buffer[offset * BAND_COUNT + i] = *b;
            }
        }

        RgbaImage::from_vec(width, height, out_buffer)
            .ok_or_else(|| Error::render(&target, "invalid image dimensions"))
    }
}

/// Builds [`GdalRenderer`]s from a preprocessed style.
pub struct GdalRendererFactory {
    style: Style,
    transform_pipeline: Option<String>,
    document: Option<StyleDocument>,
}

impl GdalRendererFactory {
    pub fn new(style: Style, transform_pipeline: Option<String>) -> Self {
        Self {
            style,
            transform_pipeline,
            document: None,
        }
    }
}

impl RendererFactory for GdalRendererFactory {
    type Renderer = GdalRenderer;

    fn prepare(&mut self) -> Result<(), Error> {
        self.document = Some(self.style.preprocess()?);

        Ok(())
    }

    fn create(&self) -> Result<GdalRenderer, Error> {
        let document = self
            .document
            .as_ref()
            .ok_or_else(|| Error::RenderPool("style not prepared".into()))?;

        GdalRenderer::open(document, self.transform_pipeline.as_deref())
    }
}

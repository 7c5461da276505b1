use crate::error::Error;
use gdal::Dataset;
use gdal_sys::{
    CPLErr, GDALChunkAndWarpImage, GDALCreateGenImgProjTransformer2, GDALCreateWarpOperation,
    GDALCreateWarpOptions, GDALDestroyGenImgProjTransformer, GDALDestroyWarpOperation,
    GDALDestroyWarpOptions, GDALGenImgProjTransform, GDALResampleAlg,
    GDALWarpInitDefaultBandMapping,
};
use std::{
    ffi::{CString, c_char},
    ptr,
};

/// Warps the whole `source_ds` into `target_ds`, which must carry its own
/// geotransform and spatial reference.
pub fn warp(
    source_ds: &Dataset,
    target_ds: &Dataset,
    size: (u32, u32),
    pipeline: Option<&str>,
) -> Result<(), Error> {
    let option = pipeline
        .map(|pipeline| CString::new(format!("COORDINATE_OPERATION={pipeline}")))
        .transpose()
        .map_err(|e| Error::render("warp", format!("invalid transform pipeline: {e}")))?;

    let width = i32::try_from(size.0).map_err(|e| Error::render("warp", e))?;
    let height = i32::try_from(size.1).map_err(|e| Error::render("warp", e))?;

    unsafe {
        let mut options: Vec<*mut c_char> = match option {
            Some(ref option) => vec![option.as_ptr().cast_mut(), ptr::null_mut()],
            None => vec![ptr::null_mut()],
        };

        let gen_img_proj_transformer = GDALCreateGenImgProjTransformer2(
            source_ds.c_dataset(),
            target_ds.c_dataset(),
            options.as_mut_ptr(),
        );

        if gen_img_proj_transformer.is_null() {
            return Err(Error::render(
                "warp",
                "failed to create image projection transformer",
            ));
        }

        let warp_options = GDALCreateWarpOptions();

        (*warp_options).pTransformerArg = gen_img_proj_transformer;

        (*warp_options).pfnTransformer = Some(GDALGenImgProjTransform);

        (*warp_options).eResampleAlg = GDALResampleAlg::GRA_Lanczos;

        (*warp_options).hSrcDS = source_ds.c_dataset();

        (*warp_options).hDstDS = target_ds.c_dataset();

        (*warp_options).nDstAlphaBand = 0;

        (*warp_options).nSrcAlphaBand = 0;

        GDALWarpInitDefaultBandMapping(warp_options, source_ds.raster_count() as i32);

        let warp_operation = GDALCreateWarpOperation(warp_options);

        let result = if warp_operation.is_null() {
            CPLErr::CE_Failure
        } else {
            let result = GDALChunkAndWarpImage(warp_operation, 0, 0, width, height);

            GDALDestroyWarpOperation(warp_operation);

            result
        };

        GDALDestroyGenImgProjTransformer(gen_img_proj_transformer);

        (*warp_options).pTransformerArg = ptr::null_mut();

        GDALDestroyWarpOptions(warp_options);

        if result == CPLErr::CE_None {
            Ok(())
        } else {
            Err(Error::render(
                "warp",
                format!("ChunkAndWarpImage failed with error code: {result:?}"),
            ))
        }
    }
}

use std::sync::Arc;

use geo::AffineTransform;
use log::{info, warn};
use rayon::prelude::*;

use crate::{
    components::{
        band::{self, Band},
        cache::BlockCache,
        driver::{AccessMode, BackendDataset},
        pixel::Pixel,
        resample::ResamplePolicy,
        window::Window,
        Metadata,
    },
    errors::{RastroError, Result},
};

fn affine_from_coeffs(coeffs: [f64; 6]) -> AffineTransform {
    AffineTransform::new(
        coeffs[1], coeffs[2], coeffs[0], coeffs[4], coeffs[5], coeffs[3],
    )
}

/// An open handle to one raster resource, owning its bands.
///
/// Closing (or dropping) flushes dirty cached blocks and retires the
/// dataset's cache entries; `close` consumes the handle so a closed
/// dataset cannot be used again.
pub struct Dataset {
    name: Arc<str>,
    driver: String,
    size: (usize, usize),
    transform: Option<AffineTransform>,
    crs: Option<String>,
    metadata: Metadata,
    mode: AccessMode,
    bands: Vec<Band>,
    closed: bool,
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("name", &self.name)
            .field("driver", &self.driver)
            .field("size", &self.size)
            .field("bands", &self.bands.len())
            .field("mode", &self.mode)
            .finish()
    }
}

impl Dataset {
    pub(crate) fn from_backend(
        name: &str,
        driver: &str,
        mode: AccessMode,
        backend: BackendDataset,
        cache: &Arc<BlockCache>,
    ) -> Result<Self> {
        for band in &backend.bands {
            if band.size != backend.size {
                return Err(RastroError::OpenFailed {
                    driver: driver.to_string(),
                    name: name.to_string(),
                    reason: format!(
                        "band size {:?} differs from raster size {:?}",
                        band.size, backend.size
                    ),
                });
            }
        }
        let shared_name: Arc<str> = Arc::from(name);
        let bands = backend
            .bands
            .into_iter()
            .map(|band| Band::from_backend(band, Arc::clone(&shared_name), mode, cache))
            .collect();
        let dataset = Self {
            name: shared_name,
            driver: driver.to_string(),
            size: backend.size,
            transform: backend.geo_transform.map(affine_from_coeffs),
            crs: backend.crs,
            metadata: backend.metadata,
            mode,
            bands,
            closed: false,
        };
        info!("opened {dataset:?}");
        Ok(dataset)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn size(&self) -> (usize, usize) {
        self.size
    }

    pub fn width(&self) -> usize {
        self.size.0
    }

    pub fn height(&self) -> usize {
        self.size.1
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Affine transform mapping pixel/line to georeferenced space, when
    /// the backend supplied one.
    pub fn geo_transform(&self) -> Option<&AffineTransform> {
        self.transform.as_ref()
    }

    /// Opaque, backend-supplied spatial reference identifier.
    pub fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn band(&self, index: usize) -> Result<&Band> {
        self.bands
            .get(index)
            .ok_or(RastroError::BandIndex(index))
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    /// Reads one window from several bands into a single band-major
    /// buffer of `bands.len() * out_shape` pixels, fanning out across
    /// bands in parallel.
    pub fn read_window<T: Pixel>(
        &self,
        band_indexes: &[usize],
        window: Window,
        out_shape: (usize, usize),
        policy: ResamplePolicy,
    ) -> Result<Vec<T>> {
        let bands = band_indexes
            .iter()
            .map(|index| self.band(*index))
            .collect::<Result<Vec<_>>>()?;
        let area = out_shape.0 * out_shape.1;
        let mut out = vec![T::zero(); bands.len() * area];
        out.par_chunks_mut(area)
            .zip(bands.into_par_iter())
            .map(|(band_out, band)| band.read_window_into(window, out_shape, policy, band_out))
            .collect::<Result<Vec<()>>>()?;
        Ok(out)
    }

    /// Writes dirty blocks of every band back to the backend,
    /// attempting all bands and aggregating failures.
    pub fn flush(&self) -> Result<()> {
        let mut failures = Vec::new();
        for band in &self.bands {
            band::collect_flush_failures(band.flush(), &mut failures)?;
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RastroError::FlushFailed { failures })
        }
    }

    /// Flushes and releases the dataset's cached blocks, waiting for
    /// in-flight operations on its bands to finish.
    pub fn close(mut self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!("closing dataset `{}`", self.name);
        let mut failures = Vec::new();
        for band in &self.bands {
            band::collect_flush_failures(band.retire(), &mut failures)?;
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RastroError::FlushFailed { failures })
        }
    }
}

impl Drop for Dataset {
    fn drop(&mut self) {
        if let Err(err) = self.close_inner() {
            warn!("closing dataset `{}` failed: {err}", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{
        cache::CacheConfig,
        driver::{BackendBand, BlockIo},
        pixel::PixelType,
    };
    use std::{collections::HashMap, sync::Mutex};

    #[derive(Debug, Default)]
    struct TestIo {
        nbytes: usize,
        blocks: Mutex<HashMap<(usize, usize), Vec<u8>>>,
    }

    impl BlockIo for TestIo {
        fn read_block(&self, col: usize, row: usize) -> Result<Vec<u8>> {
            Ok(self
                .blocks
                .lock()
                .unwrap()
                .get(&(col, row))
                .cloned()
                .unwrap_or_else(|| vec![0; self.nbytes]))
        }

        fn write_block(&self, col: usize, row: usize, data: &[u8]) -> Result<()> {
            self.blocks.lock().unwrap().insert((col, row), data.to_vec());
            Ok(())
        }
    }

    fn backend_band(size: (usize, usize), block: (usize, usize), overviews: Vec<BackendBand>) -> BackendBand {
        BackendBand {
            size,
            pixel_type: PixelType::U8,
            block_size: block,
            no_data: Some(255.0),
            metadata: Metadata::new(),
            io: Arc::new(TestIo {
                nbytes: block.0 * block.1,
                blocks: Mutex::default(),
            }),
            overviews,
        }
    }

    fn open_test_dataset(bands: usize) -> (Dataset, Arc<BlockCache>) {
        let cache = Arc::new(BlockCache::new(CacheConfig::default()));
        let backend = BackendDataset {
            size: (64, 48),
            geo_transform: Some([100.0, 0.5, 0.0, 200.0, 0.0, -0.5]),
            crs: Some("EPSG:32633".to_string()),
            metadata: Metadata::from([("SOURCE".to_string(), "test".to_string())]),
            bands: (0..bands)
                .map(|_| backend_band((64, 48), (16, 16), Vec::new()))
                .collect(),
        };
        let dataset =
            Dataset::from_backend("test.img", "TEST", AccessMode::Update, backend, &cache)
                .unwrap();
        (dataset, cache)
    }

    #[test]
    fn exposes_backend_metadata() {
        let (dataset, _cache) = open_test_dataset(3);
        assert_eq!(dataset.size(), (64, 48));
        assert_eq!(dataset.band_count(), 3);
        assert_eq!(dataset.crs(), Some("EPSG:32633"));
        assert_eq!(dataset.metadata().get("SOURCE").map(String::as_str), Some("test"));
        assert_eq!(dataset.band(0).unwrap().no_data_value(), Some(255.0));
        assert!(matches!(
            dataset.band(3),
            Err(RastroError::BandIndex(3))
        ));
        let transform = dataset.geo_transform().unwrap();
        // GDAL coefficient order: origin in c/f, scale in a/e.
        assert_eq!(transform.xoff(), 100.0);
        assert_eq!(transform.yoff(), 200.0);
        assert_eq!(transform.a(), 0.5);
        assert_eq!(transform.e(), -0.5);
    }

    #[test]
    fn rejects_band_size_mismatch() {
        let cache = Arc::new(BlockCache::new(CacheConfig::default()));
        let backend = BackendDataset {
            size: (64, 48),
            geo_transform: None,
            crs: None,
            metadata: Metadata::new(),
            bands: vec![backend_band((32, 32), (16, 16), Vec::new())],
        };
        assert!(matches!(
            Dataset::from_backend("bad", "TEST", AccessMode::ReadOnly, backend, &cache),
            Err(RastroError::OpenFailed { .. })
        ));
    }

    #[test]
    fn multi_band_read_is_band_major() {
        let (dataset, _cache) = open_test_dataset(2);
        let window = Window::new(0, 0, 4, 4);
        dataset
            .band(0)
            .unwrap()
            .write_window(window, &[1u8; 16])
            .unwrap();
        dataset
            .band(1)
            .unwrap()
            .write_window(window, &[2u8; 16])
            .unwrap();
        let out: Vec<u8> = dataset
            .read_window(&[0, 1], window, (4, 4), ResamplePolicy::default())
            .unwrap();
        let array = ndarray::Array3::from_shape_vec((2, 4, 4), out).unwrap();
        assert!(array.slice(ndarray::s![0, .., ..]).iter().all(|v| *v == 1));
        assert!(array.slice(ndarray::s![1, .., ..]).iter().all(|v| *v == 2));
    }

    #[test]
    fn overviews_are_modeled_as_bands() {
        let cache = Arc::new(BlockCache::new(CacheConfig::default()));
        let overview = backend_band((32, 24), (16, 16), Vec::new());
        let backend = BackendDataset {
            size: (64, 48),
            geo_transform: None,
            crs: None,
            metadata: Metadata::new(),
            bands: vec![backend_band((64, 48), (16, 16), vec![overview])],
        };
        let dataset =
            Dataset::from_backend("ovr", "TEST", AccessMode::ReadOnly, backend, &cache).unwrap();
        let band = dataset.band(0).unwrap();
        assert_eq!(band.overview_count(), 1);
        assert_eq!(band.overview(0).unwrap().size(), (32, 24));
    }

    #[test]
    fn close_flushes_and_clears_cache() {
        let (dataset, cache) = open_test_dataset(1);
        dataset
            .band(0)
            .unwrap()
            .write_window(Window::new(0, 0, 4, 4), &[9u8; 16])
            .unwrap();
        assert!(cache.resident_blocks() > 0);
        dataset.close().unwrap();
        assert_eq!(cache.resident_blocks(), 0);
    }

    #[test]
    fn drop_is_a_best_effort_close() {
        let (dataset, cache) = open_test_dataset(1);
        dataset
            .band(0)
            .unwrap()
            .write_window(Window::new(0, 0, 2, 2), &[3u8; 4])
            .unwrap();
        drop(dataset);
        assert_eq!(cache.resident_blocks(), 0);
    }
}

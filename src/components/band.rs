use std::sync::Arc;

use log::debug;

use crate::{
    components::{
        cache::{BandId, BlockCache, BlockKey},
        driver::{AccessMode, BackendBand, BlockIo},
        pixel::{Pixel, PixelType},
        resample::{resample_into, ResamplePolicy},
        window::Window,
        Metadata,
    },
    errors::{RastroError, Result},
};

/// One raster layer of a dataset.
///
/// Translates arbitrary pixel windows into block-aligned cache
/// operations; all backend I/O goes through the shared [BlockCache].
#[derive(Debug)]
pub struct Band {
    id: BandId,
    dataset: Arc<str>,
    size: (usize, usize),
    block_size: (usize, usize),
    pixel_type: PixelType,
    no_data: Option<f64>,
    metadata: Metadata,
    mode: AccessMode,
    io: Arc<dyn BlockIo>,
    cache: Arc<BlockCache>,
    overviews: Vec<Band>,
}

impl Band {
    pub(crate) fn from_backend(
        backend: BackendBand,
        dataset: Arc<str>,
        mode: AccessMode,
        cache: &Arc<BlockCache>,
    ) -> Self {
        let overviews = backend
            .overviews
            .into_iter()
            .map(|overview| Band::from_backend(overview, Arc::clone(&dataset), mode, cache))
            .collect();
        Self {
            id: cache.alloc_band_id(),
            dataset,
            size: backend.size,
            block_size: backend.block_size,
            pixel_type: backend.pixel_type,
            no_data: backend.no_data,
            metadata: backend.metadata,
            mode,
            io: backend.io,
            cache: Arc::clone(cache),
            overviews,
        }
    }

    pub fn size(&self) -> (usize, usize) {
        self.size
    }

    pub fn block_size(&self) -> (usize, usize) {
        self.block_size
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    pub fn no_data_value(&self) -> Option<f64> {
        self.no_data
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Blocks across and down, edge blocks counted whole.
    pub fn block_grid(&self) -> (usize, usize) {
        (
            self.size.0.div_ceil(self.block_size.0),
            self.size.1.div_ceil(self.block_size.1),
        )
    }

    pub fn overview_count(&self) -> usize {
        self.overviews.len()
    }

    pub fn overview(&self, index: usize) -> Option<&Band> {
        self.overviews.get(index)
    }

    fn block_bytes(&self) -> usize {
        self.block_size.0 * self.block_size.1 * self.pixel_type.bytes()
    }

    fn check_type<T: Pixel>(&self) -> Result<()> {
        if T::TYPE == self.pixel_type {
            Ok(())
        } else {
            Err(RastroError::TypeMismatch {
                band: self.pixel_type,
                requested: T::TYPE,
            })
        }
    }

    /// Reads `window` into a fresh buffer of `out_shape`, resampling
    /// when the shapes differ.
    pub fn read_window<T: Pixel>(
        &self,
        window: Window,
        out_shape: (usize, usize),
        policy: ResamplePolicy,
    ) -> Result<Vec<T>> {
        let mut out = vec![T::zero(); out_shape.0 * out_shape.1];
        self.read_window_into(window, out_shape, policy, &mut out)?;
        Ok(out)
    }

    /// Reads `window` into the caller's row-major slice of `out_shape`.
    ///
    /// Assembly happens at the window's native resolution; resampling
    /// to `out_shape` is applied afterwards, never inside the cache.
    pub fn read_window_into<T: Pixel>(
        &self,
        window: Window,
        out_shape: (usize, usize),
        policy: ResamplePolicy,
        out: &mut [T],
    ) -> Result<()> {
        self.check_type::<T>()?;
        window.validate(self.size)?;
        let expected = out_shape.0 * out_shape.1;
        if out.len() != expected {
            return Err(RastroError::BufferSize {
                expected,
                got: out.len(),
            });
        }
        debug!(
            "band {} read {:?} -> {:?} via {:?}",
            self.id, window, out_shape, policy
        );
        if out_shape == window.shape() {
            self.assemble(window, out)
        } else {
            let mut native = vec![T::zero(); window.area()];
            self.assemble(window, &mut native)?;
            resample_into(&native, window.shape(), out, out_shape, policy);
            Ok(())
        }
    }

    fn assemble<T: Pixel>(&self, window: Window, out: &mut [T]) -> Result<()> {
        let px = self.pixel_type.bytes();
        let (block_w, _) = self.block_size;
        for overlap in window.block_overlaps(self.block_size) {
            let handle = self.cache.get(
                self.block_key(overlap.col, overlap.row),
                self.block_bytes(),
                &self.io,
            )?;
            handle.read(|bytes| {
                for dy in 0..overlap.height {
                    let src_off = ((overlap.block_y + dy) * block_w + overlap.block_x) * px;
                    let src_row = &bytes[src_off..src_off + overlap.width * px];
                    let dst_off = (overlap.win_y + dy) * window.width + overlap.win_x;
                    let dst_row = &mut out[dst_off..dst_off + overlap.width];
                    for (chunk, value) in src_row.chunks_exact(px).zip(dst_row) {
                        *value = T::decode(chunk);
                    }
                }
            });
        }
        Ok(())
    }

    /// Writes `data` (at window resolution) into the overlapping cached
    /// blocks and marks them dirty. No backend I/O happens here; dirty
    /// blocks persist at eviction or flush (write-back).
    pub fn write_window<T: Pixel>(&self, window: Window, data: &[T]) -> Result<()> {
        if self.mode != AccessMode::Update {
            return Err(RastroError::ReadOnly(self.dataset.to_string()));
        }
        self.check_type::<T>()?;
        window.validate(self.size)?;
        if data.len() != window.area() {
            return Err(RastroError::BufferSize {
                expected: window.area(),
                got: data.len(),
            });
        }
        let px = self.pixel_type.bytes();
        let (block_w, _) = self.block_size;
        for overlap in window.block_overlaps(self.block_size) {
            let handle = self.cache.get(
                self.block_key(overlap.col, overlap.row),
                self.block_bytes(),
                &self.io,
            )?;
            handle.write(|bytes| {
                for dy in 0..overlap.height {
                    let src_off = (overlap.win_y + dy) * window.width + overlap.win_x;
                    let src_row = &data[src_off..src_off + overlap.width];
                    let dst_off = ((overlap.block_y + dy) * block_w + overlap.block_x) * px;
                    let dst_row = &mut bytes[dst_off..dst_off + overlap.width * px];
                    for (chunk, value) in dst_row.chunks_exact_mut(px).zip(src_row) {
                        value.encode(chunk);
                    }
                }
            });
        }
        Ok(())
    }

    /// Forces this band's dirty blocks (overviews included) to the
    /// backend; attempts every block and aggregates failures.
    pub fn flush(&self) -> Result<()> {
        let mut failures = Vec::new();
        for id in self.cache_ids() {
            collect_flush_failures(self.cache.flush_band(id), &mut failures)?;
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RastroError::FlushFailed { failures })
        }
    }

    pub(crate) fn retire(&self) -> Result<()> {
        let mut failures = Vec::new();
        for id in self.cache_ids() {
            collect_flush_failures(self.cache.retire_band(id), &mut failures)?;
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RastroError::FlushFailed { failures })
        }
    }

    /// Cache identities of this band and its overviews.
    fn cache_ids(&self) -> Vec<BandId> {
        let mut ids = vec![self.id];
        for overview in &self.overviews {
            ids.extend(overview.cache_ids());
        }
        ids
    }

    fn block_key(&self, col: usize, row: usize) -> BlockKey {
        BlockKey {
            band: self.id,
            col,
            row,
        }
    }
}

/// Folds a per-band flush outcome into an aggregate failure list,
/// propagating anything that is not a flush failure.
pub(crate) fn collect_flush_failures(
    result: Result<()>,
    failures: &mut Vec<(BlockKey, String)>,
) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(RastroError::FlushFailed {
            failures: mut new_failures,
        }) => {
            failures.append(&mut new_failures);
            Ok(())
        }
        Err(other) => Err(other),
    }
}

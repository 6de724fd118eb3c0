//! Append-only interleaved vertex storage with a one-shot GPU upload.

use strata_engine::render::{BufferId, IndexData, IndexWidth, RenderBackend};

use crate::error::ReplayError;

/// GPU handles of a finished batch.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BatchBuffers {
    pub vertex: BufferId,
    pub index: Option<(BufferId, IndexWidth)>,
}

/// Packed `f32` vertex records of one fixed stride plus an optional index list.
///
/// Data is appended until [`VertexBatch::finish`], which uploads it once and
/// drops the CPU copy. Counts stay available afterwards for range bookkeeping.
#[derive(Debug)]
pub struct VertexBatch {
    label: &'static str,
    stride: usize,
    vertices: Vec<f32>,
    indices: Vec<u32>,
    vertex_count: u32,
    index_count: u32,
    finished: bool,
    buffers: Option<BatchBuffers>,
}

impl VertexBatch {
    pub fn new(label: &'static str, stride: usize) -> Self {
        Self {
            label,
            stride,
            vertices: Vec::new(),
            indices: Vec::new(),
            vertex_count: 0,
            index_count: 0,
            finished: false,
            buffers: None,
        }
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Appends one vertex record and returns its index.
    ///
    /// `record` must be exactly one stride long.
    pub fn push_vertex(&mut self, record: &[f32]) -> Result<u32, ReplayError> {
        if self.finished {
            return Err(ReplayError::AppendAfterFinish);
        }
        debug_assert_eq!(record.len(), self.stride);
        self.vertices.extend_from_slice(record);
        let index = self.vertex_count;
        self.vertex_count += 1;
        Ok(index)
    }

    pub fn push_indices(&mut self, indices: &[u32]) -> Result<(), ReplayError> {
        if self.finished {
            return Err(ReplayError::AppendAfterFinish);
        }
        self.indices.extend_from_slice(indices);
        self.index_count += indices.len() as u32;
        Ok(())
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertex_count == 0
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Vertex attribute data not yet uploaded.
    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    /// Index data not yet uploaded.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Overwrites float `offset` of every pending vertex record.
    pub fn fill_attribute(&mut self, offset: usize, value: f32) {
        for record in self.vertices.chunks_exact_mut(self.stride) {
            record[offset] = value;
        }
    }

    /// Uploads vertices and indices. Must be called exactly once.
    ///
    /// Indices are packed as `u16` when they fit, else as `u32` when the backend
    /// allows wide indices. An index beyond both is reported before anything is
    /// uploaded. An empty batch finishes without touching the backend.
    pub fn finish(&mut self, backend: &mut dyn RenderBackend) -> Result<(), ReplayError> {
        if self.finished {
            return Err(ReplayError::AlreadyFinished);
        }

        let width = if self.indices.is_empty() {
            None
        } else {
            let max_index = self.indices.iter().copied().max().unwrap_or(0);
            Some(Self::index_width_for(max_index, backend.supports_wide_indices())?)
        };

        self.finished = true;
        if self.vertices.is_empty() {
            self.indices = Vec::new();
            return Ok(());
        }

        let vertex = backend.create_vertex_buffer(self.label, &self.vertices)?;
        let index = match width {
            None => None,
            Some(IndexWidth::U16) => {
                let packed: Vec<u16> = self.indices.iter().map(|&i| i as u16).collect();
                match backend.create_index_buffer(self.label, IndexData::U16(&packed)) {
                    Ok(id) => Some((id, IndexWidth::U16)),
                    Err(err) => {
                        backend.release_buffer(vertex);
                        return Err(err.into());
                    }
                }
            }
            Some(IndexWidth::U32) => {
                match backend.create_index_buffer(self.label, IndexData::U32(&self.indices)) {
                    Ok(id) => Some((id, IndexWidth::U32)),
                    Err(err) => {
                        backend.release_buffer(vertex);
                        return Err(err.into());
                    }
                }
            }
        };

        log::debug!(
            "{}: uploaded {} vertices, {} indices",
            self.label,
            self.vertex_count,
            self.index_count
        );

        self.buffers = Some(BatchBuffers { vertex, index });
        self.vertices = Vec::new();
        self.indices = Vec::new();
        Ok(())
    }

    fn index_width_for(max_index: u32, wide: bool) -> Result<IndexWidth, ReplayError> {
        if max_index <= IndexWidth::U16.max_index() {
            Ok(IndexWidth::U16)
        } else if wide {
            Ok(IndexWidth::U32)
        } else {
            Err(ReplayError::IndexRangeExceeded { max_index, width: IndexWidth::U16 })
        }
    }

    /// Uploaded buffers; `None` before `finish` or for an empty batch.
    #[inline]
    pub fn buffers(&self) -> Option<BatchBuffers> {
        self.buffers
    }

    /// Every buffer id owned by this batch, for deferred release.
    pub fn release_ids(&self) -> Vec<BufferId> {
        let Some(buffers) = self.buffers else { return Vec::new() };
        let mut ids = vec![buffers.vertex];
        if let Some((index, _)) = buffers.index {
            ids.push(index);
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_engine::render::testing::SoftwareBackend;

    fn triangle_batch() -> VertexBatch {
        let mut batch = VertexBatch::new("test", 2);
        for v in [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]] {
            batch.push_vertex(&v).unwrap();
        }
        batch.push_indices(&[0, 1, 2]).unwrap();
        batch
    }

    #[test]
    fn finish_uploads_narrow_indices() {
        let mut backend = SoftwareBackend::new();
        let mut batch = triangle_batch();
        batch.finish(&mut backend).unwrap();

        let buffers = batch.buffers().unwrap();
        assert_eq!(backend.upload_count(), 2);
        assert_eq!(backend.vertex_data(buffers.vertex).unwrap().len(), 6);
        let (index, width) = buffers.index.unwrap();
        assert_eq!(width, IndexWidth::U16);
        assert_eq!(backend.index_data(index).unwrap().0, &[0, 1, 2]);
        assert_eq!(batch.vertex_count(), 3);
        assert!(batch.vertices().is_empty());
    }

    #[test]
    fn finish_twice_is_an_error() {
        let mut backend = SoftwareBackend::new();
        let mut batch = triangle_batch();
        batch.finish(&mut backend).unwrap();
        assert_eq!(batch.finish(&mut backend), Err(ReplayError::AlreadyFinished));
        assert_eq!(batch.push_vertex(&[0.0, 0.0]), Err(ReplayError::AppendAfterFinish));
    }

    #[test]
    fn empty_batch_uploads_nothing() {
        let mut backend = SoftwareBackend::new();
        let mut batch = VertexBatch::new("empty", 6);
        batch.finish(&mut backend).unwrap();
        assert!(batch.buffers().is_none());
        assert!(batch.release_ids().is_empty());
        assert_eq!(backend.upload_count(), 0);
    }

    // ── index width ───────────────────────────────────────────────────────

    #[test]
    fn large_index_uses_wide_buffer_when_supported() {
        let mut backend = SoftwareBackend::new();
        let mut batch = triangle_batch();
        batch.push_indices(&[0, 1, 70_000]).unwrap();
        batch.finish(&mut backend).unwrap();
        assert_eq!(batch.buffers().unwrap().index.unwrap().1, IndexWidth::U32);
    }

    #[test]
    fn large_index_without_wide_support_is_reported_before_upload() {
        let mut backend = SoftwareBackend::with_wide_indices(false);
        let mut batch = triangle_batch();
        batch.push_indices(&[0, 1, 70_000]).unwrap();

        let err = batch.finish(&mut backend).unwrap_err();
        assert_eq!(
            err,
            ReplayError::IndexRangeExceeded { max_index: 70_000, width: IndexWidth::U16 }
        );
        assert_eq!(backend.upload_count(), 0);
        assert!(batch.buffers().is_none());
    }

    #[test]
    fn release_ids_cover_both_buffers() {
        let mut backend = SoftwareBackend::new();
        let mut batch = triangle_batch();
        batch.finish(&mut backend).unwrap();
        let ids = batch.release_ids();
        assert_eq!(ids.len(), 2);
        for id in ids {
            backend.release_buffer(id);
        }
        assert_eq!(backend.live_buffers(), 0);
    }
}

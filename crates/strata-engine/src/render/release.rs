use std::collections::VecDeque;

use super::RenderBackend;

/// Deferred GPU cleanup, run with the backend that owns the resources.
pub type ReleaseFn = Box<dyn FnOnce(&mut dyn RenderBackend)>;

/// Epoch-stamped queue of deferred releases.
///
/// A release scheduled during frame `N` may still be referenced by draws
/// recorded for `N`, so it only runs on the first [`ReleaseQueue::collect`] whose
/// epoch is greater than `N`.
#[derive(Default)]
pub struct ReleaseQueue {
    pending: VecDeque<(u64, ReleaseFn)>,
}

impl ReleaseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, epoch: u64, release: ReleaseFn) {
        debug_assert!(
            self.pending.back().is_none_or(|(last, _)| *last <= epoch),
            "release epochs must be scheduled in non-decreasing order"
        );
        self.pending.push_back((epoch, release));
    }

    /// Runs every release scheduled before `current_epoch`. Returns how many ran.
    pub fn collect(&mut self, current_epoch: u64, backend: &mut dyn RenderBackend) -> usize {
        let mut ran = 0;
        while let Some((epoch, _)) = self.pending.front() {
            if *epoch >= current_epoch {
                break;
            }
            if let Some((_, release)) = self.pending.pop_front() {
                release(&mut *backend);
                ran += 1;
            }
        }
        if ran > 0 {
            log::debug!("released {ran} deferred gpu resource sets");
        }
        ran
    }

    /// Runs everything regardless of epoch (e.g. on shutdown).
    pub fn flush(&mut self, backend: &mut dyn RenderBackend) -> usize {
        let ran = self.pending.len();
        for (_, release) in self.pending.drain(..) {
            release(&mut *backend);
        }
        ran
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::testing::SoftwareBackend;

    fn release_first_buffer() -> ReleaseFn {
        Box::new(|backend| {
            let id = backend
                .create_vertex_buffer("probe", &[0.0; 6])
                .expect("software upload");
            backend.release_buffer(id);
        })
    }

    #[test]
    fn release_waits_for_next_epoch() {
        let mut backend = SoftwareBackend::new();
        let mut queue = ReleaseQueue::new();
        queue.schedule(3, release_first_buffer());

        assert_eq!(queue.collect(3, &mut backend), 0);
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.collect(4, &mut backend), 1);
        assert!(queue.is_empty());
        assert_eq!(backend.release_count(), 1);
    }

    #[test]
    fn collect_stops_at_first_current_entry() {
        let mut backend = SoftwareBackend::new();
        let mut queue = ReleaseQueue::new();
        queue.schedule(1, release_first_buffer());
        queue.schedule(2, release_first_buffer());
        queue.schedule(5, release_first_buffer());

        assert_eq!(queue.collect(3, &mut backend), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.flush(&mut backend), 1);
    }
}

use bevy::prelude::*;
use bevy::utils::Parallel;

use super::NavMeshQuery;

/// One [`NavMeshQuery`] per worker thread.
///
/// Planning runs inside a parallel sweep; each task borrows the query owned by
/// the thread it runs on, so no two tasks ever share one and no lock is taken.
/// The query resets itself at the start of every search.
#[derive(Resource, Default)]
pub struct NavQueryPool {
    queries: Parallel<NavMeshQuery>,
}

impl NavQueryPool {
    /// Run `f` with this thread's query, sized for `max_nodes`.
    pub fn scope<R>(&self, max_nodes: usize, f: impl FnOnce(&mut NavMeshQuery) -> R) -> R {
        self.queries.scope(|query| {
            if query.max_nodes() != max_nodes {
                query.set_max_nodes(max_nodes);
            }
            f(query)
        })
    }

    /// Number of query contexts created so far (one per thread that planned).
    pub fn len(&mut self) -> usize {
        self.queries.iter_mut().count()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }
}

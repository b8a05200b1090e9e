use crate::{
    job::JobId,
    resource::{ResourceHandle, ResourceId},
};

#[derive(Debug, Clone, Copy)]
struct HandleEntry {
    job: Option<JobId>,
    resource: ResourceId,
    handle: ResourceHandle,
}

impl HandleEntry {
    const FREE: Self = Self {
        job: None,
        resource: ResourceId(0),
        handle: ResourceHandle::INVALID,
    };
}

/// Handles of created resources, one entry per job using a resource.
///
/// A resource shared by several jobs has one entry per job, all carrying the
/// same handle. The number of entries with a handle is its reference count.
#[derive(Debug)]
pub(crate) struct HandleTable<const N: usize> {
    entries: [HandleEntry; N],
}

impl<const N: usize> Default for HandleTable<N> {
    fn default() -> Self {
        Self {
            entries: [HandleEntry::FREE; N],
        }
    }
}

impl<const N: usize> HandleTable<N> {
    fn used(&self) -> impl Iterator<Item = (JobId, &HandleEntry)> {
        self.entries
            .iter()
            .filter_map(|e| e.job.map(|job| (job, e)))
    }

    /// Handle of `resource`, created by any job.
    pub(crate) fn lookup(&self, resource: ResourceId) -> Option<ResourceHandle> {
        self.used()
            .find(|(_, e)| e.resource == resource)
            .map(|(_, e)| e.handle)
    }

    /// Handle of `resource` as held by `job`.
    pub(crate) fn held_by(&self, job: JobId, resource: ResourceId) -> Option<ResourceHandle> {
        self.used()
            .find(|(j, e)| *j == job && e.resource == resource)
            .map(|(_, e)| e.handle)
    }

    /// Records that `job` uses `resource` under `handle`.
    ///
    /// # Errors
    /// Returns an error if the table is full.
    pub(crate) fn store(
        &mut self,
        job: JobId,
        resource: ResourceId,
        handle: ResourceHandle,
    ) -> Result<(), ResourceHandle> {
        let slot = self
            .entries
            .iter_mut()
            .find(|e| e.job.is_none())
            .ok_or(handle)?;
        *slot = HandleEntry {
            job: Some(job),
            resource,
            handle,
        };
        Ok(())
    }

    /// Number of jobs using `handle`.
    pub(crate) fn reference_count(&self, handle: ResourceHandle) -> usize {
        self.used().filter(|(_, e)| e.handle == handle).count()
    }

    /// Drops the entry of `job` for `resource`.
    pub(crate) fn release_resource(&mut self, job: JobId, resource: ResourceId) -> bool {
        self.release_where(|e| e.job == Some(job) && e.resource == resource)
            .is_some()
    }

    /// Drops the entry of `job` for `handle` and returns its resource.
    pub(crate) fn release_handle(&mut self, job: JobId, handle: ResourceHandle) -> Option<ResourceId> {
        self.release_where(|e| e.job == Some(job) && e.handle == handle)
    }

    fn release_where<F: Fn(&HandleEntry) -> bool>(&mut self, pred: F) -> Option<ResourceId> {
        let entry = self.entries.iter_mut().find(|e| pred(e))?;
        let resource = entry.resource;
        *entry = HandleEntry::FREE;
        Some(resource)
    }

    /// Whether `job` holds any entry.
    pub(crate) fn has_entries(&self, job: JobId) -> bool {
        self.used().any(|(j, _)| j == job)
    }

    /// Whether `job` holds an entry for `handle`.
    pub(crate) fn holds(&self, job: JobId, handle: ResourceHandle) -> bool {
        self.used().any(|(j, e)| j == job && e.handle == handle)
    }

    /// Drops every entry of `job`, calling `released` for each of its
    /// resources.
    pub(crate) fn clear_job<F: FnMut(ResourceId)>(&mut self, job: JobId, mut released: F) {
        for e in self.entries.iter_mut().filter(|e| e.job == Some(job)) {
            released(e.resource);
            *e = HandleEntry::FREE;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.used().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{job::JobPool, resource::ListId};

    fn jobs() -> (JobId, JobId) {
        let mut pool = JobPool::<2>::default();
        (pool.bind(ListId(0)).unwrap(), pool.bind(ListId(1)).unwrap())
    }

    #[test]
    fn shared_handle_is_counted_per_job() {
        let (a, b) = jobs();
        let mut table = HandleTable::<4>::default();
        let h = ResourceHandle(0x42);
        table.store(a, ResourceId(3), h).unwrap();
        table.store(b, ResourceId(3), h).unwrap();
        assert_eq!(table.reference_count(h), 2);
        assert_eq!(table.lookup(ResourceId(3)), Some(h));
        assert!(table.release_resource(a, ResourceId(3)));
        assert_eq!(table.reference_count(h), 1);
        assert_eq!(table.held_by(a, ResourceId(3)), None);
        assert_eq!(table.held_by(b, ResourceId(3)), Some(h));
    }

    #[test]
    fn full_table_rejects_entry() {
        let (a, _) = jobs();
        let mut table = HandleTable::<1>::default();
        table.store(a, ResourceId(0), ResourceHandle(1)).unwrap();
        assert_eq!(
            table.store(a, ResourceId(1), ResourceHandle(2)),
            Err(ResourceHandle(2))
        );
    }

    #[test]
    fn clearing_a_job_leaves_other_jobs() {
        let (a, b) = jobs();
        let mut table = HandleTable::<4>::default();
        table.store(a, ResourceId(0), ResourceHandle(1)).unwrap();
        table.store(a, ResourceId(1), ResourceHandle(2)).unwrap();
        table.store(b, ResourceId(1), ResourceHandle(2)).unwrap();
        let mut cleared = 0;
        table.clear_job(a, |_| cleared += 1);
        assert_eq!(cleared, 2);
        assert!(!table.has_entries(a));
        assert!(table.holds(b, ResourceHandle(2)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.release_handle(b, ResourceHandle(2)), Some(ResourceId(1)));
    }
}

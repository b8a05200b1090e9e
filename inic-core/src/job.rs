use crate::{
    list::{DlList, NodeRef},
    report::UserArg,
    resource::{ConnectionLabel, ListId},
};

/// Slot of a job in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct JobId(u8);

impl JobId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// The build/destroy state of one resource list.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Job {
    /// List the slot is bound to. A free slot has none.
    pub(crate) list: Option<ListId>,
    pub(crate) label: ConnectionLabel,
    pub(crate) user_arg: UserArg,
    /// The last build of the list succeeded and nothing destroyed it since.
    /// A failed build may still hold handles, which only the handle table
    /// knows about.
    pub(crate) built: bool,
    /// Owes an auto-destroy report.
    pub(crate) notify: bool,
    node: Option<NodeRef>,
}

/// Fixed pool of jobs with a list of the bound ones in binding order.
#[derive(Debug)]
pub(crate) struct JobPool<const JOBS: usize> {
    jobs: [Job; JOBS],
    active: DlList<JobId, JOBS>,
}

impl<const JOBS: usize> Default for JobPool<JOBS> {
    fn default() -> Self {
        Self {
            jobs: [Job::default(); JOBS],
            active: DlList::new(),
        }
    }
}

impl<const JOBS: usize> JobPool<JOBS> {
    /// Job bound to `list`.
    pub(crate) fn find(&self, list: ListId) -> Option<JobId> {
        self.active
            .iter()
            .map(|(_, id)| *id)
            .find(|id| self.jobs[id.index()].list == Some(list))
    }

    /// Job bound to `list`, binding a free slot if there is none.
    pub(crate) fn bind(&mut self, list: ListId) -> Option<JobId> {
        if let Some(id) = self.find(list) {
            return Some(id);
        }
        let free = self.jobs.iter().position(|j| j.list.is_none())?;
        let id = JobId(u8::try_from(free).ok()?);
        let node = self.active.push_back(id).ok()?;
        self.jobs[free] = Job {
            list: Some(list),
            node: Some(node),
            ..Default::default()
        };
        inic_trace!("Bound job {} to list {:?}", free, list);
        Some(id)
    }

    /// Frees the slot of `id`.
    pub(crate) fn release(&mut self, id: JobId) {
        let job = &mut self.jobs[id.index()];
        if let Some(node) = job.node.take() {
            _ = self.active.remove(node);
        }
        *job = Job::default();
    }

    pub(crate) fn get(&self, id: JobId) -> &Job {
        &self.jobs[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: JobId) -> &mut Job {
        &mut self.jobs[id.index()]
    }

    /// Bound jobs in binding order.
    pub(crate) fn active(&self) -> impl Iterator<Item = JobId> + '_ {
        self.active.iter().map(|(_, id)| *id)
    }

    pub(crate) fn len(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_reuses_the_job_of_a_list() {
        let mut pool = JobPool::<2>::default();
        let a = pool.bind(ListId(4)).unwrap();
        assert_eq!(pool.bind(ListId(4)), Some(a));
        let b = pool.bind(ListId(5)).unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.bind(ListId(6)), None);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn released_slot_is_reused() {
        let mut pool = JobPool::<2>::default();
        let a = pool.bind(ListId(1)).unwrap();
        let b = pool.bind(ListId(2)).unwrap();
        pool.get_mut(a).built = true;
        pool.release(a);
        assert_eq!(pool.find(ListId(1)), None);
        let c = pool.bind(ListId(3)).unwrap();
        assert_eq!(c, a);
        assert!(!pool.get(c).built);
        let order: heapless::Vec<JobId, 2> = pool.active().collect();
        assert_eq!(order.as_slice(), &[b, c]);
    }

    #[test]
    fn slots_beyond_the_id_range_stay_unused() {
        let mut pool = JobPool::<300>::default();
        for l in 0..256 {
            assert!(pool.bind(ListId(l)).is_some());
        }
        assert_eq!(pool.bind(ListId(256)), None);
        assert_eq!(pool.len(), 256);
    }
}

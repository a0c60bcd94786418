//! Jobs that must finish before a primary job's result may be parsed.

use super::{JobError, JobId, JobScheduler};
use indexmap::IndexMap;
use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    pub result_file: PathBuf,
    pub job_id: JobId,
}

/// Named dependencies of one primary job.
#[derive(Debug, Clone, Default)]
pub struct DependencySet {
    entries: IndexMap<String, Dependency>,
}

impl DependencySet {
    pub fn is_satisfied(&self, scheduler: &dyn JobScheduler) -> bool {
        self.entries
            .values()
            .all(|d| scheduler.is_complete(d.job_id))
    }

    pub fn get(&self, name: &str) -> Option<&Dependency> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Default)]
pub struct DependencyGraph {
    sets: RwLock<HashMap<JobId, DependencySet>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_dependency_set(&self, primary: JobId) -> Result<(), JobError> {
        let mut sets = self.sets.write()?;
        if sets.contains_key(&primary) {
            return Err(JobError::DuplicateId(primary));
        }
        sets.insert(primary, DependencySet::default());
        Ok(())
    }

    pub fn add_dependency(
        &self,
        primary: JobId,
        name: &str,
        result_file: &Path,
        dependency_job: JobId,
    ) -> Result<(), JobError> {
        let mut sets = self.sets.write()?;
        let set = sets
            .get_mut(&primary)
            .ok_or(JobError::UnknownPrimary(primary))?;
        debug!(
            "Adding dependency: primary={} db={} id={}",
            primary, name, dependency_job
        );
        set.entries.insert(
            name.to_string(),
            Dependency {
                result_file: result_file.to_path_buf(),
                job_id: dependency_job,
            },
        );
        Ok(())
    }

    pub fn dependencies_satisfied(
        &self,
        primary: JobId,
        scheduler: &dyn JobScheduler,
    ) -> Result<bool, JobError> {
        let sets = self.sets.read()?;
        let set = sets
            .get(&primary)
            .ok_or(JobError::MissingDependencySet(primary))?;
        Ok(set.is_satisfied(scheduler))
    }

    /// Result file of the named dependency of `primary`, if registered.
    pub fn dependency_file(&self, primary: JobId, name: &str) -> Result<Option<PathBuf>, JobError> {
        let sets = self.sets.read()?;
        let set = sets
            .get(&primary)
            .ok_or(JobError::MissingDependencySet(primary))?;
        Ok(set.get(name).map(|d| d.result_file.clone()))
    }

    pub fn get(&self, primary: JobId) -> Result<Option<DependencySet>, JobError> {
        Ok(self.sets.read()?.get(&primary).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::InMemoryScheduler;

    #[test]
    fn test_create_twice_fails() {
        let graph = DependencyGraph::new();
        graph.create_dependency_set(10).unwrap();
        assert!(matches!(
            graph.create_dependency_set(10),
            Err(JobError::DuplicateId(10))
        ));
    }

    #[test]
    fn test_add_without_set_fails() {
        let graph = DependencyGraph::new();
        let err = graph
            .add_dependency(10, "card", Path::new("card_1.txt"), 11)
            .unwrap_err();
        assert!(matches!(err, JobError::UnknownPrimary(10)));
    }

    #[test]
    fn test_missing_set_is_error() {
        let graph = DependencyGraph::new();
        let scheduler = InMemoryScheduler::new();
        assert!(matches!(
            graph.dependencies_satisfied(3, &scheduler),
            Err(JobError::MissingDependencySet(3))
        ));
    }

    #[test]
    fn test_satisfied_when_all_complete() {
        let graph = DependencyGraph::new();
        let scheduler = InMemoryScheduler::new();
        graph.create_dependency_set(10).unwrap();
        assert!(graph.dependencies_satisfied(10, &scheduler).unwrap());

        graph
            .add_dependency(10, "card", Path::new("card_1.txt"), 11)
            .unwrap();
        graph
            .add_dependency(10, "vfdb", Path::new("vfdb_1.txt"), 12)
            .unwrap();
        assert!(!graph.dependencies_satisfied(10, &scheduler).unwrap());

        scheduler.mark_complete(11, 0);
        assert!(!graph.dependencies_satisfied(10, &scheduler).unwrap());
        scheduler.mark_complete(12, 1);
        assert!(graph.dependencies_satisfied(10, &scheduler).unwrap());

        assert_eq!(
            graph.dependency_file(10, "card").unwrap(),
            Some(PathBuf::from("card_1.txt"))
        );
        assert_eq!(graph.dependency_file(10, "amr").unwrap(), None);
        assert_eq!(graph.get(10).unwrap().unwrap().len(), 2);
    }
}

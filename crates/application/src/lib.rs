pub mod alerts;
pub mod subject_locks;
pub mod usecases;

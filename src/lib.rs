pub mod collect;
pub mod dataset;
pub mod fetch;
pub mod model;
pub mod persist;
pub mod pipeline;
pub mod reconcile;

pub mod history;
pub mod model;
pub mod persistence;

pub use model::{
    ActionRequest, ContentAvailability, Feature, FeatureStatus, FileStructureInfo, ProjectState,
    WorkLogEntry,
};
pub use persistence::Store;

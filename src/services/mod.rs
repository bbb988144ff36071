//! Service layer

pub mod admission;
pub mod cases;
pub mod ownership;
pub mod users;

pub use admission::{
    spawn_admission_cleanup, AdmissionStore, DbAdmissionStore, MemoryAdmissionStore,
};
pub use cases::CaseStore;
pub use users::UserStore;

pub mod domain;
pub mod error;
pub mod expiry;
pub mod filters;
pub mod inventory;
pub mod memory;
pub mod normalize;
pub mod payment_plan;
pub mod ports;
pub mod session;
pub mod visibility;

pub use domain::{
    ChangeEvent, ChangeKind, Property, RawUnit, Role, StatusChange, StatusPrecondition, Unit,
    UnitId, UnitPatch, UnitStatus, Viewer, ViewerIdentity,
};
pub use error::{BookingError, BookingResult};
pub use filters::{FilterDimension, FilterSet};
pub use inventory::{InventoryView, UnitView};
pub use payment_plan::{PaymentPlan, PaymentSchedule};
pub use ports::{
    ChangeFeed, Clock, FileStore, PortError, PortResult, SystemClock, UnitStore, ViewerProvider,
};
pub use session::{BookingSession, SessionDeps, Transition};

pub mod error;
pub mod logging;
pub mod types;

pub use error::{MonitorError, Result};
pub use types::{
    Check, CheckKind, CheckResult, CheckRowStatus, DerivedCheckStatus, DerivedServiceStatus,
    ResultStatus, Service, DERIVED_STATUS_WINDOW,
};

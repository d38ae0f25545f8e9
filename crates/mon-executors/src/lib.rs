pub mod dns;
pub mod error;
pub mod executor;
pub mod http;
pub mod imap;
pub mod registry;
pub mod resources;
pub mod smtp;
pub mod ssh;
pub mod tcp;
pub mod threshold;

pub use error::{ExecutorError, Result};
pub use executor::{Executor, Outcome};
pub use registry::{ExecutorFactory, ExecutorRegistry};
pub use resources::SharedResources;

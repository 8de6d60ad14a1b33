mod supervisor;

pub use supervisor::{ServiceState, ServiceSupervisor, SupervisorError};

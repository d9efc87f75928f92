pub mod local_origin;
pub mod logging;

pub use local_origin::LocalOriginGuard;
pub use logging::RequestLogging;

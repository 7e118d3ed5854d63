// Re-exports to make it easy to pull in the logging macros with one `use`
//
// Global Graphics Software Ltd.
#![allow(unused_imports)]
pub use crate::debug;
pub use crate::error;
pub use crate::info;
pub use crate::log_internal;
pub use crate::verbose;
pub use crate::{logging::LogLevel, timing::get_current_millis};

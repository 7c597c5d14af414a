//! Concrete crash sources.

pub mod fallback;
pub mod file;
pub mod mock;
pub mod socrata;

pub use fallback::WithFallback;
pub use file::FileCrashSource;
pub use mock::MockCrashSource;
pub use socrata::{CHICAGO_CRASHES_ENDPOINT, SocrataCrashClient};

pub mod error;
pub mod scheduled_executor;
pub mod text;

pub use error::{ApiError, ApiResult};
pub use scheduled_executor::{ScheduledExecutor, ScheduledTask, ShutdownHandle};
pub use text::{clean_optional, normalize_for_cache, truncate_chars};

pub mod ambiguity;
pub mod catalog;
pub mod feedback;
pub mod intent;
pub mod involvement;
pub mod matches;
pub mod notification;
pub mod workflow;

pub use ambiguity::*;
pub use catalog::*;
pub use feedback::*;
pub use intent::*;
pub use involvement::*;
pub use matches::*;
pub use notification::*;
pub use workflow::*;

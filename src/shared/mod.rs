pub mod fs_atomic;
pub mod ids;
pub mod logging;
pub mod time;

pub use ids::{ChannelId, TeamId, UserId};
pub use logging::{BridgeLog, LogLevel};
pub use time::now_secs;

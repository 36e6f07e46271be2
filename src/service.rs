pub mod certification;
pub mod certified;
pub mod rewatch;
pub mod session;
pub mod stats;
pub mod watch_count;
pub mod youtube;

use derive_new::new;
use serde::{Deserialize, Serialize};

pub use stats::*;
pub use video_id::*;
pub use watch_record::*;

mod stats;
mod video_id;
mod watch_record;

use serde::Serialize;

use crate::time::format_seconds;

/// Videos longer than this are certified after this many watched seconds instead of at the end.
pub const LONG_VIDEO_THRESHOLD_SECONDS: u64 = 1800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificationPolicy {
    /// certified once the threshold of watched seconds is reached
    LongVideo,
    /// certified when the player reports the end of the video
    ShortVideo,
}

impl CertificationPolicy {
    pub fn for_duration(duration_seconds: u64) -> Self {
        if duration_seconds > LONG_VIDEO_THRESHOLD_SECONDS {
            CertificationPolicy::LongVideo
        } else {
            CertificationPolicy::ShortVideo
        }
    }

    pub fn required_seconds(self, duration_seconds: u64) -> u64 {
        match self {
            CertificationPolicy::LongVideo => LONG_VIDEO_THRESHOLD_SECONDS,
            CertificationPolicy::ShortVideo => duration_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificationStatus {
    pub message: String,
    pub progress_percent: f64,
    pub is_completed: bool,
    pub required_seconds: u64,
    pub policy: CertificationPolicy,
}

/// Where a viewing stands with respect to certification. Pure, safe to call every tick.
pub fn certification_status(
    duration_seconds: u64, watched_seconds: u64, video_ended: bool,
) -> CertificationStatus {
    let policy = CertificationPolicy::for_duration(duration_seconds);
    let required_seconds = policy.required_seconds(duration_seconds);

    let is_completed = match policy {
        CertificationPolicy::LongVideo => watched_seconds >= LONG_VIDEO_THRESHOLD_SECONDS,
        CertificationPolicy::ShortVideo => video_ended,
    };

    let progress_percent = if required_seconds > 0 {
        (watched_seconds as f64 / required_seconds as f64 * 100.0).min(100.0)
    } else {
        0.0
    };

    let watched = format_seconds(watched_seconds as i64);
    let required = format_seconds(required_seconds as i64);

    let message = match (is_completed, policy) {
        (true, _) => format!("Certified! Watched {watched} of {required}."),
        (false, CertificationPolicy::LongVideo) => format!(
            "Watched {watched} / {required}. Videos longer than 30 minutes are certified after 30 minutes."
        ),
        (false, CertificationPolicy::ShortVideo) => {
            format!("Watched {watched} / {required}. Watch until the end to get certified.")
        }
    };

    CertificationStatus {
        message,
        progress_percent,
        is_completed,
        required_seconds,
        policy,
    }
}

pub fn remaining_seconds(duration_seconds: u64, watched_seconds: u64, video_ended: bool) -> u64 {
    match CertificationPolicy::for_duration(duration_seconds) {
        CertificationPolicy::LongVideo => LONG_VIDEO_THRESHOLD_SECONDS.saturating_sub(watched_seconds),
        CertificationPolicy::ShortVideo if video_ended => 0,
        CertificationPolicy::ShortVideo => duration_seconds.saturating_sub(watched_seconds),
    }
}

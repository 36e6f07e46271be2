use std::sync::Arc;

use derive_new::new;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use tokio::sync::mpsc::UnboundedSender;
use tracing::instrument;

use crate::model::VideoId;
use crate::service::certification::{certification_status, CertificationStatus};
use crate::service::certified::CertifiedStore;
use crate::service::rewatch::Rewatch;
use crate::service::watch_count::WatchCountStore;
use crate::storage::LocalStorage;
use crate::time::{Clock, SystemClock, VideoDuration};

pub use driver::*;

mod driver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Loading,
    Playing,
    Paused,
    Certified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeState {
    #[default]
    Neutral,
    Liked,
}

/// The video a session is opened with.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct SessionVideo {
    pub id: VideoId,
    pub duration: VideoDuration,
}

/// Emitted once per session when a viewing becomes certified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificationCompleted {
    pub video_id: VideoId,
    pub user_id: Option<String>,
    /// milliseconds since the unix epoch
    pub completed_at: i64,
    pub watched_seconds: u64,
}

/// Receiver of certification events: token awards, analytics and the like.
pub trait CertificationListener: Send {
    fn certified(&self, event: &CertificationCompleted);
}

impl CertificationListener for () {
    fn certified(&self, _event: &CertificationCompleted) {}
}

impl CertificationListener for UnboundedSender<CertificationCompleted> {
    fn certified(&self, event: &CertificationCompleted) {
        if self.send(event.clone()).is_err() {
            tracing::debug!(video_id = %event.video_id, "certification listener is gone");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("cannot {action} while the session is {state:?}"))]
pub struct TransitionError {
    pub action: &'static str,
    pub state: SessionState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub video_id: Option<VideoId>,
    pub duration_seconds: u64,
    pub watched_seconds: u64,
    pub is_playing: bool,
    pub certified: bool,
    pub like_state: LikeState,
    pub status: Option<CertificationStatus>,
}

/// Watch state for the video currently open in a player.
///
/// This type only tracks state; the one-second accumulator that calls [WatchSession::tick]
/// lives in [SessionHandle].
pub struct WatchSession<S, L = ()> {
    user_id: Option<String>,
    state: SessionState,
    video: Option<SessionVideo>,
    watched_seconds: u64,
    video_ended: bool,
    /// persisted flag for the open video
    certified: bool,
    /// guards the completion side effects within one open/close cycle
    certified_this_session: bool,
    like_state: LikeState,

    watch_counts: WatchCountStore<S>,
    certified_videos: CertifiedStore<S>,
    clock: Arc<dyn Clock>,
    listener: L,
}

impl<S: LocalStorage, L: CertificationListener> WatchSession<S, L> {
    pub fn new(
        user_id: Option<String>, watch_counts: WatchCountStore<S>,
        certified_videos: CertifiedStore<S>, listener: L,
    ) -> Self {
        Self {
            user_id,
            state: SessionState::Idle,
            video: None,
            watched_seconds: 0,
            video_ended: false,
            certified: false,
            certified_this_session: false,
            like_state: LikeState::default(),
            watch_counts,
            certified_videos,
            clock: Arc::new(SystemClock),
            listener,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == SessionState::Playing
    }

    pub fn watched_seconds(&self) -> u64 {
        self.watched_seconds
    }

    pub fn video(&self) -> Option<&SessionVideo> {
        self.video.as_ref()
    }

    /// Open a video, replacing whatever was open before.
    #[instrument(skip(self), fields(video_id = %video.id))]
    pub fn open(&mut self, video: SessionVideo) {
        self.certified = self.certified_videos.is_certified(video.id.as_str());
        self.video = Some(video);
        self.state = SessionState::Loading;
        self.watched_seconds = 0;
        self.video_ended = false;
        self.certified_this_session = false;
        self.like_state = LikeState::default();

        tracing::debug!(certified = self.certified, "opened video");
    }

    /// The player finished initializing.
    pub fn ready(&mut self, autoplay: bool) -> Result<SessionState, TransitionError> {
        self.require_state("mark ready", &[SessionState::Loading])?;

        self.state = if autoplay {
            SessionState::Playing
        } else {
            SessionState::Paused
        };
        Ok(self.state)
    }

    pub fn play(&mut self) -> Result<(), TransitionError> {
        self.require_state("play", &[SessionState::Paused])?;
        self.state = SessionState::Playing;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), TransitionError> {
        self.require_state("pause", &[SessionState::Playing])?;
        self.state = SessionState::Paused;
        Ok(())
    }

    /// One second of playback. Does nothing unless the session is playing.
    pub fn tick(&mut self) -> Option<CertificationCompleted> {
        if !self.is_playing() {
            return None;
        }

        self.watched_seconds += 1;
        self.evaluate()
    }

    /// The player reached the end of the video.
    pub fn on_ended(&mut self) -> Result<Option<CertificationCompleted>, TransitionError> {
        self.require_state(
            "end",
            &[
                SessionState::Playing,
                SessionState::Paused,
                SessionState::Certified,
            ],
        )?;

        self.video_ended = true;

        if self.state == SessionState::Certified {
            return Ok(None);
        }

        let event = self.evaluate();
        if self.state != SessionState::Certified {
            // playback is over either way, so the accumulator has to stop
            self.state = SessionState::Paused;
        }

        Ok(event)
    }

    pub fn close(&mut self) {
        if let Some(video) = self.video.take() {
            tracing::debug!(video_id = %video.id, watched_seconds = self.watched_seconds, "closed video");
        }

        self.state = SessionState::Idle;
        self.watched_seconds = 0;
        self.video_ended = false;
        self.certified = false;
        self.certified_this_session = false;
        self.like_state = LikeState::default();
    }

    pub fn like(&mut self) -> Result<(), TransitionError> {
        self.set_like(LikeState::Liked)
    }

    pub fn unlike(&mut self) -> Result<(), TransitionError> {
        self.set_like(LikeState::Neutral)
    }

    pub fn status(&self) -> Option<CertificationStatus> {
        let video = self.video.as_ref()?;
        Some(certification_status(
            video.duration.seconds,
            self.watched_seconds,
            self.video_ended,
        ))
    }

    /// Cooldown decision for the open video; nothing open means nothing to wait for.
    pub fn rewatch(&self) -> Rewatch {
        let Some(video) = &self.video else {
            return Rewatch::Allowed;
        };

        let record = self.watch_counts.get_watch_count(video.id.as_str());
        Rewatch::evaluate(&record, self.clock.now_millis())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            video_id: self.video.as_ref().map(|video| video.id.clone()),
            duration_seconds: self.video.as_ref().map_or(0, |video| video.duration.seconds),
            watched_seconds: self.watched_seconds,
            is_playing: self.is_playing(),
            certified: self.certified,
            like_state: self.like_state,
            status: self.status(),
        }
    }

    fn set_like(&mut self, like_state: LikeState) -> Result<(), TransitionError> {
        if self.state == SessionState::Idle {
            return TransitionSnafu {
                action: "change the like state",
                state: self.state,
            }
            .fail();
        }

        self.like_state = like_state;
        Ok(())
    }

    fn require_state(&self, action: &'static str, allowed: &[SessionState]) -> Result<(), TransitionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            TransitionSnafu {
                action,
                state: self.state,
            }
            .fail()
        }
    }

    fn evaluate(&mut self) -> Option<CertificationCompleted> {
        let status = self.status()?;
        if !status.is_completed {
            return None;
        }

        self.state = SessionState::Certified;

        if self.certified_this_session {
            return None;
        }
        self.certified_this_session = true;

        self.certify()
    }

    fn certify(&mut self) -> Option<CertificationCompleted> {
        let video = self.video.as_ref()?;
        let video_id = video.id.clone();

        if let Rewatch::CoolingDown { minutes } = self.rewatch() {
            tracing::info!(%video_id, minutes, "viewing completed during the rewatch cooldown, not certifying again");
            return None;
        }

        self.certified = true;
        self.certified_videos.set_certified(video_id.as_str(), true);
        let record = self.watch_counts.increment_watch_count(video_id.as_str());

        let event = CertificationCompleted {
            video_id,
            user_id: self.user_id.clone(),
            completed_at: self.clock.now_millis(),
            watched_seconds: self.watched_seconds,
        };

        tracing::info!(
            video_id = %event.video_id,
            watched_seconds = event.watched_seconds,
            watch_count = record.watch_count,
            "video certified"
        );

        self.listener.certified(&event);
        Some(event)
    }
}

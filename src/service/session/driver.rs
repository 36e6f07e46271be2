use std::time::Duration;

use snafu::Snafu;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{block_in_place, JoinHandle};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use super::*;

const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug)]
enum Command {
    Open(SessionVideo),
    Ready { autoplay: bool },
    Play,
    Pause,
    Ended,
    Like(LikeState),
    Close,
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[snafu(display("the watch session has already shut down"))]
pub struct SessionClosed;

/// Owner of a running [WatchSession].
///
/// The session lives inside a spawned task together with its accumulator, a one-second
/// interval that only exists while the session is playing. Dropping the handle aborts the
/// task, which releases the accumulator even if [SessionHandle::shutdown] is never called.
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn spawn<S, L>(session: WatchSession<S, L>) -> Self
    where
        S: LocalStorage + 'static,
        L: CertificationListener + 'static,
    {
        let (commands, receiver) = mpsc::channel(32);
        let task = tokio::spawn(run(session, receiver));

        Self {
            commands,
            task: Some(task),
        }
    }

    pub async fn open(&self, video: SessionVideo) -> Result<(), SessionClosed> {
        self.send(Command::Open(video)).await
    }

    pub async fn ready(&self, autoplay: bool) -> Result<(), SessionClosed> {
        self.send(Command::Ready { autoplay }).await
    }

    pub async fn play(&self) -> Result<(), SessionClosed> {
        self.send(Command::Play).await
    }

    pub async fn pause(&self) -> Result<(), SessionClosed> {
        self.send(Command::Pause).await
    }

    pub async fn ended(&self) -> Result<(), SessionClosed> {
        self.send(Command::Ended).await
    }

    pub async fn like(&self, like_state: LikeState) -> Result<(), SessionClosed> {
        self.send(Command::Like(like_state)).await
    }

    pub async fn close(&self) -> Result<(), SessionClosed> {
        self.send(Command::Close).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionClosed> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await?;
        rx.await.map_err(|_| SessionClosed)
    }

    /// Close the session and wait for its task to finish.
    pub async fn shutdown(mut self) {
        let _ = self.send(Command::Shutdown).await;

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    async fn send(&self, command: Command) -> Result<(), SessionClosed> {
        self.commands.send(command).await.map_err(|_| SessionClosed)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run<S, L>(mut session: WatchSession<S, L>, mut commands: mpsc::Receiver<Command>)
where
    S: LocalStorage,
    L: CertificationListener,
{
    let mut accumulator: Option<Interval> = None;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Shutdown) | None => break,
                Some(command) => blocking(|| apply(&mut session, command)),
            },
            _ = next_tick(&mut accumulator) => {
                blocking(|| session.tick());
            }
        }

        sync_accumulator(&session, &mut accumulator);
    }

    session.close();
}

fn apply<S, L>(session: &mut WatchSession<S, L>, command: Command)
where
    S: LocalStorage,
    L: CertificationListener,
{
    let result = match command {
        Command::Open(video) => {
            session.open(video);
            Ok(())
        }
        Command::Ready { autoplay } => session.ready(autoplay).map(|_| ()),
        Command::Play => session.play(),
        Command::Pause => session.pause(),
        Command::Ended => session.on_ended().map(|_| ()),
        Command::Like(LikeState::Liked) => session.like(),
        Command::Like(LikeState::Neutral) => session.unlike(),
        Command::Close => {
            session.close();
            Ok(())
        }
        Command::Snapshot(reply) => {
            let _ = reply.send(session.snapshot());
            Ok(())
        }
        Command::Shutdown => Ok(()),
    };

    if let Err(error) = result {
        tracing::warn!(%error, "ignored session command");
    }
}

/// Session steps may persist to [LocalStorage], which is synchronous. On a multi-threaded
/// runtime the worker hands its other tasks off while the step runs.
fn blocking<R>(step: impl FnOnce() -> R) -> R {
    match Handle::current().runtime_flavor() {
        RuntimeFlavor::MultiThread => block_in_place(step),
        _ => step(),
    }
}

/// Start the accumulator when playback starts and drop it on every way out of `Playing`.
fn sync_accumulator<S, L>(session: &WatchSession<S, L>, accumulator: &mut Option<Interval>)
where
    S: LocalStorage,
    L: CertificationListener,
{
    match (session.is_playing(), accumulator.is_some()) {
        (true, false) => {
            let mut interval = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            *accumulator = Some(interval);
        }
        (false, true) => {
            tracing::debug!(watched_seconds = session.watched_seconds(), "stopped accumulator");
            *accumulator = None;
        }
        _ => {}
    }
}

async fn next_tick(accumulator: &mut Option<Interval>) {
    match accumulator {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

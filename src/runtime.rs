use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyEvent, KeyEventKind};

/// Interval between timer ticks while a timed session runs.
pub const TICK_INTERVAL: Duration = Duration::from_millis(1000);

/// Unified event type consumed by the host loop
#[derive(Clone, Debug)]
pub enum HostEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

/// Source of terminal events (keyboard, resize, etc.)
pub trait HostEventSource {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<HostEvent, RecvTimeoutError>;
}

/// Events fed through a channel, by the terminal reader thread or by a test.
pub struct ChannelEventSource {
    rx: Receiver<HostEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<HostEvent>) -> Self {
        Self { rx }
    }

    /// Spawns a thread forwarding crossterm key presses and resizes.
    pub fn crossterm() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            let forwarded = match event::read() {
                Ok(CtEvent::Key(key)) if key.kind != KeyEventKind::Release => {
                    tx.send(HostEvent::Key(key))
                }
                Ok(CtEvent::Resize(_, _)) => tx.send(HostEvent::Resize),
                Ok(_) => Ok(()),
                Err(err) => {
                    tracing::warn!(error = %err, "terminal input closed");
                    break;
                }
            };
            if forwarded.is_err() {
                break;
            }
        });

        Self { rx }
    }
}

impl HostEventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<HostEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Interleaves input events with ticks on a fixed cadence. A tick is due once
/// per interval no matter how fast keys arrive.
pub struct Runner<E: HostEventSource> {
    event_source: E,
    interval: Duration,
    next_tick: Instant,
}

impl<E: HostEventSource> Runner<E> {
    pub fn new(event_source: E, interval: Duration) -> Self {
        Self {
            event_source,
            interval,
            next_tick: Instant::now() + interval,
        }
    }

    /// Next input event, or `Tick` once the tick deadline has passed.
    pub fn step(&mut self) -> HostEvent {
        let now = Instant::now();
        if now >= self.next_tick {
            return self.tick(now);
        }
        match self.event_source.recv_timeout(self.next_tick - now) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                self.tick(Instant::now())
            }
        }
    }

    fn tick(&mut self, now: Instant) -> HostEvent {
        self.next_tick = now + self.interval;
        HostEvent::Tick
    }
}

/// Which session attempt, if any, timer ticks belong to.
///
/// Armed with a session generation when a timed attempt starts and cancelled
/// when it finishes, is reset, or is torn down. Ticks are only delivered while
/// the armed generation matches the live session.
#[derive(Debug, Default)]
pub struct TickSchedule {
    armed_for: Option<u64>,
}

impl TickSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, generation: u64) {
        self.armed_for = Some(generation);
    }

    pub fn cancel(&mut self) {
        self.armed_for = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed_for.is_some()
    }

    pub fn fires_for(&self, generation: u64) -> bool {
        self.armed_for == Some(generation)
    }
}

impl Drop for TickSchedule {
    fn drop(&mut self) {
        if let Some(generation) = self.armed_for.take() {
            tracing::debug!(generation, "session timer cancelled on teardown");
        }
    }
}

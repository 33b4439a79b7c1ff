//! Reconciliation loop
//!
//! The [`Reconciler`] is a single actor that owns the device registry, the
//! watcher sessions and the generation counter. Every background task
//! (enumeration, change monitor, watchers, dwell timers) reports back over a
//! channel with the generation it was started under; anything tagged with an
//! older generation is dropped on arrival.

use buildlight_core::{BuildBindings, BuildId, ExhaustionPolicy, Generation, HardwareIdentity, Palette};
use buildlight_usb::DeviceTransport;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::api::BuildSource;
use crate::board::Board;
use crate::error::SyncError;
use crate::event::SyncEvent;
use crate::registry::{ChangeMonitor, DeviceRegistry, Enumeration};
use crate::watcher::{Watcher, WatcherSession, DEFAULT_DWELL};

/// Engine tuning, normally built from the daemon configuration
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Change monitor poll period
    pub poll_interval: Duration,
    /// How long the updating color is shown
    pub dwell: Duration,
    pub stream_idle_timeout: Option<Duration>,
    pub on_exhausted: ExhaustionPolicy,
    pub palette: Palette,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            dwell: DEFAULT_DWELL,
            stream_idle_timeout: None,
            on_exhausted: ExhaustionPolicy::default(),
            palette: Palette::default(),
        }
    }
}

/// Anything the reconciler can be woken by
#[derive(Debug)]
pub enum Incoming<H> {
    Enumerated(Enumeration<H>),
    Event(SyncEvent),
}

impl<H> Incoming<H> {
    pub fn generation(&self) -> Generation {
        match self {
            Self::Enumerated(enumeration) => enumeration.generation,
            Self::Event(event) => event.generation(),
        }
    }
}

pub struct Reconciler<T: DeviceTransport, S: BuildSource> {
    registry: DeviceRegistry<T>,
    bindings: Arc<BuildBindings>,
    source: Arc<S>,
    settings: SyncSettings,
    generation: Generation,
    sessions: HashMap<HardwareIdentity, WatcherSession>,
    monitor: Option<ChangeMonitor>,
    board: Board,
    events_tx: UnboundedSender<SyncEvent>,
    events_rx: UnboundedReceiver<SyncEvent>,
    enumerated_tx: UnboundedSender<Enumeration<T::Handle>>,
    enumerated_rx: UnboundedReceiver<Enumeration<T::Handle>>,
}

impl<T: DeviceTransport, S: BuildSource> Reconciler<T, S> {
    pub fn new(transport: Arc<T>, bindings: Arc<BuildBindings>, source: Arc<S>, settings: SyncSettings) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        let (enumerated_tx, enumerated_rx) = unbounded_channel();

        Self {
            registry: DeviceRegistry::new(transport),
            bindings,
            source,
            settings,
            generation: Generation::default(),
            sessions: HashMap::new(),
            monitor: None,
            board: Board::new(),
            events_tx,
            events_rx,
            enumerated_tx,
            enumerated_rx,
        }
    }

    /// Reconcile once, then handle events until a fatal error
    pub async fn run(&mut self) -> Result<(), SyncError> {
        self.reconcile().await;
        loop {
            let incoming = self.next_event().await?;
            self.handle(incoming).await?;
        }
    }

    /// Start a new cycle: close every watcher and the change monitor, then
    /// enumerate the hardware in the background.
    pub async fn reconcile(&mut self) {
        self.generation = self.generation.next();
        let generation = self.generation;

        let closed = self.sessions.len();
        self.sessions.clear();
        self.monitor = None;
        self.board.reset(generation).await;

        info!(generation = %generation, closed_watchers = closed, "Reconciling devices");

        let enumeration = self.registry.enumerate(generation);
        let tx = self.enumerated_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(enumeration.await);
        });
    }

    /// Wait for the next enumeration result or event
    pub async fn next_event(&mut self) -> Result<Incoming<T::Handle>, SyncError> {
        tokio::select! {
            Some(enumeration) = self.enumerated_rx.recv() => Ok(Incoming::Enumerated(enumeration)),
            Some(event) = self.events_rx.recv() => Ok(Incoming::Event(event)),
            else => Err(SyncError::ChannelClosed),
        }
    }

    pub async fn handle(&mut self, incoming: Incoming<T::Handle>) -> Result<(), SyncError> {
        let generation = incoming.generation();
        if generation != self.generation {
            debug!(stale = %generation, current = %self.generation, "Discarding stale completion");
            return Ok(());
        }

        match incoming {
            Incoming::Enumerated(enumeration) => self.bind(enumeration).await,
            Incoming::Event(event) => self.apply(event).await?,
        }
        Ok(())
    }

    async fn bind(&mut self, enumeration: Enumeration<T::Handle>) {
        let generation = enumeration.generation;
        let off = self.settings.palette.off;

        for identity in self.registry.apply(enumeration) {
            self.registry.set_color(&identity, off);

            let build = self.bindings.resolve(&identity).cloned();
            self.board.attach(identity.clone(), build.clone(), off).await;

            let Some(build) = build else {
                info!(device = %identity, "No build configured for device, leaving it unbound");
                continue;
            };

            info!(device = %identity, build = %build, "Watching build");
            let watcher = Watcher::new(
                generation,
                identity.clone(),
                build,
                Arc::clone(&self.source),
                self.events_tx.clone(),
            )
            .with_dwell(self.settings.dwell)
            .with_idle_timeout(self.settings.stream_idle_timeout);
            self.sessions.insert(identity, WatcherSession::spawn(watcher));
        }

        let tx = self.events_tx.clone();
        self.monitor = Some(
            self.registry
                .start_change_monitor(self.settings.poll_interval, move |_| {
                    let _ = tx.send(SyncEvent::TopologyChanged { generation });
                }),
        );
    }

    async fn apply(&mut self, event: SyncEvent) -> Result<(), SyncError> {
        match event {
            SyncEvent::TopologyChanged { .. } => self.reconcile().await,
            SyncEvent::Status { identity, status, .. } => {
                let color = self.settings.palette.color_for(status);
                debug!(device = %identity, status = %status, color = %color, "Rendering status");
                self.registry.set_color(&identity, color);
                self.board.set_status(&identity, status, color).await;
            }
            SyncEvent::State { identity, state, .. } => {
                self.board.set_state(&identity, state).await;
            }
            SyncEvent::StreamFailed { identity, error, .. } => {
                warn!(device = %identity, error = %error, "Live stream failed, reconciling every device");
                self.reconcile().await;
            }
            SyncEvent::BackoffExhausted {
                identity,
                build,
                failures,
                ..
            } => {
                self.sessions.remove(&identity);
                match self.settings.on_exhausted {
                    ExhaustionPolicy::Terminate => {
                        return Err(SyncError::BackoffExhausted {
                            identity,
                            build,
                            failures,
                        });
                    }
                    ExhaustionPolicy::Idle => {
                        error!(
                            device = %identity,
                            build = %build,
                            failures,
                            "Build unreachable, device stays idle until the next reconciliation"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Shared board for the status API
    pub fn board(&self) -> Board {
        self.board.clone()
    }

    pub fn registry(&self) -> &DeviceRegistry<T> {
        &self.registry
    }

    /// Devices with a live watcher and the build each follows
    pub fn bound(&self) -> Vec<(HardwareIdentity, BuildId)> {
        let mut bound: Vec<_> = self
            .sessions
            .iter()
            .map(|(identity, session)| (identity.clone(), session.build().clone()))
            .collect();
        bound.sort_by(|a, b| a.0.cmp(&b.0));
        bound
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor
            .as_ref()
            .is_some_and(|monitor| !monitor.is_finished())
    }
}

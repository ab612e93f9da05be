//! # Assistant Actor
//!
//! Owns the engine and applies queued commands one at a time:
//!
//! ```text
//! AssistantHandle ──Command──→ ┐
//!                              ├──→ actor ──apply──→ AssistantService
//! TokioTimerScheduler ──id───→ ┘      │
//!                                     ↓ take_events()
//!                              EventPublisher (assistant bus)
//! ```
//!
//! Shutdown is signalled through a watch channel. On shutdown the engine
//! releases its syncs and timers before the actor exits.

use anyhow::{Context, Result};
use assistant_bus::EventPublisher;
use assistant_telemetry::{log_event, time_histogram, EVENT_DISPATCH_DURATION};
use bass_client::{
    AssistantService, AssistantStats, GroupDirectory, LocalAudioGateway, PeriodicSyncScanner,
    ScanFilter, SinkTransport, TimerId,
};
use le_audio_types::{BroadcastMetadata, DeviceAddress, ReceiveState, SourceId, SyncHandle};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::command::Command;
use crate::config::RuntimeConfig;
use crate::errors::RuntimeError;
use crate::metrics::{record_event, record_stats};
use crate::timers::TokioTimerScheduler;

/// Outbound ports supplied by the host.
pub struct RuntimePorts<T, S, G, L> {
    pub transport: Arc<T>,
    pub scanner: Arc<S>,
    pub groups: Arc<G>,
    pub local_audio: Arc<L>,
}

/// Cloneable entry point for applications and stack adapters.
#[derive(Clone, Debug)]
pub struct AssistantHandle {
    commands: mpsc::Sender<Command>,
}

impl AssistantHandle {
    /// Queue a command, waiting for room.
    pub async fn send(&self, command: Command) -> Result<(), RuntimeError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Queue a command without waiting, for callers on non-async threads.
    pub fn try_send(&self, command: Command) -> Result<(), RuntimeError> {
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(command) => RuntimeError::QueueFull(command.name()),
            TrySendError::Closed(_) => RuntimeError::ChannelClosed,
        })
    }

    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R, RuntimeError> {
        let (reply, response) = oneshot::channel();
        self.send(make(reply)).await?;
        response.await.map_err(|_| RuntimeError::ReplyDropped)
    }

    pub async fn start_searching(&self, filters: Vec<ScanFilter>) -> Result<(), RuntimeError> {
        self.send(Command::StartSearching(filters)).await
    }

    pub async fn stop_searching(&self) -> Result<(), RuntimeError> {
        self.send(Command::StopSearching).await
    }

    pub async fn add_source(
        &self,
        sink: DeviceAddress,
        metadata: BroadcastMetadata,
        is_group_op: bool,
    ) -> Result<(), RuntimeError> {
        self.send(Command::AddSource {
            sink,
            metadata,
            is_group_op,
        })
        .await
    }

    pub async fn modify_source(
        &self,
        sink: DeviceAddress,
        source_id: SourceId,
        metadata: BroadcastMetadata,
    ) -> Result<(), RuntimeError> {
        self.send(Command::ModifySource {
            sink,
            source_id,
            metadata,
        })
        .await
    }

    pub async fn remove_source(
        &self,
        sink: DeviceAddress,
        source_id: SourceId,
    ) -> Result<(), RuntimeError> {
        self.send(Command::RemoveSource { sink, source_id }).await
    }

    pub async fn cancel_active_sync(&self, handle: Option<SyncHandle>) -> Result<(), RuntimeError> {
        self.send(Command::CancelActiveSync(handle)).await
    }

    pub async fn get_all_sources(&self, sink: DeviceAddress) -> Result<Vec<ReceiveState>, RuntimeError> {
        self.request(|reply| Command::GetAllSources { sink, reply })
            .await
    }

    pub async fn get_max_source_capacity(&self, sink: DeviceAddress) -> Result<usize, RuntimeError> {
        self.request(|reply| Command::GetMaxSourceCapacity { sink, reply })
            .await
    }

    pub async fn is_searching(&self) -> Result<bool, RuntimeError> {
        self.request(|reply| Command::IsSearching { reply }).await
    }

    pub async fn stats(&self) -> Result<AssistantStats, RuntimeError> {
        self.request(|reply| Command::Stats { reply }).await
    }
}

/// Running assistant: the actor task plus its shutdown signal.
pub struct AssistantRuntime {
    handle: AssistantHandle,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AssistantRuntime {
    /// Build the engine and spawn its actor on the current tokio runtime.
    pub fn start<T, S, G, L>(
        config: RuntimeConfig,
        ports: RuntimePorts<T, S, G, L>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<Self>
    where
        T: SinkTransport + 'static,
        S: PeriodicSyncScanner + 'static,
        G: GroupDirectory + 'static,
        L: LocalAudioGateway + 'static,
    {
        config.validate()?;

        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let timers = TokioTimerScheduler::new(timer_tx)
            .context("assistant runtime must start inside a tokio runtime")?;

        let service = AssistantService::new(
            config.assistant.clone(),
            ports.transport,
            ports.scanner,
            ports.groups,
            ports.local_audio,
            Arc::new(timers),
        );

        let (command_tx, command_rx) = mpsc::channel(config.command_queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let actor = Actor {
            service,
            commands: command_rx,
            timers: timer_rx,
            shutdown: shutdown_rx,
            publisher,
        };
        let task = tokio::spawn(actor.run());

        log_event!(
            info,
            "runtime",
            "Assistant runtime started",
            queue = config.command_queue_capacity,
            max_syncs = config.assistant.sync.max_active_synced_sources
        );

        Ok(Self {
            handle: AssistantHandle {
                commands: command_tx,
            },
            shutdown_tx,
            task,
        })
    }

    pub fn handle(&self) -> AssistantHandle {
        self.handle.clone()
    }

    /// Stop the actor and wait for it to release everything.
    pub async fn shutdown(self) -> Result<(), RuntimeError> {
        let _ = self.shutdown_tx.send(true);
        self.task
            .await
            .map_err(|e| RuntimeError::Join(e.to_string()))
    }
}

struct Actor<T, S, G, L>
where
    T: SinkTransport,
    S: PeriodicSyncScanner,
    G: GroupDirectory,
    L: LocalAudioGateway,
{
    service: AssistantService<T, S, G, L, TokioTimerScheduler>,
    commands: mpsc::Receiver<Command>,
    timers: mpsc::UnboundedReceiver<TimerId>,
    shutdown: watch::Receiver<bool>,
    publisher: Arc<dyn EventPublisher>,
}

impl<T, S, G, L> Actor<T, S, G, L>
where
    T: SinkTransport,
    S: PeriodicSyncScanner,
    G: GroupDirectory,
    L: LocalAudioGateway,
{
    async fn run(mut self) {
        log_event!(debug, "runtime", "Actor loop running");
        loop {
            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                Some(id) = self.timers.recv() => {
                    self.handle(Command::TimerFired(id)).await;
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
            }
        }

        log_event!(info, "runtime", "Assistant runtime stopping");
        let before = self.service.stats();
        self.service.shutdown();
        record_stats(&before, &self.service.stats());
        self.flush().await;
    }

    async fn handle(&mut self, command: Command) {
        let name = command.name();
        let before = self.service.stats();
        {
            let _timer = time_histogram!(EVENT_DISPATCH_DURATION);
            command.apply(&mut self.service);
        }
        record_stats(&before, &self.service.stats());

        let published = self.flush().await;
        log_event!(debug, "runtime", "Command applied", command = name, events = published);
    }

    /// Publish the engine's pending callbacks in order.
    async fn flush(&mut self) -> usize {
        let events = self.service.take_events();
        let count = events.len();
        for event in events {
            record_event(&event);
            self.publisher.publish(event).await;
        }
        count
    }
}

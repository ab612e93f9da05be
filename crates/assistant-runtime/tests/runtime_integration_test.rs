//! # Runtime Integration Tests
//!
//! Drive the actor through its handle with mock host ports and observe the
//! callbacks on the assistant bus. Timers run on tokio's paused clock.

use std::sync::Arc;
use std::time::Duration;

use assistant_bus::{AssistantEvent, EventFilter, EventTopic, InMemoryEventBus, Subscription};
use assistant_runtime::{
    AssistantHandle, AssistantRuntime, Command, RuntimeConfig, RuntimeError, RuntimePorts,
};
use assistant_telemetry::SOURCE_OPERATIONS;
use bass_client::domain::announcement::fixtures;
use bass_client::ports::outbound::mocks::{
    MockGroupDirectory, MockLocalAudio, MockSinkTransport, MockSyncScanner, ScanCall,
    TransportCall,
};
use bass_client::{AssistantStats, ScanResult};
use le_audio_types::{
    AddressType, AssistantError, BroadcastId, BroadcastMetadata, ConnectionState, DeviceAddress,
    PaSyncState, Reason, ReceiveState, SyncHandle,
};
use tokio::time::timeout;

struct Fixture {
    runtime: AssistantRuntime,
    handle: AssistantHandle,
    bus: Arc<InMemoryEventBus>,
    transport: Arc<MockSinkTransport>,
    scanner: Arc<MockSyncScanner>,
    audio: Arc<MockLocalAudio>,
}

impl Fixture {
    fn start() -> Self {
        let config = RuntimeConfig::for_testing();
        let bus = Arc::new(config.event_bus());
        let transport = Arc::new(MockSinkTransport::new());
        let scanner = Arc::new(MockSyncScanner::new());
        let audio = Arc::new(MockLocalAudio::new());
        let ports = RuntimePorts {
            transport: transport.clone(),
            scanner: scanner.clone(),
            groups: Arc::new(MockGroupDirectory::new()),
            local_audio: audio.clone(),
        };

        let runtime = AssistantRuntime::start(config, ports, bus.clone())
            .expect("runtime should start");
        let handle = runtime.handle();
        Self {
            runtime,
            handle,
            bus,
            transport,
            scanner,
            audio,
        }
    }

    fn subscribe(&self, topic: EventTopic) -> Subscription {
        self.bus.subscribe(EventFilter::topics(vec![topic]))
    }

    async fn connect(&self, address: DeviceAddress) {
        self.transport
            .set_receive_states(address, vec![ReceiveState::empty(0)]);
        self.handle
            .send(Command::ConnectionStateChanged {
                sink: address,
                state: ConnectionState::Connected,
            })
            .await
            .unwrap();
    }

    /// Poll the engine until `check` holds.
    async fn wait_for(&self, check: impl Fn(&AssistantStats) -> bool) -> AssistantStats {
        for _ in 0..100 {
            let stats = self.handle.stats().await.unwrap();
            if check(&stats) {
                return stats;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("engine never reached the expected state");
    }
}

fn sink(n: u8) -> DeviceAddress {
    DeviceAddress::new([0x5E, 0, 0, 0, 0, n])
}

fn source(n: u8) -> DeviceAddress {
    DeviceAddress::new([0x50, 0, 0, 0, 0, n])
}

fn bid(n: u8) -> BroadcastId {
    BroadcastId::new(0x1000 + u32::from(n)).unwrap()
}

fn scan(n: u8) -> ScanResult {
    ScanResult {
        device: source(n),
        address_type: AddressType::Random,
        adv_sid: n,
        rssi: -50,
        pa_interval: Some(0x40),
        advertising_data: fixtures::broadcast_announcement(bid(n).value()),
    }
}

fn metadata(n: u8) -> BroadcastMetadata {
    BroadcastMetadata::new(source(n), AddressType::Random, n, bid(n))
}

async fn next_event(subscription: &mut Subscription) -> AssistantEvent {
    timeout(Duration::from_millis(500), subscription.recv())
        .await
        .expect("event within timeout")
        .expect("bus still open")
}

#[tokio::test]
async fn test_search_callbacks_reach_subscribers() {
    let fixture = Fixture::start();
    let mut search = fixture.subscribe(EventTopic::Search);

    fixture.handle.start_searching(Vec::new()).await.unwrap();
    assert_eq!(
        next_event(&mut search).await,
        AssistantEvent::SearchStarted {
            reason: Reason::LocalAppRequest
        }
    );
    assert!(fixture.handle.is_searching().await.unwrap());

    fixture.handle.stop_searching().await.unwrap();
    assert_eq!(
        next_event(&mut search).await,
        AssistantEvent::SearchStopped {
            reason: Reason::LocalAppRequest
        }
    );
    assert!(!fixture.handle.is_searching().await.unwrap());
}

#[tokio::test]
async fn test_discovered_source_is_reported() {
    let fixture = Fixture::start();
    let mut discovery = fixture.subscribe(EventTopic::Discovery);

    fixture.handle.start_searching(Vec::new()).await.unwrap();
    fixture.handle.send(Command::ScanResult(scan(1))).await.unwrap();
    fixture
        .handle
        .send(Command::SyncEstablished {
            handle: SyncHandle(1),
            device: source(1),
            adv_sid: 1,
            success: true,
        })
        .await
        .unwrap();
    fixture
        .handle
        .send(Command::PeriodicReport {
            handle: SyncHandle(1),
            data: fixtures::stereo_base(),
        })
        .await
        .unwrap();

    match next_event(&mut discovery).await {
        AssistantEvent::SourceFound { metadata } => {
            assert_eq!(metadata.broadcast_id, bid(1));
            assert_eq!(metadata.source_device, source(1));
        }
        other => panic!("unexpected event {other:?}"),
    }

    let stats = fixture.handle.stats().await.unwrap();
    assert_eq!(stats.active_syncs, 1);
    assert_eq!(stats.syncs_established, 1);
    assert_eq!(fixture.scanner.registrations(), vec![source(1)]);
}

#[tokio::test]
async fn test_add_to_unknown_sink_fails_per_sink() {
    let fixture = Fixture::start();
    let mut operations = fixture.bus.subscribe(
        EventFilter::topics(vec![EventTopic::SourceOperation]).for_sinks(vec![sink(9)]),
    );
    fixture.audio.add_local_broadcast(bid(7), false);

    fixture
        .handle
        .add_source(sink(9), metadata(7), false)
        .await
        .unwrap();

    assert_eq!(
        next_event(&mut operations).await,
        AssistantEvent::SourceAddFailed {
            sink: sink(9),
            metadata: metadata(7),
            error: AssistantError::NotConnected
        }
    );
    assert!(
        SOURCE_OPERATIONS
            .with_label_values(&["add", "failure"])
            .get()
            >= 1.0
    );
    assert!(fixture.transport.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_idle_sync_is_torn_down_by_timer() {
    let fixture = Fixture::start();
    fixture.connect(sink(1)).await;

    fixture
        .handle
        .add_source(sink(1), metadata(1), false)
        .await
        .unwrap();
    fixture
        .handle
        .send(Command::SyncEstablished {
            handle: SyncHandle(1),
            device: source(1),
            adv_sid: 1,
            success: true,
        })
        .await
        .unwrap();

    fixture.wait_for(|s| s.active_syncs == 1).await;
    assert_eq!(
        fixture.transport.calls(),
        vec![TransportCall::Add {
            sink: sink(1),
            broadcast_id: bid(1)
        }]
    );

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    fixture.wait_for(|s| s.active_syncs == 0).await;
    assert_eq!(fixture.scanner.unregistered(), vec![SyncHandle(1)]);
}

#[tokio::test(start_paused = true)]
async fn test_dial_out_timer_stops_local_broadcast() {
    let fixture = Fixture::start();
    fixture.audio.add_local_broadcast(bid(7), true);
    fixture.connect(sink(1)).await;

    fixture
        .handle
        .add_source(sink(1), metadata(7), false)
        .await
        .unwrap();
    fixture
        .handle
        .send(Command::SourceAdded {
            sink: sink(1),
            state: ReceiveState {
                source_device: source(7),
                source_address_type: AddressType::Random,
                source_adv_sid: 7,
                broadcast_id: bid(7),
                pa_sync_state: PaSyncState::Idle,
                bis_sync_state: vec![1],
                ..ReceiveState::empty(0)
            },
            reason: Reason::LocalAppRequest,
        })
        .await
        .unwrap();
    fixture
        .handle
        .send(Command::DeviceDisconnection {
            sink: sink(1),
            intentional: false,
        })
        .await
        .unwrap();

    fixture.handle.stats().await.unwrap();
    assert!(fixture.audio.stopped().is_empty());

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    fixture.wait_for(|_| !fixture.audio.stopped().is_empty()).await;
    assert_eq!(fixture.audio.stopped(), vec![bid(7)]);
}

#[tokio::test]
async fn test_shutdown_releases_engine() {
    let fixture = Fixture::start();
    let handle = fixture.handle.clone();
    let mut search = fixture.subscribe(EventTopic::Search);

    handle.start_searching(Vec::new()).await.unwrap();
    next_event(&mut search).await;

    fixture.runtime.shutdown().await.unwrap();
    assert!(fixture.scanner.calls().contains(&ScanCall::StopScan));

    assert_eq!(handle.stats().await.unwrap_err(), RuntimeError::ChannelClosed);
    assert_eq!(
        handle.try_send(Command::StopSearching),
        Err(RuntimeError::ChannelClosed)
    );
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut config = RuntimeConfig::for_testing();
    config.assistant.sync.max_active_synced_sources = 0;
    let bus = Arc::new(config.event_bus());
    let ports = RuntimePorts {
        transport: Arc::new(MockSinkTransport::new()),
        scanner: Arc::new(MockSyncScanner::new()),
        groups: Arc::new(MockGroupDirectory::new()),
        local_audio: Arc::new(MockLocalAudio::new()),
    };

    let err = AssistantRuntime::start(config, ports, bus).err().unwrap();
    assert!(err.to_string().contains("invalid assistant configuration"));
}

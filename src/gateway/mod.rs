//! UDP protocol gateway between the host and the guest
//!
//! One [`Gateway`] owns the socket and every background task:
//! - receive loop decoding guest requests
//! - action sender draining the FIFO of host→guest commands after INIT
//! - publisher actor owning controller state, shared memory and push
//!   subscribers
//! - fixed-rate republish ticker
//! - rumble poller, which also advances the turbo clock

mod actor;
mod commands;
mod direct;
mod handle;
mod input_api;
mod receive;
mod sender;

#[cfg(test)]
mod tests;

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::engine::PhaseClock;
use crate::error::GatewayError;
use crate::host::{
    AssignmentStore, HapticActuator, LoggingHaptics, MemoryAssignmentStore, NoVirtualSource,
    ProcessInfoListener, VirtualSource,
};
use crate::rumble::{run_poller, RumbleRelay, SlotDeviceTable};
use crate::shm::SharedMemoryPublisher;

use actor::{PublisherActor, PublisherParts};
use direct::DirectSender;
use handle::LiveSettings;
use receive::Receiver;
use sender::{ActionQueue, ActionSender};

pub use handle::{GatewayHandle, PublisherHandle};
pub use input_api::InputApiPolicy;
pub use sender::Action;

/// Nominal republish rate
pub const PUBLISH_INTERVAL: Duration = Duration::from_micros(8_333);

pub(crate) type SharedListener = Arc<RwLock<Option<Arc<dyn ProcessInfoListener>>>>;

/// Resolves once the running flag turns false or its sender is gone
pub(crate) async fn stopped(running: &mut watch::Receiver<bool>) {
    let _ = running.wait_for(|running| !*running).await;
}

/// Host collaborators the gateway consumes
pub struct Collaborators {
    pub store: Arc<dyn AssignmentStore>,
    pub virtual_source: Arc<dyn VirtualSource>,
    pub haptics: Arc<dyn HapticActuator>,
}

impl Collaborators {
    /// In-memory store seeded from the config's static assignments
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(MemoryAssignmentStore::new(config.assignments.clone())),
            ..Default::default()
        }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            store: Arc::new(MemoryAssignmentStore::new(Vec::new())),
            virtual_source: Arc::new(NoVirtualSource),
            haptics: Arc::new(LoggingHaptics),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Re-read on INIT when set
    pub config_path: Option<PathBuf>,
    /// Directory holding `gamepad.mem` / `gamepadN.mem`
    pub shm_dir: PathBuf,
    /// `None` disables the fixed-rate ticker
    pub publish_interval: Option<Duration>,
}

impl GatewayOptions {
    pub fn new(shm_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_path: None,
            shm_dir: shm_dir.into(),
            publish_interval: Some(PUBLISH_INTERVAL),
        }
    }
}

/// Pointer position as last reported by the guest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerPosition {
    pub x: i16,
    pub y: i16,
    /// Bumped on every report
    pub generation: u64,
}

/// Shared pointer position written by the receive loop
#[derive(Clone, Default)]
pub struct PointerState {
    inner: Arc<RwLock<PointerPosition>>,
}

impl PointerState {
    pub fn get(&self) -> PointerPosition {
        *self.inner.read()
    }

    pub fn update(&self, x: i16, y: i16) {
        let mut position = self.inner.write();
        position.x = x;
        position.y = y;
        position.generation += 1;
    }
}

pub struct Gateway {
    local_addr: SocketAddr,
    handle: GatewayHandle,
    running_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Gateway {
    /// Bind the server socket and spawn every gateway task
    pub async fn start(
        config: AppConfig,
        collaborators: Collaborators,
        options: GatewayOptions,
    ) -> Result<Self, GatewayError> {
        let addr = format!(
            "{}:{}",
            config.network.bind_address, config.network.server_port
        );
        let socket = UdpSocket::bind(&addr)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = socket.local_addr().map_err(|source| GatewayError::Bind {
            addr: addr.clone(),
            source,
        })?;
        let socket = Arc::new(socket);

        // The guest shares the host's address; wildcard binds talk to loopback
        let client_ip = if local_addr.ip().is_unspecified() {
            Ipv4Addr::LOCALHOST.into()
        } else {
            local_addr.ip()
        };
        let client = SocketAddr::new(client_ip, config.network.client_port);

        info!(
            "Gateway listening on {} (guest at {}, shared memory in {})",
            local_addr,
            client,
            options.shm_dir.display()
        );

        let (running_tx, running_rx) = watch::channel(true);
        let (initialized_tx, initialized_rx) = watch::channel(false);

        let shm = Arc::new(SharedMemoryPublisher::open(
            &options.shm_dir,
            config.shared_memory.players,
        ));
        let direct = Arc::new(DirectSender::new(socket.clone()));
        let clock = PhaseClock::default();
        let slot_devices = SlotDeviceTable::default();
        let rumble_config = Arc::new(RwLock::new(config.rumble.clone()));
        let listener = SharedListener::default();
        let pointer = PointerState::default();

        let publisher = PublisherActor::spawn(
            &config,
            PublisherParts {
                store: collaborators.store.clone(),
                virtual_source: collaborators.virtual_source,
                shm: shm.clone(),
                direct: direct.clone(),
                clock: clock.clone(),
                slot_devices: slot_devices.clone(),
                initialized: initialized_rx.clone(),
            },
        );

        let settings = LiveSettings {
            startup: Arc::new(config.clone()),
            store: collaborators.store.clone(),
            rumble: rumble_config.clone(),
            publisher: publisher.clone(),
        };

        let (actions, action_rx) = ActionQueue::channel();
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(
            ActionSender::new(
                socket.clone(),
                action_rx,
                initialized_rx.clone(),
                running_rx.clone(),
                listener.clone(),
            )
            .run(),
        ));

        tasks.push(tokio::spawn(
            Receiver {
                socket,
                publisher: publisher.clone(),
                actions: actions.clone(),
                direct,
                initialized: initialized_tx,
                pointer: pointer.clone(),
                listener: listener.clone(),
                settings: settings.clone(),
                config_path: options.config_path,
                running: running_rx.clone(),
            }
            .run(),
        ));

        if let Some(interval) = options.publish_interval {
            tasks.push(tokio::spawn(run_ticker(
                interval,
                publisher.clone(),
                running_rx.clone(),
            )));
        }

        let relay = RumbleRelay::new(
            shm,
            collaborators.haptics,
            collaborators.store,
            slot_devices,
            rumble_config,
        );
        tasks.push(tokio::spawn(run_poller(
            relay,
            clock,
            publisher.clone(),
            running_rx,
        )));

        let handle = GatewayHandle::new(
            publisher,
            actions,
            client,
            initialized_rx,
            pointer,
            listener,
            settings,
        );

        Ok(Self {
            local_addr,
            handle,
            running_tx,
            tasks,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> GatewayHandle {
        self.handle.clone()
    }

    /// Stop every task and release the socket
    pub async fn stop(self) {
        info!("Stopping gateway...");
        let _ = self.running_tx.send(false);
        self.handle.publisher().shutdown();

        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Gateway task ended abnormally: {}", e);
            }
        }
        info!("Gateway stopped");
    }
}

/// Unconditional republish so gyro and turbo changes stay visible
async fn run_ticker(
    interval: Duration,
    publisher: PublisherHandle,
    mut running: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => publisher.publish_cycle(),
            _ = stopped(&mut running) => break,
        }
    }
    debug!("Publish ticker stopped");
}

//! Registry Client
//!
//! Async facade over the actor protocol for code living outside the actor
//! world. Every call allocates a fresh request id, waits for the single reply
//! with a bounded timeout, and checks the reply echoes the id it sent.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use iot_runtime::{ActorError, request};
use kameo::actor::{ActorRef, Spawn};
use tracing::{debug, info, warn};

use crate::config::IotConfig;
use crate::device::DeviceMsg;
use crate::error::{Error, Result};
use crate::manager::ManagerMsg;
use crate::messages::{
    CollectReadings, DeviceId, DeviceRef, GroupId, ListDevices, ReadingOutcome, RequestId,
    TrackDevice,
};
use crate::supervisor::{IotSupervisor, ManagerRef, SupervisorMsg};

fn check_request_id(sent: RequestId, received: RequestId) -> Result<()> {
    if sent == received {
        Ok(())
    } else {
        Err(Error::RequestMismatch { sent, received })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry Client
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable handle for talking to the device manager
#[derive(Clone)]
pub struct RegistryClient {
    manager: ManagerRef,
    next_request_id: Arc<AtomicU64>,
    ask_timeout: Duration,
    query_timeout: Duration,
}

impl RegistryClient {
    pub fn new(manager: ManagerRef, ask_timeout: Duration, query_timeout: Duration) -> Self {
        Self {
            manager,
            next_request_id: Arc::new(AtomicU64::new(1)),
            ask_timeout,
            query_timeout,
        }
    }

    pub fn manager(&self) -> &ManagerRef {
        &self.manager
    }

    fn next_request_id(&self) -> RequestId {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a device, creating its group and the device on first use
    pub async fn track_device(&self, group_id: &str, device_id: &str) -> Result<DeviceRef> {
        let request_id = self.next_request_id();
        let reply = request(
            &self.manager,
            |reply_to| {
                ManagerMsg::TrackDevice(TrackDevice {
                    request_id,
                    group_id: group_id.to_string(),
                    device_id: device_id.to_string(),
                    reply_to,
                })
            },
            self.ask_timeout,
        )
        .await?;

        check_request_id(request_id, reply.request_id)?;
        Ok(reply.device)
    }

    pub async fn list_devices(&self, group_id: &str) -> Result<HashSet<DeviceId>> {
        let request_id = self.next_request_id();
        let reply = request(
            &self.manager,
            |reply_to| {
                ManagerMsg::ListDevices(ListDevices {
                    request_id,
                    group_id: group_id.to_string(),
                    reply_to,
                })
            },
            self.ask_timeout,
        )
        .await?;

        check_request_id(request_id, reply.request_id)?;
        Ok(reply.device_ids)
    }

    pub async fn list_groups(&self) -> Result<HashSet<GroupId>> {
        let request_id = self.next_request_id();
        let reply = request(
            &self.manager,
            |reply_to| ManagerMsg::ListGroups {
                request_id,
                reply_to,
            },
            self.ask_timeout,
        )
        .await?;

        check_request_id(request_id, reply.request_id)?;
        Ok(reply.group_ids)
    }

    /// Record a value; returns once the device acknowledged it
    pub async fn record_value(&self, device: &DeviceRef, value: f64) -> Result<()> {
        let request_id = self.next_request_id();
        let reply = request(
            device,
            |reply_to| DeviceMsg::RecordValue {
                request_id,
                value,
                reply_to,
            },
            self.ask_timeout,
        )
        .await?;

        check_request_id(request_id, reply.request_id)
    }

    pub async fn read_value(&self, device: &DeviceRef) -> Result<Option<f64>> {
        let request_id = self.next_request_id();
        let reply = request(
            device,
            |reply_to| DeviceMsg::ReadValue {
                request_id,
                reply_to,
            },
            self.ask_timeout,
        )
        .await?;

        check_request_id(request_id, reply.request_id)?;
        Ok(reply.value)
    }

    /// Collect every reading in a group using the configured deadline
    pub async fn collect_readings(
        &self,
        group_id: &str,
    ) -> Result<HashMap<DeviceId, ReadingOutcome>> {
        self.collect_readings_within(group_id, self.query_timeout)
            .await
    }

    pub async fn collect_readings_within(
        &self,
        group_id: &str,
        deadline: Duration,
    ) -> Result<HashMap<DeviceId, ReadingOutcome>> {
        let request_id = self.next_request_id();
        let reply = request(
            &self.manager,
            |reply_to| {
                ManagerMsg::CollectReadings(CollectReadings {
                    request_id,
                    group_id: group_id.to_string(),
                    deadline,
                    reply_to,
                })
            },
            // The query answers by its own deadline
            deadline.saturating_add(self.ask_timeout),
        )
        .await?;

        check_request_id(request_id, reply.request_id)?;
        debug!(request_id, group_id, devices = reply.readings.len(), "Readings collected");
        Ok(reply.readings)
    }

    pub async fn retire_device(&self, device: &DeviceRef) -> Result<()> {
        device
            .tell(DeviceMsg::Retire)
            .await
            .map_err(|_| ActorError::NotRunning(device.id()))?;
        Ok(())
    }

    pub async fn retire_group(&self, group_id: &str) -> Result<()> {
        self.manager
            .tell(ManagerMsg::RetireGroup {
                group_id: group_id.to_string(),
            })
            .await
            .map_err(|_| ActorError::NotRunning(self.manager.id()))?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IoT System
// ─────────────────────────────────────────────────────────────────────────────

/// A running registry: supervisor, device manager and a client for it
pub struct IotSystem {
    name: String,
    supervisor: ActorRef<IotSupervisor>,
    client: RegistryClient,
    shutdown_timeout: Duration,
}

impl IotSystem {
    /// Spawn the supervisor and wait until the device manager is reachable
    pub async fn start(config: &IotConfig) -> Result<Self> {
        let supervisor = IotSupervisor::spawn(IotSupervisor::new());

        let manager = request(&supervisor, SupervisorMsg::GetManager, config.ask_timeout()).await?;
        info!(system = %config.system_name, manager = ?manager.id(), "IoT system started");

        let client = RegistryClient::new(manager, config.ask_timeout(), config.query_timeout());
        Ok(Self {
            name: config.system_name.clone(),
            supervisor,
            client,
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    pub fn client(&self) -> &RegistryClient {
        &self.client
    }

    pub fn supervisor(&self) -> &ActorRef<IotSupervisor> {
        &self.supervisor
    }

    /// Stop the supervisor and everything below it
    pub async fn shutdown(self) -> Result<()> {
        info!(system = %self.name, "Shutting down IoT system");
        let _ = self.supervisor.stop_gracefully().await;

        let stopped = async {
            self.supervisor.wait_for_shutdown().await;
            self.client.manager().wait_for_shutdown().await;
        };
        if tokio::time::timeout(self.shutdown_timeout, stopped).await.is_err() {
            warn!(system = %self.name, timeout = ?self.shutdown_timeout, "Shutdown timed out");
            return Err(Error::Timeout(self.shutdown_timeout));
        }
        Ok(())
    }
}

use std::collections::HashMap;
use std::convert::Infallible;
use std::ops::ControlFlow;

use kameo::Actor;
use kameo::actor::{ActorId, ActorRef, Spawn, WeakActorRef};
use kameo::error::ActorStopReason;
use tracing::{info, warn};

use crate::device::Device;
use crate::messages::{
    AllDevices, CollectReadings, DeviceId, DeviceRef, GroupId, ListDevices, Registered, TrackDevice,
};
use crate::query::DeviceGroupQuery;

/// Messages understood by a [`DeviceGroup`]
#[derive(Debug)]
pub enum GroupMsg {
    TrackDevice(TrackDevice),
    ListDevices(ListDevices),
    CollectReadings(CollectReadings),
}

/// Registry of the devices belonging to one group
pub struct DeviceGroup {
    group_id: GroupId,
    devices: HashMap<DeviceId, DeviceRef>,
    linked: HashMap<ActorId, DeviceId>,
}

impl DeviceGroup {
    pub fn new(group_id: impl Into<GroupId>) -> Self {
        Self {
            group_id: group_id.into(),
            devices: HashMap::new(),
            linked: HashMap::new(),
        }
    }

    async fn on_track_device(&mut self, group: &ActorRef<Self>, msg: TrackDevice) {
        if msg.group_id != self.group_id {
            warn!(
                request_group_id = %msg.group_id,
                group_id = %self.group_id,
                "Device group asked to act on behalf of another group, ignoring request"
            );
            return;
        }

        let device = match self.devices.get(&msg.device_id).cloned() {
            Some(device) => device,
            None => self.create_device(group, &msg.device_id).await,
        };

        msg.reply_to
            .send(Registered {
                request_id: msg.request_id,
                device,
            })
            .await;
    }

    async fn create_device(&mut self, group: &ActorRef<Self>, device_id: &str) -> DeviceRef {
        let device = Device::spawn(Device::new(self.group_id.clone(), device_id));
        let _ = group.link(&device).await;
        info!(group_id = %self.group_id, device_id = %device_id, "Device actor created");

        self.devices.insert(device_id.to_string(), device.clone());
        self.linked.insert(device.id(), device_id.to_string());
        device
    }

    async fn on_list_devices(&mut self, msg: ListDevices) {
        let device_ids = self.devices.keys().cloned().collect();
        msg.reply_to
            .send(AllDevices {
                request_id: msg.request_id,
                device_ids,
            })
            .await;
    }

    fn on_collect_readings(&self, msg: CollectReadings) {
        // The query gets its own copy of the registry
        let snapshot = self.devices.clone();
        DeviceGroupQuery::<Device>::spawn(DeviceGroupQuery::new(
            msg.request_id,
            snapshot,
            msg.reply_to,
            msg.deadline,
        ));
    }

    fn on_device_terminated(&mut self, id: ActorId) {
        let Some(device_id) = self.linked.remove(&id) else {
            return;
        };

        // A stale notice must not evict a device re-created under the same id
        if self.devices.get(&device_id).map(|device| device.id()) == Some(id) {
            self.devices.remove(&device_id);
            info!(group_id = %self.group_id, device_id = %device_id, "Device actor has been terminated");
        }
    }

    fn is_own_group(&self, group_id: &str, request: &str) -> bool {
        if group_id == self.group_id {
            return true;
        }
        warn!(
            request_group_id = %group_id,
            group_id = %self.group_id,
            request,
            "Ignoring request addressed to another group"
        );
        false
    }
}

impl Actor for DeviceGroup {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, _actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(group_id = %state.group_id, "Device group started");
        Ok(state)
    }

    async fn on_link_died(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        id: ActorId,
        _reason: ActorStopReason,
    ) -> Result<ControlFlow<ActorStopReason>, Self::Error> {
        self.on_device_terminated(id);
        Ok(ControlFlow::Continue(()))
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        _reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        for device in self.devices.values() {
            let _ = device.stop_gracefully().await;
        }
        info!(group_id = %self.group_id, "Device group stopped");
        Ok(())
    }
}

impl kameo::message::Message<GroupMsg> for DeviceGroup {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: GroupMsg,
        ctx: &mut kameo::message::Context<Self, Self::Reply>,
    ) -> Self::Reply {
        match msg {
            GroupMsg::TrackDevice(msg) => {
                let group = ctx.actor_ref().clone();
                self.on_track_device(&group, msg).await;
            }

            GroupMsg::ListDevices(msg) => {
                if self.is_own_group(&msg.group_id, "list-devices") {
                    self.on_list_devices(msg).await;
                }
            }

            GroupMsg::CollectReadings(msg) => {
                if self.is_own_group(&msg.group_id, "collect-readings") {
                    self.on_collect_readings(msg);
                }
            }
        }
    }
}

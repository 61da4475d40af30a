use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::ops::ControlFlow;

use iot_runtime::ReplyTo;
use kameo::Actor;
use kameo::actor::{ActorId, ActorRef, Spawn, WeakActorRef};
use kameo::error::ActorStopReason;
use tracing::{debug, info};

use crate::group::{DeviceGroup, GroupMsg};
use crate::messages::{
    AllDevices, AllGroups, AllReadings, CollectReadings, GroupId, GroupRef, ListDevices, RequestId,
    TrackDevice,
};

/// Messages understood by the [`DeviceManager`]
#[derive(Debug)]
pub enum ManagerMsg {
    /// Register a device, creating its group on first reference
    TrackDevice(TrackDevice),
    ListDevices(ListDevices),
    CollectReadings(CollectReadings),
    ListGroups {
        request_id: RequestId,
        reply_to: ReplyTo<AllGroups>,
    },
    /// Stop a group and every device in it; no reply
    RetireGroup { group_id: GroupId },
}

/// Top-level registry of device groups
#[derive(Default)]
pub struct DeviceManager {
    groups: HashMap<GroupId, GroupRef>,
    linked: HashMap<ActorId, GroupId>,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self::default()
    }

    async fn create_group(&mut self, manager: &ActorRef<Self>, group_id: &str) -> GroupRef {
        let group = DeviceGroup::spawn(DeviceGroup::new(group_id));
        let _ = manager.link(&group).await;
        info!(group_id = %group_id, "Device group actor created");

        self.groups.insert(group_id.to_string(), group.clone());
        self.linked.insert(group.id(), group_id.to_string());
        group
    }

    async fn on_track_device(&mut self, manager: &ActorRef<Self>, msg: TrackDevice) {
        let group = match self.groups.get(&msg.group_id).cloned() {
            Some(group) => group,
            None => self.create_group(manager, &msg.group_id).await,
        };
        let _ = group.tell(GroupMsg::TrackDevice(msg)).await;
    }

    async fn on_list_devices(&mut self, msg: ListDevices) {
        match self.groups.get(&msg.group_id).cloned() {
            Some(group) => {
                let _ = group.tell(GroupMsg::ListDevices(msg)).await;
            }
            None => {
                msg.reply_to
                    .send(AllDevices {
                        request_id: msg.request_id,
                        device_ids: HashSet::new(),
                    })
                    .await;
            }
        }
    }

    async fn on_collect_readings(&mut self, msg: CollectReadings) {
        match self.groups.get(&msg.group_id).cloned() {
            Some(group) => {
                let _ = group.tell(GroupMsg::CollectReadings(msg)).await;
            }
            None => {
                msg.reply_to
                    .send(AllReadings {
                        request_id: msg.request_id,
                        readings: HashMap::new(),
                    })
                    .await;
            }
        }
    }

    async fn on_retire_group(&mut self, group_id: &str) {
        // Unregister first so requests arriving meanwhile get a fresh group
        match self.groups.remove(group_id) {
            Some(group) => {
                info!(group_id = %group_id, "Retiring device group");
                let _ = group.stop_gracefully().await;
            }
            None => debug!(group_id = %group_id, "Retire requested for unknown group"),
        }
    }

    fn on_group_terminated(&mut self, id: ActorId) {
        let Some(group_id) = self.linked.remove(&id) else {
            return;
        };

        if self.groups.get(&group_id).map(|group| group.id()) == Some(id) {
            self.groups.remove(&group_id);
            info!(group_id = %group_id, "Device group actor has been terminated");
        }
    }
}

impl Actor for DeviceManager {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, _actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!("Device manager started");
        Ok(state)
    }

    async fn on_link_died(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        id: ActorId,
        _reason: ActorStopReason,
    ) -> Result<ControlFlow<ActorStopReason>, Self::Error> {
        self.on_group_terminated(id);
        Ok(ControlFlow::Continue(()))
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        _reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        for group in self.groups.values() {
            let _ = group.stop_gracefully().await;
        }
        info!("Device manager stopped");
        Ok(())
    }
}

impl kameo::message::Message<ManagerMsg> for DeviceManager {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: ManagerMsg,
        ctx: &mut kameo::message::Context<Self, Self::Reply>,
    ) -> Self::Reply {
        match msg {
            ManagerMsg::TrackDevice(msg) => {
                let manager = ctx.actor_ref().clone();
                self.on_track_device(&manager, msg).await;
            }
            ManagerMsg::ListDevices(msg) => self.on_list_devices(msg).await,
            ManagerMsg::CollectReadings(msg) => self.on_collect_readings(msg).await,
            ManagerMsg::ListGroups {
                request_id,
                reply_to,
            } => {
                let group_ids = self.groups.keys().cloned().collect();
                reply_to
                    .send(AllGroups {
                        request_id,
                        group_ids,
                    })
                    .await;
            }
            ManagerMsg::RetireGroup { group_id } => self.on_retire_group(&group_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use iot_runtime::testkit::ReplyInbox;
    use uuid::Uuid;

    use crate::device::DeviceMsg;
    use crate::messages::{ReadingOutcome, Registered};

    fn random_id() -> String {
        Uuid::new_v4().to_string()
    }

    async fn track(
        manager: &ActorRef<DeviceManager>,
        group_id: &str,
        device_id: &str,
        inbox: &ReplyInbox<Registered>,
    ) {
        manager
            .tell(ManagerMsg::TrackDevice(TrackDevice {
                request_id: 0,
                group_id: group_id.to_string(),
                device_id: device_id.to_string(),
                reply_to: inbox.reply_to(),
            }))
            .await
            .unwrap();
    }

    async fn list(manager: &ActorRef<DeviceManager>, group_id: &str, request_id: u64) -> AllDevices {
        let mut inbox = ReplyInbox::new();
        manager
            .tell(ManagerMsg::ListDevices(ListDevices {
                request_id,
                group_id: group_id.to_string(),
                reply_to: inbox.reply_to(),
            }))
            .await
            .unwrap();
        inbox.expect_reply().await
    }

    async fn groups(manager: &ActorRef<DeviceManager>) -> HashSet<GroupId> {
        let mut inbox = ReplyInbox::new();
        manager
            .tell(ManagerMsg::ListGroups {
                request_id: 0,
                reply_to: inbox.reply_to(),
            })
            .await
            .unwrap();
        inbox.expect_reply().await.group_ids
    }

    #[tokio::test]
    async fn test_list_active_devices() {
        let manager = DeviceManager::spawn(DeviceManager::new());
        let mut registered = ReplyInbox::new();
        let group_id = random_id();

        let device_ids: HashSet<String> = (0..5).map(|_| random_id()).collect();
        for device_id in &device_ids {
            track(&manager, &group_id, device_id, &registered).await;
            registered.expect_reply().await;
        }

        let reply = list(&manager, &group_id, 3).await;
        assert_eq!(reply.request_id, 3);
        assert_eq!(reply.device_ids, device_ids);
    }

    #[tokio::test]
    async fn test_list_active_devices_when_one_shuts_down() {
        let manager = DeviceManager::spawn(DeviceManager::new());
        let mut registered = ReplyInbox::new();
        let group_id = random_id();

        let device_ids: HashSet<String> = (0..5).map(|_| random_id()).collect();
        let mut devices = Vec::new();
        for device_id in &device_ids {
            track(&manager, &group_id, device_id, &registered).await;
            devices.push(registered.expect_reply().await.device);
        }
        assert_eq!(list(&manager, &group_id, 1).await.device_ids, device_ids);

        devices[0].tell(DeviceMsg::Retire).await.unwrap();
        devices[0].wait_for_shutdown().await;

        let mut remaining = list(&manager, &group_id, 1).await.device_ids.len();
        for _ in 0..50 {
            if remaining == device_ids.len() - 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            remaining = list(&manager, &group_id, 1).await.device_ids.len();
        }
        assert_eq!(remaining, device_ids.len() - 1);
    }

    #[tokio::test]
    async fn test_unknown_group_reads_return_empty_without_creating_group() {
        let manager = DeviceManager::spawn(DeviceManager::new());

        let reply = list(&manager, "missing", 4).await;
        assert_eq!(reply.request_id, 4);
        assert!(reply.device_ids.is_empty());

        let mut readings = ReplyInbox::new();
        manager
            .tell(ManagerMsg::CollectReadings(CollectReadings {
                request_id: 5,
                group_id: "missing".to_string(),
                deadline: Duration::from_secs(3),
                reply_to: readings.reply_to(),
            }))
            .await
            .unwrap();
        let reply = readings.expect_reply().await;
        assert_eq!(reply.request_id, 5);
        assert!(reply.readings.is_empty());

        assert!(groups(&manager).await.is_empty());
    }

    #[tokio::test]
    async fn test_same_device_in_different_groups_are_distinct() {
        let manager = DeviceManager::spawn(DeviceManager::new());
        let mut registered = ReplyInbox::new();

        track(&manager, "g1", "device", &registered).await;
        let first = registered.expect_reply().await.device;
        track(&manager, "g2", "device", &registered).await;
        let second = registered.expect_reply().await.device;

        assert_ne!(first.id(), second.id());
        assert_eq!(
            groups(&manager).await,
            HashSet::from(["g1".to_string(), "g2".to_string()])
        );
    }

    #[tokio::test]
    async fn test_collect_readings_through_manager() {
        let manager = DeviceManager::spawn(DeviceManager::new());
        let mut registered = ReplyInbox::new();
        let mut recorded = ReplyInbox::new();

        track(&manager, "g1", "d1", &registered).await;
        let device = registered.expect_reply().await.device;
        device
            .tell(DeviceMsg::RecordValue {
                request_id: 2,
                value: 21.5,
                reply_to: recorded.reply_to(),
            })
            .await
            .unwrap();
        recorded.expect_reply().await;

        let mut readings = ReplyInbox::new();
        manager
            .tell(ManagerMsg::CollectReadings(CollectReadings {
                request_id: 3,
                group_id: "g1".to_string(),
                deadline: Duration::from_secs(3),
                reply_to: readings.reply_to(),
            }))
            .await
            .unwrap();

        let reply = readings.expect_reply().await;
        assert_eq!(reply.request_id, 3);
        assert_eq!(
            reply.readings,
            HashMap::from([("d1".to_string(), ReadingOutcome::Value(21.5))])
        );
    }

    #[tokio::test]
    async fn test_retired_group_is_removed() {
        let manager = DeviceManager::spawn(DeviceManager::new());
        let mut registered = ReplyInbox::new();

        track(&manager, "g1", "d1", &registered).await;
        let device = registered.expect_reply().await.device;
        track(&manager, "g2", "d1", &registered).await;
        registered.expect_reply().await;

        manager
            .tell(ManagerMsg::RetireGroup {
                group_id: "g1".to_string(),
            })
            .await
            .unwrap();
        device.wait_for_shutdown().await;

        assert_eq!(groups(&manager).await, HashSet::from(["g2".to_string()]));
        assert!(list(&manager, "g1", 6).await.device_ids.is_empty());
    }

    #[tokio::test]
    async fn test_track_right_after_retire_creates_fresh_group() {
        let manager = DeviceManager::spawn(DeviceManager::new());
        let mut registered = ReplyInbox::new();

        track(&manager, "g1", "d1", &registered).await;
        let retired = registered.expect_reply().await.device;

        // No wait between the two requests
        manager
            .tell(ManagerMsg::RetireGroup {
                group_id: "g1".to_string(),
            })
            .await
            .unwrap();
        track(&manager, "g1", "d2", &registered).await;

        let fresh = registered
            .expect_reply_within(Duration::from_millis(500))
            .await
            .device;
        assert!(fresh.is_alive());

        // The late notice for the retired group leaves the new one in place
        retired.wait_for_shutdown().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(groups(&manager).await, HashSet::from(["g1".to_string()]));
        assert_eq!(
            list(&manager, "g1", 7).await.device_ids,
            HashSet::from(["d2".to_string()])
        );
    }
}

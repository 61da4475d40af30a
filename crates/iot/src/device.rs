use std::convert::Infallible;
use std::ops::ControlFlow;

use iot_runtime::ReplyTo;
use kameo::Actor;
use kameo::actor::{ActorId, ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use tracing::info;

use crate::messages::{Acknowledged, DeviceId, GroupId, Reading, RequestId};

/// Messages understood by a [`Device`]
#[derive(Debug)]
pub enum DeviceMsg {
    /// Overwrite the latest value
    RecordValue {
        request_id: RequestId,
        value: f64,
        reply_to: ReplyTo<Acknowledged>,
    },
    /// Report the latest value, if any
    ReadValue {
        request_id: RequestId,
        reply_to: ReplyTo<Reading>,
    },
    /// Stop the device; no reply
    Retire,
}

/// A single device holding its latest reading
pub struct Device {
    group_id: GroupId,
    device_id: DeviceId,
    last_value: Option<f64>,
}

impl Device {
    pub fn new(group_id: impl Into<GroupId>, device_id: impl Into<DeviceId>) -> Self {
        Self {
            group_id: group_id.into(),
            device_id: device_id.into(),
            last_value: None,
        }
    }
}

impl Actor for Device {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, _actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(group_id = %state.group_id, device_id = %state.device_id, "Device started");
        Ok(state)
    }

    // Groups and queries link to devices; their end never ends the device
    async fn on_link_died(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        _id: ActorId,
        _reason: ActorStopReason,
    ) -> Result<ControlFlow<ActorStopReason>, Self::Error> {
        Ok(ControlFlow::Continue(()))
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(group_id = %self.group_id, device_id = %self.device_id, ?reason, "Device stopped");
        Ok(())
    }
}

impl kameo::message::Message<DeviceMsg> for Device {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: DeviceMsg,
        ctx: &mut kameo::message::Context<Self, Self::Reply>,
    ) -> Self::Reply {
        match msg {
            DeviceMsg::RecordValue {
                request_id,
                value,
                reply_to,
            } => {
                self.last_value = Some(value);
                info!(request_id, value, device_id = %self.device_id, "Reading recorded");
                reply_to.send(Acknowledged { request_id }).await;
            }

            DeviceMsg::ReadValue {
                request_id,
                reply_to,
            } => {
                reply_to
                    .send(Reading {
                        request_id,
                        device_id: self.device_id.clone(),
                        value: self.last_value,
                    })
                    .await;
            }

            DeviceMsg::Retire => ctx.stop(),
        }
    }
}

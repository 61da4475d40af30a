//! Group Query
//!
//! A short-lived actor answering one [`CollectReadings`](crate::messages::CollectReadings)
//! request. It links to every device in a fixed snapshot, asks each for its
//! reading, and resolves each device exactly once:
//!
//! - a reply resolves it to `Value` or `NoReading`
//! - the link dying resolves it to `Unavailable`
//! - the deadline resolves everything still pending to `TimedOut`
//!
//! Whatever resolves a device first wins. Once every device is resolved the
//! query sends a single [`AllReadings`] reply and stops, which aborts the
//! deadline timer.
//!
//! A device delivers its reading into the query's mailbox before it can stop,
//! so a device that answers and then stops always counts as answered.

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::ops::ControlFlow;
use std::time::Duration;

use iot_runtime::ReplyTo;
use kameo::Actor;
use kameo::actor::{ActorId, ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::Message;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::device::{Device, DeviceMsg};
use crate::messages::{AllReadings, DeviceId, Reading, ReadingOutcome, RequestId};

/// Messages understood by a [`DeviceGroupQuery`]
#[derive(Debug)]
pub enum QueryMsg {
    /// A device answered
    Reading(Reading),
    /// The deadline elapsed
    CollectionTimeout,
}

/// Scatter/gather coordinator for one aggregate read
///
/// `D` is the device actor; tests substitute doubles for it.
pub struct DeviceGroupQuery<D: Actor = Device> {
    request_id: RequestId,
    devices: HashMap<DeviceId, ActorRef<D>>,
    linked: HashMap<ActorId, DeviceId>,
    reply_to: Option<ReplyTo<AllReadings>>,
    deadline: Duration,
    timer: Option<JoinHandle<()>>,
    pending: HashSet<DeviceId>,
    collected: HashMap<DeviceId, ReadingOutcome>,
}

impl<D> DeviceGroupQuery<D>
where
    D: Actor + Message<DeviceMsg>,
{
    /// `devices` is an owned snapshot; later registry changes never reach it
    pub fn new(
        request_id: RequestId,
        devices: HashMap<DeviceId, ActorRef<D>>,
        reply_to: ReplyTo<AllReadings>,
        deadline: Duration,
    ) -> Self {
        let pending = devices.keys().cloned().collect();
        let linked = devices
            .iter()
            .map(|(device_id, device)| (device.id(), device_id.clone()))
            .collect();
        Self {
            request_id,
            devices,
            linked,
            reply_to: Some(reply_to),
            deadline,
            timer: None,
            pending,
            collected: HashMap::new(),
        }
    }

    fn resolve(&mut self, device_id: &str, outcome: ReadingOutcome) {
        if self.pending.remove(device_id) {
            self.collected.insert(device_id.to_string(), outcome);
        }
    }

    /// Send the aggregate reply once nothing is pending; true when done
    async fn respond_when_all_collected(&mut self) -> bool {
        if !self.pending.is_empty() {
            return false;
        }

        if let Some(reply_to) = self.reply_to.take() {
            debug!(
                request_id = self.request_id,
                devices = self.collected.len(),
                "Group query complete"
            );
            reply_to
                .send(AllReadings {
                    request_id: self.request_id,
                    readings: std::mem::take(&mut self.collected),
                })
                .await;
        }
        true
    }
}

impl<D> Actor for DeviceGroupQuery<D>
where
    D: Actor + Message<DeviceMsg>,
{
    type Args = Self;
    type Error = Infallible;

    async fn on_start(mut state: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        let devices: Vec<(DeviceId, ActorRef<D>)> = state
            .devices
            .iter()
            .map(|(device_id, device)| (device_id.clone(), device.clone()))
            .collect();

        for (device_id, device) in devices {
            let _ = actor_ref.link(&device).await;

            let read = DeviceMsg::ReadValue {
                request_id: state.request_id,
                reply_to: ReplyTo::actor(actor_ref.clone(), QueryMsg::Reading),
            };
            if device.tell(read).await.is_err() {
                // Already stopped, so no link notice will follow
                state.resolve(&device_id, ReadingOutcome::Unavailable);
            }
        }

        if state.respond_when_all_collected().await {
            let _ = actor_ref.stop_gracefully().await;
            return Ok(state);
        }

        let deadline = state.deadline;
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let _ = actor_ref.tell(QueryMsg::CollectionTimeout).await;
        }));

        Ok(state)
    }

    async fn on_link_died(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        id: ActorId,
        reason: ActorStopReason,
    ) -> Result<ControlFlow<ActorStopReason>, Self::Error> {
        if let Some(device_id) = self.linked.get(&id).cloned() {
            debug!(request_id = self.request_id, device_id = %device_id, ?reason, "Device stopped during query");
            self.resolve(&device_id, ReadingOutcome::Unavailable);
        }

        if self.respond_when_all_collected().await {
            return Ok(ControlFlow::Break(ActorStopReason::Normal));
        }
        Ok(ControlFlow::Continue(()))
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        _reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        Ok(())
    }
}

impl<D> Message<QueryMsg> for DeviceGroupQuery<D>
where
    D: Actor + Message<DeviceMsg>,
{
    type Reply = ();

    async fn handle(
        &mut self,
        msg: QueryMsg,
        ctx: &mut kameo::message::Context<Self, Self::Reply>,
    ) -> Self::Reply {
        match msg {
            QueryMsg::Reading(reading) => {
                if reading.request_id != self.request_id {
                    debug!(
                        request_id = reading.request_id,
                        expected = self.request_id,
                        "Ignoring reading for another request"
                    );
                    return;
                }
                self.resolve(&reading.device_id, ReadingOutcome::from_reading(reading.value));
            }

            QueryMsg::CollectionTimeout => {
                for device_id in self.pending.drain() {
                    self.collected.insert(device_id, ReadingOutcome::TimedOut);
                }
            }
        }

        if self.respond_when_all_collected().await {
            ctx.stop();
        }
    }
}

use std::convert::Infallible;
use std::ops::ControlFlow;

use iot_runtime::ReplyTo;
use kameo::Actor;
use kameo::actor::{ActorId, ActorRef, Spawn, WeakActorRef};
use kameo::error::ActorStopReason;
use tracing::{info, warn};

use crate::manager::DeviceManager;

/// Handle to the running device manager
pub type ManagerRef = ActorRef<DeviceManager>;

/// Messages understood by the [`IotSupervisor`]
#[derive(Debug)]
pub enum SupervisorMsg {
    /// Ask for the manager handle
    GetManager(ReplyTo<ManagerRef>),
}

/// Root of the application tree; owns the device manager
#[derive(Default)]
pub struct IotSupervisor {
    manager: Option<ManagerRef>,
}

impl IotSupervisor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actor for IotSupervisor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(mut state: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!("IoT application started");
        let manager = DeviceManager::spawn(DeviceManager::new());
        let _ = actor_ref.link(&manager).await;
        state.manager = Some(manager);
        Ok(state)
    }

    async fn on_link_died(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        id: ActorId,
        reason: ActorStopReason,
    ) -> Result<ControlFlow<ActorStopReason>, Self::Error> {
        if self.manager.as_ref().map(|manager| manager.id()) == Some(id) {
            warn!(?reason, "Device manager stopped");
        }
        Ok(ControlFlow::Continue(()))
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        _reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        if let Some(manager) = &self.manager {
            let _ = manager.stop_gracefully().await;
        }
        info!("IoT application stopped");
        Ok(())
    }
}

impl kameo::message::Message<SupervisorMsg> for IotSupervisor {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: SupervisorMsg,
        _ctx: &mut kameo::message::Context<Self, Self::Reply>,
    ) -> Self::Reply {
        match msg {
            SupervisorMsg::GetManager(reply_to) => {
                if let Some(manager) = self.manager.clone() {
                    reply_to.send(manager).await;
                }
            }
        }
    }
}

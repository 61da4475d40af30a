//! Registry protocol
//!
//! Request and reply types shared by the manager, the groups and the devices.
//! Every reply echoes the caller's `request_id` unchanged.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use iot_runtime::ReplyTo;
use kameo::actor::ActorRef;
use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::group::DeviceGroup;

/// Caller-chosen correlation token
pub type RequestId = u64;

/// Identifier of a device group
pub type GroupId = String;

/// Identifier of a device, unique within its group
pub type DeviceId = String;

/// Handle to a running device
pub type DeviceRef = ActorRef<Device>;

/// Handle to a running device group
pub type GroupRef = ActorRef<DeviceGroup>;

// ─────────────────────────────────────────────────────────────────────────────
// Group-scoped requests
// ─────────────────────────────────────────────────────────────────────────────

/// Register a device, creating it on first reference
#[derive(Debug)]
pub struct TrackDevice {
    pub request_id: RequestId,
    pub group_id: GroupId,
    pub device_id: DeviceId,
    pub reply_to: ReplyTo<Registered>,
}

/// Reply to [`TrackDevice`]
#[derive(Debug, Clone)]
pub struct Registered {
    pub request_id: RequestId,
    pub device: DeviceRef,
}

/// List the devices currently registered in a group
#[derive(Debug)]
pub struct ListDevices {
    pub request_id: RequestId,
    pub group_id: GroupId,
    pub reply_to: ReplyTo<AllDevices>,
}

/// Reply to [`ListDevices`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllDevices {
    pub request_id: RequestId,
    pub device_ids: HashSet<DeviceId>,
}

/// Collect the latest reading of every device in a group
#[derive(Debug)]
pub struct CollectReadings {
    pub request_id: RequestId,
    pub group_id: GroupId,
    pub deadline: Duration,
    pub reply_to: ReplyTo<AllReadings>,
}

/// Reply to [`CollectReadings`], one outcome per device in the snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct AllReadings {
    pub request_id: RequestId,
    pub readings: HashMap<DeviceId, ReadingOutcome>,
}

/// Result for a single device inside an aggregate read
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ReadingOutcome {
    /// The device answered with a recorded value
    Value(f64),
    /// The device answered but has never recorded a value
    NoReading,
    /// The device stopped before answering
    Unavailable,
    /// Neither an answer nor a stop arrived before the deadline
    TimedOut,
}

impl ReadingOutcome {
    pub fn from_reading(value: Option<f64>) -> Self {
        match value {
            Some(v) => ReadingOutcome::Value(v),
            None => ReadingOutcome::NoReading,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Device replies
// ─────────────────────────────────────────────────────────────────────────────

/// Reply to a recorded value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledged {
    pub request_id: RequestId,
}

/// Reply to a value read
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub request_id: RequestId,
    pub device_id: DeviceId,
    pub value: Option<f64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager replies
// ─────────────────────────────────────────────────────────────────────────────

/// Reply to a group listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllGroups {
    pub request_id: RequestId,
    pub group_ids: HashSet<GroupId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_reading() {
        assert_eq!(ReadingOutcome::from_reading(Some(21.5)), ReadingOutcome::Value(21.5));
        assert_eq!(ReadingOutcome::from_reading(None), ReadingOutcome::NoReading);
    }

    #[test]
    fn test_outcome_json_shape() {
        let json = serde_json::to_value(ReadingOutcome::Value(1.5)).unwrap();
        assert_eq!(json, serde_json::json!({"status": "value", "value": 1.5}));

        let json = serde_json::to_value(ReadingOutcome::TimedOut).unwrap();
        assert_eq!(json, serde_json::json!({"status": "timed_out"}));
    }
}

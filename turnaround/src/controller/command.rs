//! Per-domain commands accepted by the controller.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use tokio_util::sync::CancellationToken;

use crate::coordinator::{CoordinatorSet, Domain, Door, Entity, OperationOutcome};

use super::error::ControllerError;

/// A start or stop request for one domain operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceCommand {
    OpenDoor(Door),
    CloseDoor(Door),
    ConnectEquipment,
    DisconnectEquipment,
    StartBoarding,
    StopBoarding,
    StartDeboarding,
    StopDeboarding,
    StartLoading,
    StopLoading,
    StartUnloading,
    StopUnloading,
    StartRefueling,
    StopRefueling,
    StartDefueling,
    StopDefueling,
}

impl ServiceCommand {
    /// Domain the command is routed to.
    pub fn domain(&self) -> Domain {
        use ServiceCommand::*;
        match self {
            OpenDoor(_) | CloseDoor(_) => Domain::Door,
            ConnectEquipment | DisconnectEquipment => Domain::Equipment,
            StartBoarding | StopBoarding | StartDeboarding | StopDeboarding => Domain::Passenger,
            StartLoading | StopLoading | StartUnloading | StopUnloading => Domain::Cargo,
            StartRefueling | StopRefueling | StartDefueling | StopDefueling => Domain::Fuel,
        }
    }

    /// Whether the command cancels an operation rather than starting one.
    pub fn is_stop(&self) -> bool {
        use ServiceCommand::*;
        matches!(
            self,
            StopBoarding
                | StopDeboarding
                | StopLoading
                | StopUnloading
                | StopRefueling
                | StopDefueling
        )
    }

    /// Issue the command without waiting for it to finish.
    pub(crate) fn execute(&self, set: &CoordinatorSet) -> bool {
        use ServiceCommand::*;
        match *self {
            OpenDoor(door) => set.door.start_open_door(door),
            CloseDoor(door) => set.door.start_close_door(door),
            ConnectEquipment => set.equipment.start_connect(),
            DisconnectEquipment => set.equipment.start_disconnect(),
            StartBoarding => set.passenger.start_boarding(),
            StopBoarding => set.passenger.stop_boarding(),
            StartDeboarding => set.passenger.start_deboarding(),
            StopDeboarding => set.passenger.stop_deboarding(),
            StartLoading => set.cargo.start_loading(),
            StopLoading => set.cargo.stop_loading(),
            StartUnloading => set.cargo.start_unloading(),
            StopUnloading => set.cargo.stop_unloading(),
            StartRefueling => set.fuel.start_refueling(),
            StopRefueling => set.fuel.stop_refueling(),
            StartDefueling => set.fuel.start_defueling(),
            StopDefueling => set.fuel.stop_defueling(),
        }
    }

    /// Run the command to completion.
    ///
    /// Stop commands wait for the domain to go idle and report the percentage
    /// reached at the moment of stopping.
    pub(crate) async fn execute_async(
        &self,
        set: &CoordinatorSet,
        cancel: &CancellationToken,
    ) -> Result<OperationOutcome, ControllerError> {
        use ServiceCommand::*;

        if self.is_stop() {
            let percent = set
                .get(self.domain())
                .status()
                .progress_percent
                .unwrap_or(0.0);
            let stopped = match *self {
                StopBoarding => set.passenger.stop_boarding_async().await,
                StopDeboarding => set.passenger.stop_deboarding_async().await,
                StopLoading => set.cargo.stop_loading_async().await,
                StopUnloading => set.cargo.stop_unloading_async().await,
                StopRefueling => set.fuel.stop_refueling_async().await,
                _ => set.fuel.stop_defueling_async().await,
            };
            return if stopped {
                Ok(OperationOutcome::Stopped { percent })
            } else {
                Err(ControllerError::NotRunning(*self))
            };
        }

        let outcome = match *self {
            OpenDoor(door) => set.door.open_door_async(door, cancel).await,
            CloseDoor(door) => set.door.close_door_async(door, cancel).await,
            ConnectEquipment => set.equipment.connect_async(cancel).await,
            DisconnectEquipment => set.equipment.disconnect_async(cancel).await,
            StartBoarding => set.passenger.board_async(cancel).await,
            StartDeboarding => set.passenger.deboard_async(cancel).await,
            StartLoading => set.cargo.load_async(cancel).await,
            StartUnloading => set.cargo.unload_async(cancel).await,
            StartRefueling => set.fuel.refuel_async(cancel).await,
            _ => set.fuel.defuel_async(cancel).await,
        }?;
        Ok(outcome)
    }
}

impl fmt::Display for ServiceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ServiceCommand::*;
        match self {
            OpenDoor(door) => write!(f, "open {}", door.name()),
            CloseDoor(door) => write!(f, "close {}", door.name()),
            ConnectEquipment => f.write_str("connect equipment"),
            DisconnectEquipment => f.write_str("disconnect equipment"),
            StartBoarding => f.write_str("start boarding"),
            StopBoarding => f.write_str("stop boarding"),
            StartDeboarding => f.write_str("start deboarding"),
            StopDeboarding => f.write_str("stop deboarding"),
            StartLoading => f.write_str("start loading"),
            StopLoading => f.write_str("stop loading"),
            StartUnloading => f.write_str("start unloading"),
            StopUnloading => f.write_str("stop unloading"),
            StartRefueling => f.write_str("start refueling"),
            StopRefueling => f.write_str("stop refueling"),
            StartDefueling => f.write_str("start defueling"),
            StopDefueling => f.write_str("stop defueling"),
        }
    }
}

impl FromStr for ServiceCommand {
    type Err = String;

    /// Parse the forms produced by `Display`, e.g. `"start boarding"` or
    /// `"open forward_left"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use ServiceCommand::*;
        let normalized = s.trim().to_lowercase().replace(['-', '_'], " ");
        let words: Vec<&str> = normalized.split_whitespace().collect();
        let command = match words.as_slice() {
            ["open", door @ ..] | ["close", door @ ..] if !door.is_empty() => {
                let door: Door = door.join("_").parse()?;
                if words[0] == "open" {
                    OpenDoor(door)
                } else {
                    CloseDoor(door)
                }
            }
            ["connect", "equipment"] => ConnectEquipment,
            ["disconnect", "equipment"] => DisconnectEquipment,
            ["start", "boarding"] => StartBoarding,
            ["stop", "boarding"] => StopBoarding,
            ["start", "deboarding"] => StartDeboarding,
            ["stop", "deboarding"] => StopDeboarding,
            ["start", "loading"] => StartLoading,
            ["stop", "loading"] => StopLoading,
            ["start", "unloading"] => StartUnloading,
            ["stop", "unloading"] => StopUnloading,
            ["start", "refueling"] => StartRefueling,
            ["stop", "refueling"] => StopRefueling,
            ["start", "defueling"] => StartDefueling,
            ["stop", "defueling"] => StopDefueling,
            _ => return Err(format!("unknown command '{}'", s)),
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domains() {
        assert_eq!(ServiceCommand::OpenDoor(Door::AftLeft).domain(), Domain::Door);
        assert_eq!(ServiceCommand::StopLoading.domain(), Domain::Cargo);
        assert_eq!(ServiceCommand::StartDefueling.domain(), Domain::Fuel);
        assert!(ServiceCommand::StopRefueling.is_stop());
        assert!(!ServiceCommand::ConnectEquipment.is_stop());
    }

    #[test]
    fn test_parse_display_forms() {
        assert_eq!(
            "start boarding".parse::<ServiceCommand>().unwrap(),
            ServiceCommand::StartBoarding
        );
        assert_eq!(
            "Disconnect-Equipment".parse::<ServiceCommand>().unwrap(),
            ServiceCommand::DisconnectEquipment
        );
        let open = ServiceCommand::OpenDoor(Door::ForwardCargo);
        assert_eq!(open.to_string().parse::<ServiceCommand>().unwrap(), open);
        assert!("start dancing".parse::<ServiceCommand>().is_err());
    }
}

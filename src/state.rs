// MIT License - Copyright (c) 2021 TJForc
// Alarm state store: partitions and zones owned by one session or simulator

use serde::Serialize;

use crate::constants::PartitionStatusCode;
use crate::devices::{
    PartitionDelta, PartitionState, PartitionStatusFlags, ZoneDelta, ZoneState, ZoneStatusFlags,
};
use crate::error::{Result, TpiError};

/// All partitions and zones known to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlarmState {
    partitions: Vec<PartitionState>,
    zones: Vec<ZoneState>,
}

impl AlarmState {
    /// Create partitions `1..=partitions` and zones `1..=zones` with default status.
    pub fn initialize(partitions: u32, zones: u32) -> Self {
        Self {
            partitions: (1..=partitions).map(PartitionState::new).collect(),
            zones: (1..=zones).map(ZoneState::new).collect(),
        }
    }

    pub fn num_partitions(&self) -> u32 {
        self.partitions.len() as u32
    }

    pub fn num_zones(&self) -> u32 {
        self.zones.len() as u32
    }

    pub fn partitions(&self) -> &[PartitionState] {
        &self.partitions
    }

    pub fn zones(&self) -> &[ZoneState] {
        &self.zones
    }

    pub fn partition(&self, id: u32) -> Option<&PartitionState> {
        id.checked_sub(1).and_then(|i| self.partitions.get(i as usize))
    }

    pub fn zone(&self, id: u32) -> Option<&ZoneState> {
        id.checked_sub(1).and_then(|i| self.zones.get(i as usize))
    }

    pub(crate) fn partition_mut(&mut self, id: u32) -> Result<&mut PartitionState> {
        let max = self.num_partitions();
        id.checked_sub(1)
            .and_then(|i| self.partitions.get_mut(i as usize))
            .ok_or(TpiError::InvalidPartition { id, max })
    }

    pub(crate) fn zone_mut(&mut self, id: u32) -> Result<&mut ZoneState> {
        let max = self.num_zones();
        id.checked_sub(1)
            .and_then(|i| self.zones.get_mut(i as usize))
            .ok_or(TpiError::InvalidZone { id, max })
    }

    /// Merge a delta into one partition. Returns the flags that changed.
    pub fn apply_partition_status(
        &mut self,
        partition: u32,
        delta: &PartitionDelta,
    ) -> Result<PartitionStatusFlags> {
        Ok(self.partition_mut(partition)?.apply(delta))
    }

    /// Merge a delta into every partition. Returns the ids of partitions that changed.
    pub fn apply_all_partitions(&mut self, delta: &PartitionDelta) -> Vec<u32> {
        self.partitions
            .iter_mut()
            .filter_map(|p| {
                let alpha_changed = delta.alpha.is_some_and(|a| a != p.alpha);
                let changed = p.apply(delta);
                (!changed.is_empty() || alpha_changed).then_some(p.id)
            })
            .collect()
    }

    /// Merge a delta into one zone. Returns the flags that changed.
    pub fn apply_zone_status(&mut self, zone: u32, delta: &ZoneDelta) -> Result<ZoneStatusFlags> {
        Ok(self.zone_mut(zone)?.apply(delta))
    }

    /// Record a zone's bypass state. Returns whether it changed.
    pub fn set_zone_bypassed(&mut self, zone: u32, bypassed: bool) -> Result<bool> {
        let z = self.zone_mut(zone)?;
        let changed = z.bypassed != Some(bypassed);
        z.bypassed = Some(bypassed);
        Ok(changed)
    }

    pub fn set_last_fault(&mut self, zone: u32, seconds: u32) -> Result<()> {
        self.zone_mut(zone)?.last_fault = seconds;
        Ok(())
    }

    /// Apply a Honeywell partition status code.
    ///
    /// `EXIT_ENTRY_DELAY` means exit delay when the partition was disarmed and
    /// entry delay when it was already armed.
    pub fn apply_partition_code(
        &mut self,
        partition: u32,
        code: PartitionStatusCode,
    ) -> Result<PartitionStatusFlags> {
        let p = self.partition_mut(partition)?;
        let previously_armed = p.is_armed();
        let delay = code == PartitionStatusCode::ExitEntryDelay;

        let mut delta = PartitionDelta::new()
            .assign(PartitionStatusFlags::EXIT_DELAY, delay && !previously_armed)
            .assign(PartitionStatusFlags::ENTRY_DELAY, delay && previously_armed)
            .assign(PartitionStatusFlags::ARMED, code.is_armed())
            .assign(PartitionStatusFlags::READY, code.is_ready())
            .assign(PartitionStatusFlags::ALARM, code == PartitionStatusCode::InAlarm);
        delta = match code {
            PartitionStatusCode::ArmedStay => delta.set(PartitionStatusFlags::ARMED_STAY),
            PartitionStatusCode::ArmedAway => delta.set(PartitionStatusFlags::ARMED_AWAY),
            PartitionStatusCode::ArmedMax => delta.set(PartitionStatusFlags::ARMED_MAX),
            PartitionStatusCode::Ready
            | PartitionStatusCode::ReadyBypass
            | PartitionStatusCode::NotReady => delta.clear(PartitionStatusFlags::ARMED_MODES),
            _ => delta,
        };
        // A delay code mid-arm keeps the partition's armed bit as it was.
        if delay && previously_armed {
            delta = delta.set(PartitionStatusFlags::ARMED);
        }
        Ok(p.apply(&delta))
    }

    /// Clone of the current state for external readers.
    pub fn snapshot(&self) -> AlarmState {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize() {
        let state = AlarmState::initialize(8, 64);
        assert_eq!(state.num_partitions(), 8);
        assert_eq!(state.num_zones(), 64);
        assert_eq!(state.partition(1).unwrap().id, 1);
        assert_eq!(state.zone(64).unwrap().id, 64);
        assert!(state.zone(65).is_none());
        assert!(state.partition(0).is_none());
    }

    #[test]
    fn test_out_of_range_ids() {
        let mut state = AlarmState::initialize(2, 64);
        assert!(matches!(
            state.apply_partition_status(3, &PartitionDelta::new()),
            Err(TpiError::InvalidPartition { id: 3, max: 2 })
        ));
        assert!(matches!(
            state.apply_zone_status(0, &ZoneDelta::faulted(true)),
            Err(TpiError::InvalidZone { id: 0, max: 64 })
        ));
    }

    #[test]
    fn test_redundant_update_is_noop() {
        let mut state = AlarmState::initialize(1, 8);
        let delta = PartitionDelta::new().set(PartitionStatusFlags::READY);
        assert!(!state.apply_partition_status(1, &delta).unwrap().is_empty());
        let before = state.snapshot();
        assert!(state.apply_partition_status(1, &delta).unwrap().is_empty());
        assert_eq!(state, before);
    }

    #[test]
    fn test_exit_delay_when_disarmed() {
        let mut state = AlarmState::initialize(1, 8);
        state
            .apply_partition_code(1, PartitionStatusCode::ExitEntryDelay)
            .unwrap();
        let p = state.partition(1).unwrap();
        assert!(p.is_exit_delay());
        assert!(!p.is_entry_delay());
        assert!(!p.is_armed());
    }

    #[test]
    fn test_entry_delay_when_armed() {
        let mut state = AlarmState::initialize(1, 8);
        state
            .apply_partition_code(1, PartitionStatusCode::ArmedAway)
            .unwrap();
        assert!(state.partition(1).unwrap().is_armed_away());

        state
            .apply_partition_code(1, PartitionStatusCode::ExitEntryDelay)
            .unwrap();
        let p = state.partition(1).unwrap();
        assert!(p.is_entry_delay());
        assert!(!p.is_exit_delay());
        assert!(p.is_armed());
    }

    #[test]
    fn test_ready_code_disarms() {
        let mut state = AlarmState::initialize(1, 8);
        state
            .apply_partition_code(1, PartitionStatusCode::ArmedStay)
            .unwrap();
        state.apply_partition_code(1, PartitionStatusCode::Ready).unwrap();
        let p = state.partition(1).unwrap();
        assert!(p.is_ready());
        assert!(!p.is_armed());
        assert!(!p.is_armed_stay());
    }

    #[test]
    fn test_apply_all_partitions() {
        let mut state = AlarmState::initialize(3, 8);
        let delta = PartitionDelta::new().clear(PartitionStatusFlags::AC_PRESENT);
        assert_eq!(state.apply_all_partitions(&delta), vec![1, 2, 3]);
        assert!(state.apply_all_partitions(&delta).is_empty());
        assert!(state.partitions().iter().all(|p| !p.is_ac_present()));
    }

    #[test]
    fn test_zone_bypass_and_timer() {
        let mut state = AlarmState::initialize(1, 8);
        assert!(state.set_zone_bypassed(4, true).unwrap());
        assert!(!state.set_zone_bypassed(4, true).unwrap());
        assert_eq!(state.zone(4).unwrap().bypassed, Some(true));
        state.set_last_fault(4, 35).unwrap();
        assert_eq!(state.zone(4).unwrap().last_fault, 35);
    }
}

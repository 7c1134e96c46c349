// MIT License - Copyright (c) 2021 TJForc
// Partition and zone models

pub mod zone;
pub mod partition;

pub use zone::{ZoneDelta, ZoneState, ZoneStatusFlags};
pub use partition::{PartitionDelta, PartitionState, PartitionStatusFlags};

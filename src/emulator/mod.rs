// ============================================================================
// Device Emulator
// ============================================================================
//
// Stand-in for the dispensing hardware. Talks to the coordinator only through
// the channel wire contract, so it can be swapped for a real device.
//
// ============================================================================

mod device;

pub use device::{DeviceEmulator, EmulatorHandle, EmulatorMode, Emission, ScheduledEmission};

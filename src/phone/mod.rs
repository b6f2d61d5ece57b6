//! Dial state machine
//!
//! States follow one call cycle: OnHook, OffHookIdle, Dialing, DigitPause,
//! NumberComplete and Playing.

mod events;
mod machine;

pub use events::{Command, DialedNumber, PhoneEvent};
pub use machine::{DialStateMachine, PhoneState};

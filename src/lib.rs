//! JTAG pin discovery and probing over raw GPIO bit-banging.
//!
//! Given a handful of GPIO lines wired to an unknown target, the probe
//! engine brute-forces JTAG signal role assignments over them and confirms
//! candidates against two features every IEEE 1149.1 part implements: the
//! BYPASS register (a one-bit pass-through, good for counting devices and
//! echoing a test pattern) and the IDCODE register (the default DR after a
//! TAP reset). With a known pinout the same engine measures IR and DR
//! widths, enumerates opcodes and dumps boundary-scan cells.
//!
//! Everything is strictly single-threaded, synchronous bit-banging; the bus
//! frequency is governed entirely by the configured write dwell.

pub mod cmd;
pub mod gpio;
pub mod probe;

pub use gpio::{GpioDriver, GpioError, Level};
pub use probe::{IdCode, JtagEngine, NamedPin, PinRoles, ScanConfig};

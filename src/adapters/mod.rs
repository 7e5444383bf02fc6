//! Adapters — concrete implementations of the port traits.
//!
//! | Adapter      | Implements     | Connects to                     |
//! |--------------|----------------|---------------------------------|
//! | `delay`      | DelayNs        | `std::thread::sleep`            |
//! | `json_store` | PatientStore   | JSON document, memory or file   |
//! | `log_sink`   | EventSink      | `log` facade                    |
//! | `serial`     | Link           | USB/UART port via `serialport`  |
//! | `sim`        | Link           | in-process dispenser simulation |

pub mod delay;
pub mod json_store;
pub mod log_sink;
pub mod serial;
pub mod sim;

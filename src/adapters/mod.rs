//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements          | Connects to                   |
//! |----------------|---------------------|-------------------------------|
//! | `broadcast`    | -                   | UDP discovery broadcast       |
//! | `file_store`   | RecordStore         | JSON document on disk         |
//! |                | ConfigStore         |                               |
//! | `hidraw`       | ByteStreamReader    | `/dev/hidrawN` barcode scanner|
//! | `http_remote`  | RemotePort          | Home server (HTTP)            |
//! | `log_sink`     | EventSink           | `log` output                  |
//! | `sim`          | AnalogSampler       | Scripted load cell            |
//! |                | ByteStreamReader    | Silent scanner                |
//! |                | RemotePort          | Unreachable home server       |
//! | `sysfs_gpio`   | embedded-hal pins   | `/sys/class/gpio`             |
//! | `time`         | -                   | System clock (local time)     |

pub mod broadcast;
pub mod file_store;
pub mod hidraw;
#[cfg(feature = "http")]
pub mod http_remote;
pub mod log_sink;
pub mod sim;
pub mod sysfs_gpio;
pub mod time;

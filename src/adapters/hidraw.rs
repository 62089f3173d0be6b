//! Linux `hidraw` barcode scanner.
//!
//! The scanner enumerates as a USB keyboard; its raw 8-byte boot-protocol
//! reports are read from `/dev/hidrawN` without going through the input
//! layer, so scans never land in a console.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use async_io_mini::{Async, Timer};
use futures_lite::future;
use log::info;

use crate::app::ports::ByteStreamReader;
use crate::error::DeviceError;

pub struct HidrawScanner {
    dev: Async<File>,
}

impl HidrawScanner {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let dev = Async::new(file)?;
        info!("HidrawScanner: reading reports from {}", path.display());
        Ok(Self { dev })
    }
}

impl ByteStreamReader for HidrawScanner {
    async fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, DeviceError> {
        let read = async {
            self.dev
                .read_with(|f| {
                    let mut f: &File = f;
                    f.read(buf)
                })
                .await
                .map_err(DeviceError::from)
        };
        let expire = async {
            Timer::after(timeout).await;
            Ok(0)
        };
        future::or(read, expire).await
    }
}

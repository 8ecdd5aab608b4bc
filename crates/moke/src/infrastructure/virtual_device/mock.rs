//! Recording output device for unit testing.
//!
//! The [`MockOutputFactory`] records every device it is asked to create and
//! every byte buffer written to those devices.  Both records live behind an
//! `Arc<Mutex<...>>` so the test can inspect them after the sink has been
//! moved into the engine loop and dropped.
//!
//! # `should_fail` flag
//!
//! Set `should_fail = true` to make `create` fail, which exercises the output
//! error path without a real `/dev/uinput`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use moke_core::{decode_records, DeviceDeclaration, EventSink, InputRecord};

use crate::application::startup::OutputFactory;

/// Records created devices and the writes made to them.
#[derive(Debug, Default, Clone)]
pub struct MockOutputFactory {
    /// `(path, declaration)` for each successful `create`.
    pub created: Arc<Mutex<Vec<(PathBuf, DeviceDeclaration)>>>,
    /// Each buffer passed to `emit`, in order.
    pub writes: Arc<Mutex<Vec<Vec<u8>>>>,
    /// When `true`, `create` fails with `PermissionDenied`.
    pub should_fail: bool,
}

impl MockOutputFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write decoded back into records.
    pub fn written_records(&self) -> Vec<InputRecord> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .flat_map(|bytes| decode_records(bytes).unwrap())
            .collect()
    }
}

impl OutputFactory for MockOutputFactory {
    type Sink = MockOutput;

    fn create(&self, path: &Path, declaration: &DeviceDeclaration) -> io::Result<MockOutput> {
        if self.should_fail {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "permission denied",
            ));
        }
        self.created
            .lock()
            .unwrap()
            .push((path.to_path_buf(), declaration.clone()));
        Ok(MockOutput {
            writes: Arc::clone(&self.writes),
        })
    }
}

/// Sink handed out by [`MockOutputFactory`].
#[derive(Debug)]
pub struct MockOutput {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl EventSink for MockOutput {
    fn emit(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.writes.lock().unwrap().push(bytes.to_vec());
        Ok(bytes.len())
    }
}

//! Resolved media and the readiness barrier in front of layout.
//!
//! Image decoding happens elsewhere, usually on other threads. Those workers
//! push finished [`MediaAsset`]s through an [`AssetSender`]; layout calls
//! [`AssetBarrier::wait`] once, with a deadline, and gets a [`MediaStore`]
//! back. Whatever has not arrived by then is recorded as timed out and laid
//! out as a placeholder.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};

use crate::model::Size;

fn default_dpi() -> f64 {
    96.0
}

/// A decoded image with its intrinsic pixel dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    pub id: String,
    pub pixel_width: u32,
    pub pixel_height: u32,
    #[serde(default = "default_dpi")]
    pub dpi: f64,
    /// Decoded bytes, passed through to renderers.
    #[serde(default, skip_serializing)]
    pub data: Vec<u8>,
}

impl MediaAsset {
    pub fn new(id: &str, pixel_width: u32, pixel_height: u32) -> Self {
        Self {
            id: id.to_string(),
            pixel_width,
            pixel_height,
            dpi: default_dpi(),
            data: Vec::new(),
        }
    }

    /// Natural display size in points.
    pub fn intrinsic_size(&self) -> Size {
        let dpi = if self.dpi > 0.0 { self.dpi } else { default_dpi() };
        Size {
            width: self.pixel_width as f64 * 72.0 / dpi,
            height: self.pixel_height as f64 * 72.0 / dpi,
        }
    }
}

/// Media available to layout, keyed by media id.
#[derive(Debug, Clone, Default)]
pub struct MediaStore {
    assets: HashMap<String, MediaAsset>,
    timed_out: HashSet<String>,
}

impl FromIterator<MediaAsset> for MediaStore {
    fn from_iter<I: IntoIterator<Item = MediaAsset>>(iter: I) -> Self {
        let mut store = MediaStore::default();
        for asset in iter {
            store.insert(asset);
        }
        store
    }
}

impl MediaStore {
    pub fn insert(&mut self, asset: MediaAsset) {
        self.timed_out.remove(&asset.id);
        self.assets.insert(asset.id.clone(), asset);
    }

    pub fn get(&self, id: &str) -> Option<&MediaAsset> {
        self.assets.get(id)
    }

    /// Expected but not delivered before the barrier's deadline.
    pub fn is_timed_out(&self, id: &str) -> bool {
        self.timed_out.contains(id)
    }

    pub fn timed_out(&self) -> impl Iterator<Item = &str> {
        self.timed_out.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Fold another store in; its deliveries and timeouts win.
    pub fn absorb(&mut self, other: MediaStore) {
        for asset in other.assets.into_values() {
            self.insert(asset);
        }
        for id in other.timed_out {
            if !self.assets.contains_key(&id) {
                self.timed_out.insert(id);
            }
        }
    }
}

/// Handle given to decoding workers.
#[derive(Debug, Clone)]
pub struct AssetSender {
    inner: Sender<MediaAsset>,
}

impl AssetSender {
    /// Hand over a finished asset. Returns `false` once the barrier is gone.
    pub fn deliver(&self, asset: MediaAsset) -> bool {
        self.inner.send(asset).is_ok()
    }
}

/// Waits once, with a deadline, for a known set of media ids.
pub struct AssetBarrier {
    expected: HashSet<String>,
    sender: Sender<MediaAsset>,
    receiver: Receiver<MediaAsset>,
}

impl AssetBarrier {
    pub fn new<I, S>(expected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            expected: expected.into_iter().map(Into::into).collect(),
            sender,
            receiver,
        }
    }

    pub fn sender(&self) -> AssetSender {
        AssetSender {
            inner: self.sender.clone(),
        }
    }

    /// Block until every expected id has arrived, all senders are gone, or
    /// `timeout` elapses, whichever comes first.
    pub fn wait(self, timeout: Duration) -> MediaStore {
        let AssetBarrier {
            expected: mut pending,
            sender,
            receiver,
        } = self;
        drop(sender);

        let deadline = Instant::now() + timeout;
        let mut store = MediaStore::default();
        while !pending.is_empty() {
            match receiver.recv_deadline(deadline) {
                Ok(asset) => {
                    pending.remove(&asset.id);
                    store.insert(asset);
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        // Late arrivals already queued still count.
        while let Ok(asset) = receiver.try_recv() {
            pending.remove(&asset.id);
            store.insert(asset);
        }
        for id in pending {
            log::warn!("media `{id}` not resolved before the readiness deadline");
            store.timed_out.insert(id);
        }
        store
    }
}

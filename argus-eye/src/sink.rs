//! Display collaborator: where annotated frames and log records go

use crate::frame::Frame;
use crate::logger::DetectionRecord;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::warn;

/// Receives the pipeline's visible output. Implementations must not block.
pub trait DisplaySink: Send + Sync {
    /// Replace the latest frame (already in display encoding)
    fn publish_frame(&self, frame: &Frame);

    /// Remove any displayed frame
    fn clear(&self);

    /// A record was appended to the detection log
    fn push_record(&self, record: &DetectionRecord);
}

impl<T: DisplaySink + ?Sized> DisplaySink for Arc<T> {
    fn publish_frame(&self, frame: &Frame) {
        (**self).publish_frame(frame)
    }

    fn clear(&self) {
        (**self).clear()
    }

    fn push_record(&self, record: &DetectionRecord) {
        (**self).push_record(record)
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DisplaySink for NullSink {
    fn publish_frame(&self, _frame: &Frame) {}

    fn clear(&self) {}

    fn push_record(&self, _record: &DetectionRecord) {}
}

/// Channel-backed sink: a watch slot holding the latest frame and a
/// broadcast fan-out of records.
pub struct ChannelSink {
    frames: watch::Sender<Option<Frame>>,
    records: broadcast::Sender<DetectionRecord>,
}

impl ChannelSink {
    pub fn new(record_capacity: usize) -> Self {
        let (frames, _) = watch::channel(None);
        let (records, _) = broadcast::channel(record_capacity.max(1));
        Self { frames, records }
    }

    /// Watch the latest frame; `None` while nothing is displayed
    pub fn subscribe_frames(&self) -> watch::Receiver<Option<Frame>> {
        self.frames.subscribe()
    }

    /// Receive records appended from now on
    pub fn subscribe_records(&self) -> broadcast::Receiver<DetectionRecord> {
        self.records.subscribe()
    }

    /// Copy of the latest frame
    pub fn latest_frame(&self) -> Option<Frame> {
        self.frames.borrow().clone()
    }
}

impl Default for ChannelSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl DisplaySink for ChannelSink {
    fn publish_frame(&self, frame: &Frame) {
        self.frames.send_modify(|slot| match slot {
            // Reuse the displayed frame's allocation when the size is unchanged
            Some(existing) => existing.clone_from(frame),
            None => *slot = Some(frame.clone()),
        });
    }

    fn clear(&self) {
        self.frames.send_replace(None);
    }

    fn push_record(&self, record: &DetectionRecord) {
        // No receivers is normal when nothing displays the log
        if self.records.receiver_count() == 0 {
            return;
        }
        if self.records.send(record.clone()).is_err() {
            warn!("Record channel closed, dropping record");
        }
    }
}

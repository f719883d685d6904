// Messaging - Lock-free channels between the playback side and the UI

pub mod channels;

pub use channels::{create_playhead_channel, PlayheadConsumer, PlayheadProducer};

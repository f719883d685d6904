// Communication channels lock-free

use crate::sequencer::playhead::PlayheadUpdate;
use ringbuf::{HeapRb, traits::Split};

pub type PlayheadProducer = ringbuf::HeapProd<PlayheadUpdate>;
pub type PlayheadConsumer = ringbuf::HeapCons<PlayheadUpdate>;

pub fn create_playhead_channel(capacity: usize) -> (PlayheadProducer, PlayheadConsumer) {
    let rb = HeapRb::<PlayheadUpdate>::new(capacity.max(1));
    rb.split()
}

use super::{AudioError, AudioSink, PlaybackClock};
use crate::error::Failure;
use crate::host::{AudioFrame, Host, KeyHeld, Pointer};

/// Slots needed for at least 100 ms of queued audio, plus the one being refilled.
pub fn buffer_count(ticks_per_second: u32) -> usize {
    let lead = (ticks_per_second as f64 / 10.0).max(1.0).ceil() as usize;
    lead + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Prepared,
    Playing,
    Done,
}

struct Slot {
    samples: Vec<f32>,
    state: SlotState,
}

/// Fixed pool of interleaved stereo slots, filled and submitted round-robin.
pub struct RingBuffer {
    slots: Vec<Slot>,
    next: usize,
}

impl RingBuffer {
    pub fn new(buffers: usize, samples_per_tick: usize) -> Self {
        let slots = (0..buffers.max(1))
            .map(|_| Slot {
                samples: vec![0.0; samples_per_tick * 2],
                state: SlotState::Free,
            })
            .collect();
        Self { slots, next: 0 }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot that will be submitted next, which is also the next one due back.
    pub fn next_slot(&self) -> usize {
        self.next
    }

    pub fn state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot).map(|s| s.state)
    }

    pub fn samples(&self, slot: usize) -> Option<&[f32]> {
        self.slots.get(slot).map(|s| s.samples.as_slice())
    }

    /// Copies `frame` into the next slot and queues it on `sink`.
    pub fn submit<S: AudioSink + ?Sized>(&mut self, frame: &AudioFrame, sink: &mut S) -> Result<(), Failure> {
        let index = self.next;
        let slot = &mut self.slots[index];

        let expected = slot.samples.len();
        if frame.samples_per_tick() * 2 != expected || frame.right.len() != frame.left.len() {
            return Err(Failure::PrepareAudio(AudioError::SlotLength {
                slot: index,
                len: frame.left.len() + frame.right.len(),
                expected,
            }));
        }
        frame.interleave_into(&mut slot.samples);

        sink.prepare(index, expected).map_err(Failure::PrepareAudio)?;
        slot.state = SlotState::Prepared;
        sink.write(index, &slot.samples).map_err(Failure::WriteAudio)?;
        slot.state = SlotState::Playing;

        self.next = (index + 1) % self.slots.len();
        Ok(())
    }

    /// Releases a slot the device has finished with. Slots finish in submission order.
    pub fn reclaim<S: AudioSink + ?Sized>(&mut self, finished: usize, sink: &mut S) -> Result<(), Failure> {
        if finished != self.next {
            return Err(Failure::UnprepareAudio(AudioError::OutOfOrder {
                expected: self.next,
                got: finished,
            }));
        }
        let slot = &mut self.slots[finished];
        slot.state = SlotState::Done;
        sink.unprepare(finished).map_err(Failure::UnprepareAudio)?;
        slot.state = SlotState::Free;
        Ok(())
    }
}

/// Drives the host's `tick` from audio completions and keeps the playback clock in
/// step with the slot being played.
pub struct TickScheduler {
    ring: RingBuffer,
    clock: PlaybackClock,
    ticks: u64,
}

impl TickScheduler {
    pub fn new(ticks_per_second: u32, samples_per_tick: usize) -> Self {
        Self {
            ring: RingBuffer::new(buffer_count(ticks_per_second), samples_per_tick),
            clock: PlaybackClock::new(samples_per_tick as u32),
            ticks: 0,
        }
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    /// Ticks run so far, priming included.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Fills every slot before playback starts. The pointer is reported as absent.
    pub fn prime<H, S>(&mut self, host: &mut H, keys: &dyn KeyHeld, sink: &mut S) -> Result<(), Failure>
    where
        H: Host + ?Sized,
        S: AudioSink + ?Sized,
    {
        for _ in 0..self.ring.len() {
            host.tick(Pointer::default(), keys);
            self.ticks += 1;
            self.ring.submit(host.audio(), sink)?;
        }
        log::debug!("Primed {} audio slots", self.ring.len());
        Ok(())
    }

    /// Starts playback of the primed slots.
    pub fn start<S: AudioSink + ?Sized>(&mut self, sink: &mut S) -> Result<(), Failure> {
        sink.restart().map_err(Failure::RestartAudio)?;
        self.clock.start();
        Ok(())
    }

    pub fn on_buffer_done<H, S>(
        &mut self,
        finished: usize,
        host: &mut H,
        pointer: Pointer,
        keys: &dyn KeyHeld,
        sink: &mut S,
    ) -> Result<(), Failure>
    where
        H: Host + ?Sized,
        S: AudioSink + ?Sized,
    {
        self.ring.reclaim(finished, sink)?;
        host.tick(pointer, keys);
        self.ticks += 1;
        self.ring.submit(host.audio(), sink)?;
        self.clock.advance();
        Ok(())
    }

    pub fn progress<S: AudioSink + ?Sized>(&self, sink: &S) -> Result<f32, Failure> {
        if !self.clock.is_started() {
            return Ok(0.0);
        }
        let position = sink.position().map_err(Failure::AudioPosition)?;
        Ok(self.clock.progress(position))
    }
}

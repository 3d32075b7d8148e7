use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};

use super::{AudioError, AudioSink};

type Frame = (f32, f32);

/// Linear interpolation between queued frames when the device runs at a different rate.
#[derive(Debug, Clone, Copy)]
struct Resampler {
    /// Source frames per device frame.
    step: f64,
    phase: f64,
    current: Option<Frame>,
    next: Option<Frame>,
}

impl Resampler {
    fn new(source_rate: u32, device_rate: u32) -> Option<Self> {
        (source_rate != device_rate && device_rate > 0).then(|| Self {
            step: source_rate as f64 / device_rate as f64,
            phase: 0.0,
            current: None,
            next: None,
        })
    }

    fn restart(&mut self) {
        self.phase = 0.0;
        self.current = None;
        self.next = None;
    }
}

/// State the output callback drains, shared so `reset` can empty it.
struct Queues {
    samples: HeapConsumer<f32>,
    slot_ids: HeapConsumer<usize>,
    frames_into_slot: usize,
    resampler: Option<Resampler>,
}

impl Queues {
    fn pop_frame(&mut self) -> Option<Frame> {
        if self.samples.len() < 2 {
            return None;
        }
        Some((self.samples.pop().unwrap_or(0.0), self.samples.pop().unwrap_or(0.0)))
    }

    /// Next device frame and how many source frames finished playing with it.
    /// `None` when starved.
    fn next_output(&mut self) -> Option<(Frame, usize)> {
        let Some(mut rs) = self.resampler else {
            return self.pop_frame().map(|frame| (frame, 1));
        };

        if rs.current.is_none() {
            rs.current = self.pop_frame();
        }
        if rs.next.is_none() {
            rs.next = self.pop_frame();
        }
        let output = match (rs.current, rs.next) {
            (Some(a), Some(b)) => {
                let t = rs.phase.min(1.0) as f32;
                let mut finished = 0;
                rs.phase += rs.step;
                while rs.phase >= 1.0 {
                    let Some(following) = rs.next else {
                        break;
                    };
                    rs.phase -= 1.0;
                    finished += 1;
                    rs.current = Some(following);
                    rs.next = self.pop_frame();
                }
                Some(((a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t), finished))
            }
            _ => None,
        };
        self.resampler = Some(rs);
        output
    }
}

/// Runs on the audio thread: feeds queued frames to the device, counts them into the
/// shared position and reports each slot as its last frame goes out.
struct Playback<D> {
    queues: Arc<Mutex<Queues>>,
    position: Arc<AtomicU32>,
    in_flight: Arc<[AtomicBool]>,
    samples_per_tick: usize,
    channels: usize,
    on_done: D,
}

impl<D: FnMut(usize)> Playback<D> {
    fn render(&mut self, data: &mut [f32]) {
        let shared = Arc::clone(&self.queues);
        let Some(mut queues) = shared.try_lock() else {
            data.fill(0.0);
            return;
        };

        for frame in data.chunks_mut(self.channels.max(1)) {
            // Starved: play silence and hold the position where it is.
            let Some(((left, right), finished)) = queues.next_output() else {
                frame.fill(0.0);
                continue;
            };

            match frame {
                [mono] => *mono = (left + right) * 0.5,
                [l, r, rest @ ..] => {
                    *l = left;
                    *r = right;
                    rest.fill(0.0);
                }
                [] => {}
            }

            for _ in 0..finished {
                self.finish_frame(&mut queues);
            }
        }
    }

    /// Position counts source frames, whatever rate the device runs at.
    fn finish_frame(&mut self, queues: &mut Queues) {
        self.position.fetch_add(1, Ordering::AcqRel);
        queues.frames_into_slot += 1;
        if queues.frames_into_slot == self.samples_per_tick {
            queues.frames_into_slot = 0;
            if let Some(slot) = queues.slot_ids.pop() {
                if let Some(flag) = self.in_flight.get(slot) {
                    flag.store(false, Ordering::Release);
                }
                (self.on_done)(slot);
            }
        }
    }
}

/// Channel count of an f32 output range covering `rate`, as `(channels, min, max)`
/// triples. Prefers `preferred` channels, then stereo.
fn channels_for_rate(ranges: &[(u16, u32, u32)], rate: u32, preferred: u16) -> Option<u16> {
    let covering: Vec<u16> = ranges
        .iter()
        .filter(|(_, min, max)| (*min..=*max).contains(&rate))
        .map(|(channels, _, _)| *channels)
        .collect();
    [preferred, 2]
        .into_iter()
        .find(|wanted| covering.contains(wanted))
        .or_else(|| covering.first().copied())
}

/// Producer half of the queues plus the bookkeeping `AudioSink` needs.
struct SinkCore {
    samples: HeapProducer<f32>,
    slot_ids: HeapProducer<usize>,
    queues: Arc<Mutex<Queues>>,
    position: Arc<AtomicU32>,
    in_flight: Arc<[AtomicBool]>,
    prepared: Vec<bool>,
    slot_len: usize,
}

impl SinkCore {
    fn new<D>(
        samples_per_tick: usize,
        slots: usize,
        channels: usize,
        rates: (u32, u32),
        on_done: D,
    ) -> (Self, Playback<D>) {
        let slot_len = samples_per_tick * 2;
        let (samples, sample_consumer) = HeapRb::<f32>::new(slot_len * slots).split();
        let (slot_ids, slot_consumer) = HeapRb::<usize>::new(slots).split();

        let queues = Arc::new(Mutex::new(Queues {
            samples: sample_consumer,
            slot_ids: slot_consumer,
            frames_into_slot: 0,
            resampler: Resampler::new(rates.0, rates.1),
        }));
        let position = Arc::new(AtomicU32::new(0));
        let in_flight: Arc<[AtomicBool]> = (0..slots).map(|_| AtomicBool::new(false)).collect();

        let playback = Playback {
            queues: queues.clone(),
            position: position.clone(),
            in_flight: in_flight.clone(),
            samples_per_tick,
            channels,
            on_done,
        };

        let core = Self {
            samples,
            slot_ids,
            queues,
            position,
            in_flight,
            prepared: vec![false; slots],
            slot_len,
        };

        (core, playback)
    }

    fn check_slot(&self, slot: usize) -> Result<(), AudioError> {
        if slot < self.prepared.len() { Ok(()) } else { Err(AudioError::NoSuchSlot(slot)) }
    }

    fn check_len(&self, slot: usize, len: usize) -> Result<(), AudioError> {
        if len == self.slot_len {
            Ok(())
        } else {
            Err(AudioError::SlotLength { slot, len, expected: self.slot_len })
        }
    }

    fn prepare(&mut self, slot: usize, len: usize) -> Result<(), AudioError> {
        self.check_slot(slot)?;
        self.check_len(slot, len)?;
        if self.prepared[slot] {
            return Err(AudioError::AlreadyPrepared { slot });
        }
        self.prepared[slot] = true;
        Ok(())
    }

    fn write(&mut self, slot: usize, samples: &[f32]) -> Result<(), AudioError> {
        self.check_slot(slot)?;
        if !self.prepared[slot] {
            return Err(AudioError::NotPrepared { slot });
        }
        self.check_len(slot, samples.len())?;
        if self.in_flight[slot].load(Ordering::Acquire) {
            return Err(AudioError::StillPlaying { slot });
        }
        let free = self.samples.free_len();
        if free < samples.len() || self.slot_ids.is_full() {
            return Err(AudioError::QueueFull { free, needed: samples.len() });
        }

        // The id goes first so the callback never finishes a slot it cannot name.
        self.in_flight[slot].store(true, Ordering::Release);
        if self.slot_ids.push(slot).is_err() {
            self.in_flight[slot].store(false, Ordering::Release);
            return Err(AudioError::QueueFull { free, needed: samples.len() });
        }
        self.samples.push_slice(samples);
        Ok(())
    }

    fn unprepare(&mut self, slot: usize) -> Result<(), AudioError> {
        self.check_slot(slot)?;
        if self.in_flight[slot].load(Ordering::Acquire) {
            return Err(AudioError::StillPlaying { slot });
        }
        if !self.prepared[slot] {
            return Err(AudioError::NotPrepared { slot });
        }
        self.prepared[slot] = false;
        Ok(())
    }

    fn position(&self) -> u32 {
        self.position.load(Ordering::Acquire)
    }

    fn flush(&mut self) {
        let mut queues = self.queues.lock();
        while queues.samples.pop().is_some() {}
        while queues.slot_ids.pop().is_some() {}
        queues.frames_into_slot = 0;
        if let Some(resampler) = queues.resampler.as_mut() {
            resampler.restart();
        }
        for flag in self.in_flight.iter() {
            flag.store(false, Ordering::Release);
        }
        self.prepared.fill(false);
        self.position.store(0, Ordering::Release);
    }
}

/// Audio output on the default cpal device.
pub struct CpalSink {
    stream: Option<cpal::Stream>,
    core: SinkCore,
}

impl CpalSink {
    /// Opens the default output device with room for `slots` slots of `samples_per_tick`
    /// stereo frames at `sample_rate`. Devices that cannot run at that rate play at
    /// their own and the frames are resampled. `on_done` runs on the audio thread with
    /// the index of every slot that finishes playing; `on_fault` with any stream error.
    pub fn open<D, F>(
        sample_rate: u32,
        samples_per_tick: usize,
        slots: usize,
        on_done: D,
        mut on_fault: F,
    ) -> Result<Self, AudioError>
    where
        D: FnMut(usize) + Send + 'static,
        F: FnMut(String) + Send + 'static,
    {
        let audio_host = cpal::default_host();
        let device = audio_host.default_output_device().ok_or(AudioError::NoDevice)?;
        let default_config = device
            .default_output_config()
            .map_err(|e| AudioError::Open(e.to_string()))?;

        let ranges: Vec<(u16, u32, u32)> = device
            .supported_output_configs()
            .map(|configs| {
                configs
                    .filter(|range| range.sample_format() == cpal::SampleFormat::F32)
                    .map(|range| (range.channels(), range.min_sample_rate().0, range.max_sample_rate().0))
                    .collect()
            })
            .unwrap_or_default();

        let stream_config = match channels_for_rate(&ranges, sample_rate, default_config.channels()) {
            Some(channels) => cpal::StreamConfig {
                channels,
                sample_rate: cpal::SampleRate(sample_rate),
                buffer_size: cpal::BufferSize::Default,
            },
            None => {
                log::warn!(
                    "Audio output cannot run at {} Hz, resampling to {} Hz",
                    sample_rate,
                    default_config.sample_rate().0
                );
                default_config.into()
            }
        };
        let channels = stream_config.channels as usize;
        let device_rate = stream_config.sample_rate.0;

        let (core, mut playback) =
            SinkCore::new(samples_per_tick, slots, channels, (sample_rate, device_rate), on_done);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _| playback.render(data),
                move |err| {
                    log::error!("Audio stream error: {err}");
                    on_fault(err.to_string());
                },
                None,
            )
            .map_err(|e| AudioError::Open(e.to_string()))?;

        log::info!(
            "Opened audio output: {} Hz ({} Hz device), {} channels, {} slots of {} frames",
            sample_rate,
            device_rate,
            channels,
            slots,
            samples_per_tick
        );

        Ok(Self { stream: Some(stream), core })
    }

    fn stream(&self) -> Result<&cpal::Stream, AudioError> {
        self.stream.as_ref().ok_or(AudioError::Closed)
    }
}

impl AudioSink for CpalSink {
    fn prepare(&mut self, slot: usize, len: usize) -> Result<(), AudioError> {
        self.stream()?;
        self.core.prepare(slot, len)
    }

    fn write(&mut self, slot: usize, samples: &[f32]) -> Result<(), AudioError> {
        self.stream()?;
        self.core.write(slot, samples)
    }

    fn unprepare(&mut self, slot: usize) -> Result<(), AudioError> {
        self.stream()?;
        self.core.unprepare(slot)
    }

    fn position(&self) -> Result<u32, AudioError> {
        self.stream()?;
        Ok(self.core.position())
    }

    fn pause(&mut self) -> Result<(), AudioError> {
        self.stream()?.pause().map_err(|e| AudioError::Control(e.to_string()))
    }

    fn restart(&mut self) -> Result<(), AudioError> {
        self.stream()?.play().map_err(|e| AudioError::Control(e.to_string()))
    }

    fn reset(&mut self) -> Result<(), AudioError> {
        self.pause()?;
        self.core.flush();
        Ok(())
    }

    fn close(&mut self) -> Result<(), AudioError> {
        self.stream.take().map(drop).ok_or(AudioError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn harness(samples_per_tick: usize, slots: usize, channels: usize) -> (SinkCore, Playback<impl FnMut(usize)>, mpsc::Receiver<usize>) {
        resampling_harness(samples_per_tick, slots, channels, (44_100, 44_100))
    }

    fn resampling_harness(
        samples_per_tick: usize,
        slots: usize,
        channels: usize,
        rates: (u32, u32),
    ) -> (SinkCore, Playback<impl FnMut(usize)>, mpsc::Receiver<usize>) {
        let (tx, rx) = mpsc::channel();
        let (core, playback) = SinkCore::new(samples_per_tick, slots, channels, rates, move |slot| {
            let _ = tx.send(slot);
        });
        (core, playback, rx)
    }

    #[test]
    fn reports_slot_after_its_last_frame() {
        let (mut core, mut playback, done) = harness(2, 2, 2);
        core.prepare(0, 4).unwrap();
        core.write(0, &[0.1, 0.2, 0.3, 0.4]).unwrap();
        core.prepare(1, 4).unwrap();
        core.write(1, &[0.5, 0.6, 0.7, 0.8]).unwrap();

        let mut out = [9.0; 2];
        playback.render(&mut out);
        assert_eq!(out, [0.1, 0.2]);
        assert!(done.try_recv().is_err());
        assert_eq!(core.position(), 1);

        let mut out = [9.0; 4];
        playback.render(&mut out);
        assert_eq!(out, [0.3, 0.4, 0.5, 0.6]);
        assert_eq!(done.try_recv(), Ok(0));
        assert!(core.unprepare(0).is_ok());
        assert!(matches!(core.unprepare(1), Err(AudioError::StillPlaying { slot: 1 })));
    }

    #[test]
    fn starvation_plays_silence_without_advancing() {
        let (_core, mut playback, _done) = harness(2, 2, 2);
        let mut out = [9.0; 4];
        playback.render(&mut out);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(playback.position.load(Ordering::Acquire), 0);
    }

    #[test]
    fn mono_devices_get_the_mix() {
        let (mut core, mut playback, _done) = harness(1, 2, 1);
        core.prepare(0, 2).unwrap();
        core.write(0, &[0.2, 0.4]).unwrap();
        let mut out = [0.0; 1];
        playback.render(&mut out);
        assert!((out[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn slot_lifecycle_is_enforced() {
        let (mut core, _playback, _done) = harness(2, 2, 2);
        assert!(matches!(core.write(0, &[0.0; 4]), Err(AudioError::NotPrepared { slot: 0 })));
        assert!(matches!(core.prepare(0, 3), Err(AudioError::SlotLength { expected: 4, .. })));
        assert!(matches!(core.prepare(2, 4), Err(AudioError::NoSuchSlot(2))));
        core.prepare(0, 4).unwrap();
        assert!(matches!(core.prepare(0, 4), Err(AudioError::AlreadyPrepared { slot: 0 })));
    }

    #[test]
    fn picks_a_range_covering_the_rate() {
        let ranges = [(2, 44_100, 48_000), (6, 8_000, 192_000), (1, 8_000, 96_000)];
        assert_eq!(channels_for_rate(&ranges, 44_100, 2), Some(2));
        assert_eq!(channels_for_rate(&ranges, 26_460, 2), Some(6));
        assert_eq!(channels_for_rate(&ranges, 26_460, 1), Some(1));
        assert_eq!(channels_for_rate(&[(2, 48_000, 48_000)], 44_100, 2), None);
        assert_eq!(channels_for_rate(&[], 44_100, 2), None);
    }

    #[test]
    fn downsampling_counts_source_frames() {
        // device at half the source rate
        let (mut core, mut playback, done) = resampling_harness(2, 2, 2, (200, 100));
        core.prepare(0, 4).unwrap();
        core.write(0, &[0.0, 0.0, 0.2, 0.2]).unwrap();
        core.prepare(1, 4).unwrap();
        core.write(1, &[0.4, 0.4, 0.6, 0.6]).unwrap();

        let mut out = [9.0; 4];
        playback.render(&mut out);
        assert_eq!(out, [0.0, 0.0, 0.4, 0.4]);
        assert_eq!(core.position(), 3);
        assert_eq!(done.try_recv(), Ok(0));
    }

    #[test]
    fn upsampling_interpolates_between_frames() {
        let (mut core, mut playback, done) = resampling_harness(2, 2, 2, (100, 200));
        core.prepare(0, 4).unwrap();
        core.write(0, &[0.0, 0.0, 1.0, 1.0]).unwrap();
        core.prepare(1, 4).unwrap();
        core.write(1, &[1.0, 1.0, 1.0, 1.0]).unwrap();

        let mut out = [9.0; 6];
        playback.render(&mut out);
        assert_eq!(out, [0.0, 0.0, 0.5, 0.5, 1.0, 1.0]);
        assert_eq!(core.position(), 1);
        assert!(done.try_recv().is_err());
    }

    #[test]
    fn flush_drops_everything_queued() {
        let (mut core, mut playback, done) = harness(2, 2, 2);
        core.prepare(0, 4).unwrap();
        core.write(0, &[0.1; 4]).unwrap();
        core.flush();

        let mut out = [9.0; 4];
        playback.render(&mut out);
        assert_eq!(out, [0.0; 4]);
        assert!(done.try_recv().is_err());
        assert_eq!(core.position(), 0);
        assert!(core.prepare(0, 4).is_ok());
    }
}

//! Analysis tap (visualizer node)
//!
//! The render thread pushes the pre-gain mono mix into a lock-free ring via
//! [`AnalyserTap`]; the UI side reads the most recent `fft_size` samples from
//! [`Analyser`].

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Smallest and largest supported window sizes
pub const MIN_FFT_SIZE: usize = 32;
pub const MAX_FFT_SIZE: usize = 32_768;

/// Render-side half of an analyser
pub struct AnalyserTap {
    producer: HeapProd<f32>,
}

impl AnalyserTap {
    /// Push one block of planar output. Samples that do not fit are dropped.
    pub fn push(&mut self, left: &[f32], right: &[f32]) {
        self.producer
            .push_iter(left.iter().zip(right).map(|(&l, &r)| (l + r) * 0.5));
    }
}

/// UI-side half of an analyser
pub struct Analyser {
    samples: HeapCons<f32>,
    /// Circular window of the latest samples
    window: Vec<f32>,
    /// Next write index in `window`
    write: usize,
}

impl Analyser {
    /// Create a connected tap/analyser pair
    ///
    /// `fft_size` is rounded up to a power of two within
    /// [`MIN_FFT_SIZE`]..=[`MAX_FFT_SIZE`].
    pub fn new(fft_size: usize) -> (AnalyserTap, Analyser) {
        let fft_size = fft_size.clamp(MIN_FFT_SIZE, MAX_FFT_SIZE).next_power_of_two();
        let (producer, consumer) = HeapRb::<f32>::new(fft_size * 8).split();
        (
            AnalyserTap { producer },
            Analyser {
                samples: consumer,
                window: vec![0.0; fft_size],
                write: 0,
            },
        )
    }

    pub fn fft_size(&self) -> usize {
        self.window.len()
    }

    /// Move everything the tap produced into the window
    fn refresh(&mut self) {
        let len = self.window.len();
        while let Some(sample) = self.samples.try_pop() {
            self.window[self.write] = sample;
            self.write = (self.write + 1) % len;
        }
    }

    /// Copy the latest samples, oldest first, into `out`
    pub fn float_time_domain_data(&mut self, out: &mut [f32]) {
        self.refresh();
        let len = self.window.len();
        for (i, o) in out.iter_mut().take(len).enumerate() {
            *o = self.window[(self.write + i) % len];
        }
    }

    /// Like [`Self::float_time_domain_data`] but as bytes centred on 128
    pub fn byte_time_domain_data(&mut self, out: &mut [u8]) {
        self.refresh();
        let len = self.window.len();
        for (i, o) in out.iter_mut().take(len).enumerate() {
            let v = self.window[(self.write + i) % len];
            *o = (128.0 * (1.0 + v)).clamp(0.0, 255.0) as u8;
        }
    }

    /// Largest absolute sample in the current window
    pub fn peak(&mut self) -> f32 {
        self.refresh();
        self.window.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }
}

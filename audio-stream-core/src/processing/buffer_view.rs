//! Bounds-checked views over the interleaved `f32` buffers a driver hands to
//! the real-time callback.
//!
//! Layout is `[ch0, ch1, .., chN, ch0, ch1, ..]`. A trailing partial frame is
//! never exposed.

/// Read-only interleaved input samples for one callback period.
#[derive(Debug, Clone, Copy)]
pub struct InputBuffer<'a> {
    samples: &'a [f32],
    channels: usize,
}

impl<'a> InputBuffer<'a> {
    pub fn new(samples: &'a [f32], channels: usize) -> Self {
        let whole = if channels == 0 {
            0
        } else {
            samples.len() - samples.len() % channels
        };
        Self {
            samples: &samples[..whole],
            channels,
        }
    }

    /// A view with no channels and no frames (output-only streams).
    pub fn empty() -> Self {
        Self {
            samples: &[],
            channels: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples of frame `index`, one per channel.
    pub fn frame(&self, index: usize) -> Option<&'a [f32]> {
        let start = index.checked_mul(self.channels)?;
        self.samples.get(start..start + self.channels)
    }

    pub fn frames(&self) -> impl Iterator<Item = &'a [f32]> + 'a {
        let channels = self.channels.max(1);
        self.samples.chunks_exact(channels)
    }

    pub fn interleaved(&self) -> &'a [f32] {
        self.samples
    }
}

/// Writable interleaved output samples for one callback period.
#[derive(Debug)]
pub struct OutputBuffer<'a> {
    samples: &'a mut [f32],
    channels: usize,
}

impl<'a> OutputBuffer<'a> {
    pub fn new(samples: &'a mut [f32], channels: usize) -> Self {
        let whole = if channels == 0 {
            0
        } else {
            samples.len() - samples.len() % channels
        };
        Self {
            samples: &mut samples[..whole],
            channels,
        }
    }

    /// A view with no channels and no frames (input-only streams).
    pub fn empty() -> Self {
        Self {
            samples: &mut [],
            channels: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn frame_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        let start = index.checked_mul(self.channels)?;
        self.samples.get_mut(start..start + self.channels)
    }

    pub fn frames_mut(&mut self) -> impl Iterator<Item = &mut [f32]> + '_ {
        let channels = self.channels.max(1);
        self.samples.chunks_exact_mut(channels)
    }

    pub fn interleaved_mut(&mut self) -> &mut [f32] {
        &mut *self.samples
    }

    pub fn silence(&mut self) {
        self.samples.fill(0.0);
    }
}

use std::sync::Arc;

/// Fills one period of interleaved output samples.
///
/// Runs on the driver's real-time thread: keep it short, never block. The
/// buffer arrives zeroed, so a producer that has run out of material can
/// simply return and leave silence behind. The producer owns its play position.
///
/// Identity (`Arc::ptr_eq`) decides whether a running playback can be reused.
pub type SampleProducer = Arc<dyn Fn(&mut [f32]) + Send + Sync + 'static>;

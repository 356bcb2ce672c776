pub mod buffer_view;
pub mod mixer;
pub mod ring_buffer;
pub mod waveform;

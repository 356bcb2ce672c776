pub mod audio_stream;
pub mod driver;
pub mod sample_producer;

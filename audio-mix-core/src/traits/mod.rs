pub mod encoder_sink;
pub mod line_in_source;
pub mod pdm_device;

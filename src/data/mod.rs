pub mod nmrpipe_format;
pub mod spectrum;

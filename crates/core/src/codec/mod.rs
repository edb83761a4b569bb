//! In-band effect metadata for H.264 bitstreams
//!
//! [`nal`] handles unit framing for both container conventions and RBSP
//! escaping; [`sei`] builds and parses the private SEI extension.

pub mod nal;
pub mod sei;

pub use nal::{
    detect_container_format, escape_emulation_prevention, find_annexb_units,
    find_length_prefixed_units, unescape_emulation_prevention, ContainerFormat, NalUnit,
};
pub use sei::{
    build_sei_unit, extract_from_frame, inject_into_frame, parse_sei_unit, SeiRecord, FX_SEI_UUID,
};

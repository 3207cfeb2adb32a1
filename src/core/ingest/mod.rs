pub mod frame;

pub use frame::{encode_frame, parse_frame, parse_frame_body, ParsedFrame};

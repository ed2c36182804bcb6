pub mod frame;
pub mod types;

pub use frame::{read_frame, read_message, write_message, FramingError, MAX_FRAME_LEN};
pub use types::{Action, Request, Response, Status};

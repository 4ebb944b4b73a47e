mod avatar_port;

pub use avatar_port::{AvatarPort, AvatarStatus};

pub mod emitter;
pub mod events;
pub mod rooms;
pub mod server;

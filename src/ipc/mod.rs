//! Local command socket

mod protocol;
mod server;

pub use server::{CommandHandler, Server};

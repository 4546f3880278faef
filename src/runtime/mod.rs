//! Event-driven runtime for framewire servers.
//!
//! Shared pieces:
//! - `OutboundQueue`: per-connection pending bytes
//! - `Connection` / `ConnectionRegistry`: slab-backed connection records
//! - `MessageHandler`: the application extension point
//!
//! The multiplexer itself lives in `mio` (epoll on Linux, kqueue on macOS).

mod buffer;
mod connection;
pub mod handler;
mod mio;

pub use self::handler::{ConnectionInfo, HandlerError, MessageHandler, OutboundAction};
pub use self::mio::{Server, ServerError};

use crate::config::{ProtocolType, ServerSettings};
use crate::protocols::{echo::Echo, guessing::GuessingGame, smtp::Smtp};
use tracing::info;

/// Run the configured application until the process exits.
pub fn run(settings: &ServerSettings) -> Result<(), ServerError> {
    match settings.protocol {
        ProtocolType::Guessing => {
            let game = match settings.seed {
                Some(seed) => GuessingGame::with_seed(seed),
                None => GuessingGame::new(),
            };
            serve(settings, game)
        }
        ProtocolType::Echo => serve(settings, Echo),
        ProtocolType::Smtp => serve(settings, Smtp::new()),
    }
}

fn serve<H: MessageHandler>(settings: &ServerSettings, handler: H) -> Result<(), ServerError> {
    let mut server = Server::bind(settings, handler)?;
    server.listen()?;
    info!(addr = %server.local_addr(), protocol = ?settings.protocol, "Serving");
    server.run()
}

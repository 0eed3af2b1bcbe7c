// TLS transport and the phased session engine.

pub mod cert;
pub mod framing;
pub mod session;
pub mod tls;
pub mod transport;

mod error;

pub use error::{NetError, Result};
pub use session::{Role, Session};
pub use transport::{dial, listen, parse_listeners, TlsSession};

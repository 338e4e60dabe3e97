pub mod address;
pub mod api;
pub mod config;
pub mod error;
pub mod proxy;
pub mod quickconnect;
pub mod series;
pub mod session;

pub use api::{ApiRequest, Transport};
pub use config::{ClientConfig, ConfigFile};
pub use error::{ApiError, ConnectionFailure, RemoteFailure};
pub use proxy::RequestProxy;
pub use session::{Released, RequestOptions, Session, SessionManager, SessionName, Settings};

#[cfg(feature = "client")]
pub use api::HttpTransport;

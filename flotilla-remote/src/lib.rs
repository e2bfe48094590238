//! Remote Access Port and Session Manager for the function-hosting platform.

pub mod api;
mod error;
pub mod http;
pub mod memory;
pub mod session;

pub use api::{BuildStatus, PutOutcome, RemoteApi, SearchPage};
pub use error::{RemoteError, SessionError};
pub use http::HttpRemote;
pub use memory::InMemoryRemote;
pub use session::{
    CredentialResolver, Credentials, FuseCliResolver, ProfileDescriptor, ProfileName, Session,
    SessionManager,
};

mod credential_store;
mod credentials;
mod secret_store;
mod session_bus;

pub use credential_store::{CredentialStore, JsonFileStore, MemoryStore, StoreError};
pub use credentials::Credentials;
pub use secret_store::KeyringStore;
pub use session_bus::{SessionBus, SessionEvent};

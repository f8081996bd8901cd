//! Authentication session: tokens, user profile and refresh.
//!
//! [`SessionManager`] owns the in-memory session and mirrors it into
//! [`crate::storage::SecureStorage`] under [`TOKENS_KEY`] and [`USER_KEY`].
//! [`get_auth_token`] reads the persisted token without a manager.
//!
//! ```text
//! NoSession --sign_in/sign_up--> Loading --ok--> Authenticated
//!     ^                             |                 |   ^
//!     |                            err           refresh  ok
//!     |                             v                 v   |
//!     +----- sign_out / refresh failure ------- Refreshing
//! ```

pub mod backend;
pub mod observer;
pub mod session;
pub mod token;
pub mod types;

pub use backend::{AuthBackend, HttpAuthBackend};
pub use observer::{NoopSessionObserver, NotificationLevel, ObservedEvent, RecordingSessionObserver, SessionObserver};
pub use session::{SessionConfig, SessionEvent, SessionListener, SessionManager, SessionStatus};
pub use token::{get_auth_token, TOKENS_KEY, USER_KEY};
pub use types::{AuthResponse, AuthTokens, AuthenticatedUser, RefreshResponse, UserUpdate};

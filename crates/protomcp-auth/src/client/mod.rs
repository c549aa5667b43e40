//! OAuth 2.1 client-side state machine (§4.7): discovery, dynamic
//! registration, PKCE authorization-code flow, and token refresh.

mod discovery;
mod provider;
mod state_machine;

pub use discovery::{DiscoveryCache, DiscoveryClient};
pub use provider::{ClientInformation, InMemoryClientProvider, OAuthClientProvider, TokenSet};
pub use state_machine::{parse_www_authenticate, AuthState, OAuthClientStateMachine, UnauthorizedChallenge};

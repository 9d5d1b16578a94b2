pub mod loopback;
pub mod oauth;
pub mod pkce;
pub mod token;

pub use loopback::{AuthorizationPrompt, LoopbackPrompt, ManualPrompt};
pub use oauth::TokenManager;
pub use token::Token;

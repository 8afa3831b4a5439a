mod claims;
mod jwt;

pub use claims::{AuthUser, Claims};
pub use jwt::{extract_token, JwtValidator, TOKEN_COOKIE};

mod app_token;

pub use app_token::{APP_TOKEN_HEADER, AppToken};

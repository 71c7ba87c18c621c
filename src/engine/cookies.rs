// src/engine/cookies.rs
//! Cookies: [`Cookie`], the page [`CookieJar`] and the consent decision reader.

mod cookies;
mod cookie_jar;
mod decision;

pub use cookies::Cookie;

pub use cookie_jar::CookieJar;
pub use cookie_jar::DefaultCookieJar;

pub use decision::has_recorded_decision;
pub use decision::is_truthy;
pub use decision::read_cookie;
pub use decision::ConsentDecision;

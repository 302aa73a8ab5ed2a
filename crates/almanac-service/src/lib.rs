pub mod caldav;
pub mod cancel;
pub mod error;
pub mod store;

pub mod children;
pub mod device_registration;
pub mod last_known_position;
pub mod location_match;
pub mod notification;
pub mod reminder_settings;
pub mod stored_session;
pub mod tip;

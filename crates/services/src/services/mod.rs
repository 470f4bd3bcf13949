pub mod children_info;
pub mod config;
pub mod enact_api;
pub mod location;
pub mod location_poller;
pub mod notification;
pub mod push_registration;
pub mod reminders;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub mod auth;
pub mod devices;
pub mod hex_integer;
pub mod policies;
pub mod registration;
pub mod serializer;

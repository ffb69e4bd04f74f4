pub mod keyboard_input;

mod command;
mod interactive;
mod profile;

#[cfg(test)]
mod tests;

pub use command::{Command, PendingCall};
pub use profile::EmergencyProfile;

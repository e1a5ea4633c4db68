pub mod admin;
pub mod auth;
pub mod files;
pub mod labour;
pub mod materials;
pub mod notifications;
pub mod phases;
pub mod projects;
pub mod reports;
pub mod tasks;
pub mod team;

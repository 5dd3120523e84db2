pub mod api;
pub mod clients;
pub mod config;
pub mod controllers;
pub mod dbconfig;
pub mod deployer;
pub mod util;
pub mod validation;

#[cfg(test)]
pub mod tests;

pub mod cluster_controller;
pub mod reconciler;

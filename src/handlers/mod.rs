//! HTTP handlers

pub mod health;
pub mod models;
pub mod pages;
pub mod predict;
pub mod predictions;

#[cfg(test)]
mod tests;

pub mod appointments;
pub mod health;
pub mod schedule;
pub mod simulator;
pub mod webhook;
pub mod whatsapp;

//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate tree, engine and sync calls into session-level APIs.
//! - Keep CLI and transport layers decoupled from packet rules.

pub mod session_service;

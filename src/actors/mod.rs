//! Background tasks of the hub
//!
//! Each target runs as independent Tokio tasks; the supervisor owns them and
//! is the only thing that starts or stops them.
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────┐
//!                    │   Hub (main)    │
//!                    └────────┬────────┘
//!                             │ commands
//!                    ┌────────▼────────┐
//!                    │   Supervisor    │◄── reconcile ticker
//!                    └────────┬────────┘
//!                             │ start / stop (per target)
//!                ┌────────────┼────────────┐
//!                │                         │
//!        ┌───────▼───────┐         ┌───────▼───────┐
//!        │  AlertLoop A  │   ...   │  AlertLoop N  │──► StatusStore, Notifiers
//!        └───────▲───────┘         └───────▲───────┘
//!                │ fetch_reports           │
//!        ┌───────┴─────────────────────────┴───────┐
//!        │               Report store              │
//!        └───────▲─────────────────────────▲───────┘
//!                │ record_report           │
//!        ┌───────┴───────┐         ┌───────┴───────┐
//!        │   Prober A    │   ...   │   Prober N    │──► Detector
//!        └───────────────┘         └───────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: the supervisor has an mpsc command channel
//! 2. **Request/Response**: oneshot channels carried inside commands
//! 3. **Cancellation**: one parent token; every loop and prober holds a child

pub mod alert;
pub mod messages;
pub mod prober;
pub mod supervisor;

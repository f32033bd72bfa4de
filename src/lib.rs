//! ==============================================================================
//! ecg-relay - IoT ECG telemetry relay
//! ==============================================================================
//!
//! embedded devices (ESP32 pulse-oximeter/ECG nodes) push heart-rate, SpO2
//! and ECG readings here; a dashboard polls for the latest ready payload
//! and signals new measurements. everything lives in process memory: the
//! whole design is the per-device session state machine in [`registry`].
//!
//!     ┌───────────┐  poll /latest        ┌─────────────────┐
//!     │ dashboard │ ───────────────────> │                 │
//!     │           │  GET /start/{id}     │  session        │
//!     └───────────┘ ───────────────────> │  registry       │
//!     ┌───────────┐  poll /latest        │  (idle →        │
//!     │  device   │ ───────────────────> │   collecting →  │
//!     │  (esp32)  │  POST /data/{id}     │   ready/stale)  │
//!     └───────────┘ ───────────────────> └─────────────────┘
//!
//! ==============================================================================

pub mod api;
pub mod config;
pub mod domain;
pub mod ecg;
pub mod registry;

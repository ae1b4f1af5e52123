//! Node management module for Swarm Launcher
//!
//! This module launches, monitors and stops the local geth and swarm nodes
//! the dApp shell talks to.
//!
//! ## Features
//!
//! - **Setup**: Provision the working directory and create the node account
//! - **Sequenced Startup**: geth first, then swarm, each waited on until ready
//! - **Readiness Detection**: Literal log markers, first outcome wins
//! - **Shutdown & Reset**: Concurrent termination, full state wipe
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    node module                           │
//! ├─────────────────────────────────────────────────────────┤
//! │  config.rs       - Configuration types and persistence   │
//! │  spec.rs         - Command lines and readiness markers   │
//! │  readiness.rs    - Log line policy and once-only latch   │
//! │  supervisor.rs   - Single process lifecycle              │
//! │  orchestrator.rs - setup / start / stop / reset          │
//! │  state.rs        - Lifecycle state and status snapshot   │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod orchestrator;
pub mod readiness;
pub mod spec;
pub mod state;
pub mod supervisor;

// Re-export key types for convenience
pub use config::LauncherConfig;
pub use orchestrator::{NodeBinaries, Orchestrator};
pub use spec::{ManagedProcessSpec, ProcessKind};
pub use state::{LifecycleState, NodeStatus};
pub use supervisor::ProcessSupervisor;

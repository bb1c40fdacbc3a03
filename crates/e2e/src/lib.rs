//! vizcheck E2E harness
//!
//! Browser end-to-end testing for small single-page demo visualizers:
//! - Observes console output, uncaught exceptions and native dialogs
//! - Drives pages through named fields and standard input actions
//! - Waits on timer-driven page state with bounded polling
//! - Runs declarative YAML specs against a spawned fixture server
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  vizcheck test runner (Rust)                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── start_server() -> ServerHandle                       │
//! │    ├── run_spec(spec: TestSpec) -> TestResult               │
//! │    │     └── Session::open(launcher, dialog_policy)         │
//! │    │           ├── Target (Playwright bridge | FakePage)    │
//! │    │           └── ObservationSidecar (attached first)      │
//! │    └── write_results() -> test-results.json                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PageDriver                                                 │
//! │    ├── fields: name -> selector                             │
//! │    ├── goto / read / act / evaluate                         │
//! │    └── wait_for_read / wait_for_count ── wait::wait_for     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod fake;
pub mod playwright;
pub mod runner;
pub mod server;
pub mod session;
pub mod sidecar;
pub mod spec;
pub mod target;
pub mod wait;

pub use config::RunnerConfig;
pub use driver::PageDriver;
pub use error::{E2eError, E2eResult};
pub use events::{ConsoleLevel, DialogKind, DialogPolicy, ObservedEvent};
pub use runner::{TestResult, TestRunner, TestSuiteResult};
pub use session::{Launcher, Session};
pub use sidecar::ObservationSidecar;
pub use spec::{TestSpec, TestStep};
pub use target::{Action, Probe, Target};
pub use wait::{wait_for, WaitOptions, WaitOutcome};

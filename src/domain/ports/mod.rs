//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces the control loop depends on, implemented by
//! infrastructure adapters or supplied by the caller:
//! - Worker: the external collaborator that performs task work
//! - ChangeDetector: file-change tracking against a per-task baseline
//! - ValidationRunner: test/linter/build gates
//! - PolicyEngine: allow/deny/approval rule checks

pub mod change_detector;
pub mod policy;
pub mod validation;
pub mod worker;

pub use change_detector::ChangeDetector;
pub use policy::{AllowAllPolicy, DenyListPolicy, PolicyDecision, PolicyEngine};
pub use validation::{BuildReport, LintReport, TestReport, ValidationRunner};
pub use worker::{Worker, WorkerInvocation, WorkerReply, WorkerStatus};

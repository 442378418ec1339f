//! safegate: a review-and-approval layer between an automated code
//! editor and the filesystem. Candidate edits flow one at a time through
//! path validation, risk assessment, an approval gate, and execution,
//! with every step recorded in an append-only audit trail.

pub mod audit;
pub mod diff;
pub mod evaluator;
pub mod executor;
pub mod gate;
pub mod pathsafe;
pub mod pipeline;
pub mod plan;
pub mod policy;
pub mod report;
pub mod risk;
pub mod scan;
pub mod task;

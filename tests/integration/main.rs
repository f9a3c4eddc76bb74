//! Integration tests: the full scan → alert → reset flow over in-memory
//! collaborators.

mod fakes;
mod scan_flow;

// Test modules for survey-probe crate
//
// Test organization follows the template pattern where each source file
// has a corresponding test file that focuses on business logic verification.
// HTTP-level behaviour is covered by the wiremock suites under tests/.

// Test helper utilities
pub mod helpers;

//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that loads a whole configuration on
//! the simulated board and drives it through the supervisor, the event
//! table or the HTTP front end.  No real hardware is required.

mod api_tests;
mod mock_hw;
mod scenario_tests;
mod supervisor_tests;

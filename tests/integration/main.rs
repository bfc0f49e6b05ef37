//! Integration tests: the worker driven end to end against an in-memory venue.

mod cycle;
mod mock_venue;
mod startup;

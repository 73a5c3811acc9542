//! Crate-level tests across the builder, service and driver seams

mod balancer_tests;
mod driver_tests;
